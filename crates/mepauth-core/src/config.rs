//! Configuration management for mepauth.
//!
//! All configuration is driven by environment variables. Secret inputs
//! (`KEY_COMPONENT`, `JWT_KEY_PASSWORD`, `SECRET_KEY`) are deliberately not
//! part of [`MepAuthConfig`]; the server reads them straight into wiping
//! buffers.

use std::path::PathBuf;

use crate::error::{MepAuthError, MepAuthResult};

/// Global configuration for mepauth.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MepAuthConfig {
    /// Bind address for the HTTP listener.
    pub gateway_listen: String,
    /// Log level.
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
    /// Directory holding the root-key components and the encrypted work key.
    pub key_dir: PathBuf,
    /// Whether access-key records are persisted to disk.
    pub persistence: bool,
    /// Data directory for persisted access-key records.
    pub data_dir: PathBuf,
    /// PEM file with the RSA key used to sign issued tokens.
    pub jwt_private_key_file: PathBuf,
    /// Key id placed in the token header and used as issuer.
    pub jwt_key_id: String,
    /// Lifetime of issued tokens, in seconds.
    pub token_ttl_secs: u64,
    /// How long a failing access key stays under validation, in seconds.
    pub validation_window_secs: u64,
    /// How long a block-listed access key stays blocked, in seconds.
    pub block_window_secs: u64,
    /// Consecutive signature failures that block-list an access key.
    pub block_threshold: u32,
}

impl Default for MepAuthConfig {
    fn default() -> Self {
        Self {
            gateway_listen: "0.0.0.0:8080".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            key_dir: PathBuf::from("/usr/mep/keys"),
            persistence: false,
            data_dir: PathBuf::from("/usr/mep/data"),
            jwt_private_key_file: PathBuf::from("/usr/mep/ssl/jwt_encrypted_privatekey"),
            jwt_key_id: "mepauth".to_owned(),
            token_ttl_secs: 3600,
            validation_window_secs: 300,
            block_window_secs: 900,
            block_threshold: 3,
        }
    }
}

impl MepAuthConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> MepAuthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their default; set keys that fail to parse are
    /// reported as [`MepAuthError::Config`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MepAuthResult<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            config.log_json = v.eq_ignore_ascii_case("json");
        }
        if let Some(v) = lookup("KEY_DIR") {
            config.key_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PERSISTENCE") {
            config.persistence = parse_bool(&v);
        }
        if let Some(v) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("JWT_PRIVATE_KEY_FILE") {
            config.jwt_private_key_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("JWT_KEY_ID") {
            config.jwt_key_id = v;
        }
        if let Some(v) = lookup("TOKEN_TTL_SECS") {
            config.token_ttl_secs = parse_number("TOKEN_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("VALIDATION_WINDOW_SECS") {
            config.validation_window_secs = parse_number("VALIDATION_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("BLOCK_WINDOW_SECS") {
            config.block_window_secs = parse_number("BLOCK_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("BLOCK_THRESHOLD") {
            config.block_threshold = parse_number("BLOCK_THRESHOLD", &v)?;
            if config.block_threshold == 0 {
                return Err(MepAuthError::Config(
                    "BLOCK_THRESHOLD must be at least 1".to_owned(),
                ));
            }
        }

        Ok(config)
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v, "1" | "true" | "yes" | "TRUE" | "YES")
}

fn parse_number<T: std::str::FromStr>(key: &str, v: &str) -> MepAuthResult<T> {
    v.trim()
        .parse()
        .map_err(|_| MepAuthError::Config(format!("{key} must be a non-negative integer, got {v:?}")))
}
