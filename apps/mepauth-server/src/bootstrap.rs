//! Startup wiring: key hierarchy, signing key, credential store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mepauth_core::{AccessKeyStore, MemoryAccessKeyStore, MepAuthConfig};
use mepauth_keys::{KeyHierarchy, KeyPaths};
use mepauth_token_core::{CredentialService, TokenSigner, TrackerConfig};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// File name of the sealed signing key password inside the key directory.
pub const JWT_PASSWORD_FILE: &str = "jwt_key_password";

/// File name of the nonce of the sealed signing key password.
pub const JWT_PASSWORD_NONCE_FILE: &str = "jwt_key_password_nonce";

/// File name of the access-key snapshot inside the data directory.
pub const ACCESS_KEY_SNAPSHOT: &str = "access_keys.json";

/// Secret inputs read from the environment at startup.
pub struct StartupSecrets {
    /// `KEY_COMPONENT`.
    pub key_component: Option<Zeroizing<String>>,
    /// `JWT_KEY_PASSWORD`.
    pub jwt_key_password: Option<Zeroizing<String>>,
    /// `APP_INST_ID`, `ACCESS_KEY` and `SECRET_KEY`.
    pub initial_credential: Option<InitialCredential>,
}

impl std::fmt::Debug for StartupSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupSecrets")
            .field("key_component", &self.key_component.as_ref().map(|_| "<redacted>"))
            .field(
                "jwt_key_password",
                &self.jwt_key_password.as_ref().map(|_| "<redacted>"),
            )
            .field("initial_credential", &self.initial_credential)
            .finish()
    }
}

/// Credentials provisioned at startup.
pub struct InitialCredential {
    /// Application instance id.
    pub app_instance_id: String,
    /// Access key.
    pub access_key: String,
    /// Plaintext secret key.
    pub secret_key: Zeroizing<String>,
}

impl std::fmt::Debug for InitialCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitialCredential")
            .field("app_instance_id", &self.app_instance_id)
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl StartupSecrets {
    /// Read the secret inputs from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the secret inputs from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(Zeroizing::new);

        let initial_credential = match (
            lookup("APP_INST_ID"),
            lookup("ACCESS_KEY"),
            secret("SECRET_KEY"),
        ) {
            (Some(app_instance_id), Some(access_key), Some(secret_key)) => {
                Some(InitialCredential {
                    app_instance_id,
                    access_key,
                    secret_key,
                })
            }
            _ => None,
        };

        Self {
            key_component: secret("KEY_COMPONENT"),
            jwt_key_password: secret("JWT_KEY_PASSWORD"),
            initial_credential,
        }
    }
}

/// Validate the key component and make sure root and work keys exist.
pub fn init_key_hierarchy(
    config: &MepAuthConfig,
    key_component: Option<Zeroizing<String>>,
) -> Result<Arc<KeyHierarchy>> {
    let component = key_component.context("KEY_COMPONENT must be set")?;
    let component = Zeroizing::new(component.as_bytes().to_vec());

    let keys = KeyHierarchy::new(KeyPaths::in_dir(&config.key_dir), component)
        .context("invalid KEY_COMPONENT")?;
    keys.init_root_key_and_work_key()
        .context("failed to initialize root key and work key")?;
    keys.work_key().context("failed to decrypt work key")?;

    info!(key_dir = %config.key_dir.display(), "key hierarchy ready");
    Ok(Arc::new(keys))
}

/// Load the token signing key.
///
/// A password supplied through the environment is sealed into the key
/// directory for later starts; otherwise a previously sealed password is
/// used when present.
pub fn load_token_signer(
    config: &MepAuthConfig,
    keys: &KeyHierarchy,
    password: Option<Zeroizing<String>>,
) -> Result<TokenSigner> {
    let password_path = config.key_dir.join(JWT_PASSWORD_FILE);
    let nonce_path = config.key_dir.join(JWT_PASSWORD_NONCE_FILE);

    let password: Option<Zeroizing<Vec<u8>>> = match password {
        Some(password) => {
            keys.seal_to_files(password.as_bytes(), &password_path, &nonce_path)
                .context("failed to seal signing key password")?;
            info!("sealed signing key password into key directory");
            Some(Zeroizing::new(password.as_bytes().to_vec()))
        }
        None if password_path.exists() => Some(
            keys.open_from_files(&password_path, &nonce_path)
                .context("failed to open sealed signing key password")?,
        ),
        None => None,
    };

    let signer = TokenSigner::from_pem_file(
        &config.jwt_private_key_file,
        password.as_deref().map(Vec::as_slice),
        config.jwt_key_id.clone(),
        config.token_ttl_secs,
    )
    .with_context(|| {
        format!(
            "failed to load signing key {}",
            config.jwt_private_key_file.display()
        )
    })?;

    info!(key_id = %config.jwt_key_id, "token signing key loaded");
    Ok(signer)
}

/// Build the access-key store, persistent when enabled.
pub fn build_store(config: &MepAuthConfig) -> Result<Arc<dyn AccessKeyStore>> {
    if !config.persistence {
        return Ok(Arc::new(MemoryAccessKeyStore::new()));
    }

    let path: PathBuf = config.data_dir.join(ACCESS_KEY_SNAPSHOT);
    let store = MemoryAccessKeyStore::with_persistence(&path)
        .with_context(|| format!("failed to load access key store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Provision the startup credentials, if any.
pub fn provision_initial(
    credentials: &CredentialService,
    initial: Option<InitialCredential>,
) -> Result<()> {
    let Some(initial) = initial else {
        warn!("no startup credentials configured");
        return Ok(());
    };

    credentials
        .provision(
            &initial.app_instance_id,
            &initial.access_key,
            initial.secret_key.as_bytes(),
        )
        .context("failed to provision startup credentials")
}

/// Tracker windows from the configuration.
#[must_use]
pub fn tracker_config(config: &MepAuthConfig) -> TrackerConfig {
    TrackerConfig {
        validation_window: Duration::from_secs(config.validation_window_secs),
        block_window: Duration::from_secs(config.block_window_secs),
        block_threshold: config.block_threshold,
    }
}
