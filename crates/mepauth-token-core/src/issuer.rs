//! Token issuance pipeline.
//!
//! Each stage is an early exit:
//!
//! 1. `X-Real-Ip` must hold a valid IP address (400).
//! 2. `Authorization` must match the header grammar (400).
//! 3. `x-sdk-date` must be present and well formed (400).
//! 4. A block-listed access key is refused (403).
//! 5. The caller's secret key is resolved and decrypted: unknown access key
//!    401, storage or decryption failure 500.
//! 6. The signature is recomputed over the signed headers only and compared
//!    in constant time: a mismatch is recorded by the tracker (401), a match
//!    clears it.
//! 7. An RS256 token is minted (500 on failure).

use std::net::IpAddr;
use std::sync::Arc;

use http::HeaderValue;
use mepauth_sign::{AuthorizationHeader, DATE_HEADER, parse_authorization, parse_sdk_date};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialError, CredentialProvider};
use crate::error::TokenError;
use crate::jwt::{IssuedToken, TokenSigner};
use crate::tracker::{AbuseTracker, TrackerConfig};

/// Header carrying the caller's address, set by the fronting proxy.
pub const CLIENT_IP_HEADER: &str = "x-real-ip";

/// Body of a successful token response.
#[derive(Debug, Serialize)]
pub struct TokenResponse<'a> {
    /// The compact JWS.
    pub access_token: &'a str,
    /// Always `Bearer`.
    pub token_type: &'static str,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

impl<'a> From<&'a IssuedToken> for TokenResponse<'a> {
    fn from(token: &'a IssuedToken) -> Self {
        Self {
            access_token: token.access_token.as_str(),
            token_type: "Bearer",
            expires_in: token.expires_in,
        }
    }
}

/// Verifies signed token requests and mints tokens.
///
/// Owns the [`AbuseTracker`]; [`TokenIssuer::issue`] must run inside a Tokio
/// runtime because signature failures arm tracker timers.
pub struct TokenIssuer {
    credentials: Arc<dyn CredentialProvider>,
    signer: TokenSigner,
    tracker: AbuseTracker,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("signer", &self.signer)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer with a fresh tracker.
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        signer: TokenSigner,
        tracker_config: TrackerConfig,
    ) -> Self {
        Self {
            credentials,
            signer,
            tracker: AbuseTracker::new(tracker_config),
        }
    }

    /// The abuse tracker consulted by this issuer.
    #[must_use]
    pub fn tracker(&self) -> &AbuseTracker {
        &self.tracker
    }

    /// Verify `request` and mint a token for its caller.
    pub fn issue<B>(&self, request: &http::Request<B>) -> Result<IssuedToken, TokenError> {
        let client_ip = client_ip(request)?;

        let authorization = request
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_authorization(v).ok())
            .ok_or_else(|| {
                info!(%client_ip, "rejected token request with malformed authorization");
                TokenError::invalid_request("invalid Authorization header")
            })?;
        let access_key = authorization.access_key.as_str();

        let date_valid = request
            .headers()
            .get(DATE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| parse_sdk_date(v).is_ok());
        if !date_valid {
            info!(%client_ip, access_key, "rejected token request with invalid date");
            return Err(TokenError::invalid_request("invalid x-sdk-date header"));
        }

        if self.tracker.is_block_listed(access_key) {
            warn!(%client_ip, access_key, "rejected token request from block-listed access key");
            return Err(TokenError::forbidden("access key is temporarily blocked"));
        }

        let credential = self.credentials.resolve(access_key).map_err(|e| match e {
            CredentialError::NotFound => {
                info!(%client_ip, access_key, "rejected token request for unknown access key");
                TokenError::unauthorized("authentication failed")
            }
            other => {
                error!(%client_ip, access_key, error = %other, "failed to resolve secret key");
                TokenError::internal().with_source(other)
            }
        })?;

        if !signature_matches(request, &authorization, &credential.secret_key) {
            self.tracker.process_failed_signature(access_key);
            info!(%client_ip, access_key, "rejected token request with invalid signature");
            return Err(TokenError::unauthorized("authentication failed"));
        }
        self.tracker.clear_on_success(access_key);

        let token = self
            .signer
            .mint(&credential.app_instance_id, &client_ip.to_string())
            .map_err(|e| {
                error!(%client_ip, access_key, error = %e, "failed to sign token");
                TokenError::internal().with_source(e)
            })?;

        info!(
            %client_ip,
            access_key,
            app_instance_id = %credential.app_instance_id,
            "token issued"
        );
        Ok(token)
    }
}

fn client_ip<B>(request: &http::Request<B>) -> Result<IpAddr, TokenError> {
    request
        .headers()
        .get(CLIENT_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            info!("rejected token request without valid client ip");
            TokenError::invalid_request("invalid client IP address")
        })
}

/// Recompute the signature over the signed headers and compare it with the
/// presented one. Any failure to recompute counts as a mismatch.
fn signature_matches<B>(
    request: &http::Request<B>,
    authorization: &AuthorizationHeader,
    secret_key: &[u8],
) -> bool {
    let expected = signed_request(request, &authorization.signed_headers)
        .and_then(|signed| mepauth_sign::sign(&signed, secret_key).ok());

    match expected {
        Some(expected) => expected
            .as_bytes()
            .ct_eq(authorization.signature.as_bytes())
            .into(),
        None => {
            debug!(
                access_key = %authorization.access_key,
                "could not recompute signature over signed headers"
            );
            false
        }
    }
}

/// Rebuild `request` carrying only `signed_headers`.
///
/// `host` comes from the `Host` header or, failing that, the URI authority;
/// a signed header absent from the request is signed with an empty value.
fn signed_request<B>(
    request: &http::Request<B>,
    signed_headers: &[String],
) -> Option<http::Request<()>> {
    let mut builder = http::Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone());

    for name in signed_headers {
        if name == "host" {
            let host = request
                .headers()
                .get(http::header::HOST)
                .cloned()
                .or_else(|| {
                    request
                        .uri()
                        .authority()
                        .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
                })
                .unwrap_or_else(|| HeaderValue::from_static(""));
            builder = builder.header(name.as_str(), host);
            continue;
        }

        let mut values = request.headers().get_all(name.as_str()).iter().peekable();
        if values.peek().is_none() {
            builder = builder.header(name.as_str(), HeaderValue::from_static(""));
        }
        for value in values {
            builder = builder.header(name.as_str(), value.clone());
        }
    }

    builder.body(()).ok()
}
