//! Caller credential provisioning and resolution.
//!
//! Secret keys are stored only as ciphertext under the work key; a fresh nonce
//! is drawn for every provisioning.

use std::fmt;
use std::sync::Arc;

use mepauth_core::{AccessKeyRecord, AccessKeyStore, StoreError};
use mepauth_keys::{KeyError, KeyHierarchy, SealedSecret};
use tracing::info;
use zeroize::Zeroizing;

/// Errors raised while provisioning or resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No record exists for the access key.
    #[error("access key not found")]
    NotFound,

    /// The access key does not match the access-key grammar.
    #[error("access key must be 20 characters of [A-Za-z0-9_=+/]")]
    InvalidAccessKey,

    /// The secret key is empty.
    #[error("secret key must not be empty")]
    EmptySecretKey,

    /// The record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sealing or opening the secret key failed.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A caller's decrypted credentials.
pub struct ResolvedCredential {
    /// Application instance owning the access key.
    pub app_instance_id: String,
    /// The plaintext secret key, wiped on drop.
    pub secret_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("app_instance_id", &self.app_instance_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Trait for resolving the secret key of an access key.
pub trait CredentialProvider: Send + Sync {
    /// Resolve and decrypt the credentials of `access_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] for an unknown access key,
    /// [`CredentialError::Store`] or [`CredentialError::Key`] otherwise.
    fn resolve(&self, access_key: &str) -> Result<ResolvedCredential, CredentialError>;
}

/// Credential management over an [`AccessKeyStore`] and the key hierarchy.
pub struct CredentialService {
    store: Arc<dyn AccessKeyStore>,
    keys: Arc<KeyHierarchy>,
}

impl fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialService")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl CredentialService {
    /// Create a service over `store`, sealing secrets with `keys`.
    pub fn new(store: Arc<dyn AccessKeyStore>, keys: Arc<KeyHierarchy>) -> Self {
        Self { store, keys }
    }

    /// Register (or replace) the credentials of an application instance.
    pub fn provision(
        &self,
        app_instance_id: &str,
        access_key: &str,
        secret_key: &[u8],
    ) -> Result<(), CredentialError> {
        if !mepauth_sign::is_valid_access_key(access_key) {
            return Err(CredentialError::InvalidAccessKey);
        }
        if secret_key.is_empty() {
            return Err(CredentialError::EmptySecretKey);
        }

        let (ciphertext, nonce) = self.keys.seal(secret_key)?.to_hex();
        self.store.upsert(AccessKeyRecord {
            app_instance_id: app_instance_id.to_owned(),
            access_key: access_key.to_owned(),
            secret_key: ciphertext,
            nonce,
        })?;

        info!(app_instance_id, access_key, "credentials provisioned");
        Ok(())
    }

    /// Remove the credentials of an application instance.
    ///
    /// Returns whether credentials existed.
    pub fn revoke(&self, app_instance_id: &str) -> Result<bool, CredentialError> {
        let removed = self.store.delete(app_instance_id)?;
        if removed {
            info!(app_instance_id, "credentials revoked");
        }
        Ok(removed)
    }

    /// Resolve and decrypt the secret key of `access_key`.
    pub fn secret_key(&self, access_key: &str) -> Result<ResolvedCredential, CredentialError> {
        let record = self
            .store
            .read_by_access_key(access_key)?
            .ok_or(CredentialError::NotFound)?;

        let sealed = SealedSecret::from_hex(&record.secret_key, &record.nonce)?;
        let secret_key = self.keys.open(&sealed)?;

        Ok(ResolvedCredential {
            app_instance_id: record.app_instance_id,
            secret_key,
        })
    }
}

impl CredentialProvider for CredentialService {
    fn resolve(&self, access_key: &str) -> Result<ResolvedCredential, CredentialError> {
        self.secret_key(access_key)
    }
}
