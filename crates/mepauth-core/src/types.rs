//! Persisted record types.

use std::fmt;

/// Credential record of one application instance.
///
/// The secret key is never held here in plaintext: `secret_key` is the
/// hex-encoded AES-256-GCM ciphertext produced under the work key and
/// `nonce` the hex-encoded nonce it was sealed with.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyRecord {
    /// Application instance that owns the credentials.
    pub app_instance_id: String,
    /// Public access key identifier.
    pub access_key: String,
    /// Hex-encoded encrypted secret key.
    pub secret_key: String,
    /// Hex-encoded nonce used to encrypt the secret key.
    pub nonce: String,
}

impl fmt::Debug for AccessKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyRecord")
            .field("app_instance_id", &self.app_instance_id)
            .field("access_key", &self.access_key)
            .field("secret_key", &"...")
            .field("nonce", &self.nonce)
            .finish()
    }
}
