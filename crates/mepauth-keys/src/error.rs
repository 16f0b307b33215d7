//! Error types for key management.

use std::path::PathBuf;

/// Errors raised by the key hierarchy.
///
/// Decryption failures are deliberately generic: a wrong key, a corrupted
/// ciphertext and a corrupted nonce all surface as [`KeyError::Decryption`].
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The user-supplied key component is empty or too short.
    #[error("key component must be at least {min} bytes long")]
    ComponentTooShort {
        /// Minimum accepted length in bytes.
        min: usize,
    },

    /// A persisted key-material file has an unexpected size.
    #[error("key material file {} is malformed", path.display())]
    Malformed {
        /// The offending file.
        path: PathBuf,
    },

    /// Encryption failed.
    #[error("encryption failed")]
    Encryption,

    /// Decryption failed.
    #[error("decryption failed")]
    Decryption,

    /// Reading or writing a key-material file failed.
    #[error("key material I/O error on {}: {source}", path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}
