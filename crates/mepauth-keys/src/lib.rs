//! Key-encryption-key hierarchy for mepauth.
//!
//! ```text
//! user component ^ file component ^ embedded component
//!        │  PBKDF2-HMAC-SHA256 (persisted salt)
//!        ▼
//!    root key ──AES-256-GCM──► work key ──AES-256-GCM──► secret keys, key passwords
//! ```
//!
//! Every plaintext key lives in a [`zeroize::Zeroizing`] buffer and is wiped
//! when it goes out of scope, including on error paths.
//!
//! # Modules
//!
//! - [`cipher`] - AES-256-GCM primitives and random key material
//! - [`error`] - Key management error types
//! - [`hierarchy`] - Root/work key bootstrap, derivation and secret sealing

pub mod cipher;
pub mod error;
mod fs;
pub mod hierarchy;

pub use cipher::{KEY_LEN, NONCE_LEN, decrypt, encrypt};
pub use error::KeyError;
pub use hierarchy::{
    KeyHierarchy, KeyPaths, MIN_USER_COMPONENT_LEN, SealedSecret, WorkKey,
    validate_user_component,
};
