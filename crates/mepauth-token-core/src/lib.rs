//! Token issuance core for mepauth.
//!
//! Ties the request signer, the key hierarchy and the abuse tracker together:
//! an inbound token request is parsed, checked against the block list, its
//! signature recomputed with the caller's decrypted secret key, and on success
//! an RS256 JWT is minted.
//!
//! # Modules
//!
//! - [`credentials`] - Provisioning and resolution of caller secret keys
//! - [`error`] - Token error taxonomy mapped onto HTTP status codes
//! - [`issuer`] - The staged token issuance pipeline
//! - [`jwt`] - RS256 token signing with an encrypted PKCS#8 key
//! - [`tracker`] - Per-access-key failure tracking and block-listing

pub mod credentials;
pub mod error;
pub mod issuer;
pub mod jwt;
pub mod tracker;

pub use credentials::{CredentialError, CredentialProvider, CredentialService, ResolvedCredential};
pub use error::{TokenError, TokenErrorCode};
pub use issuer::{TokenIssuer, TokenResponse};
pub use jwt::{Claims, IssuedToken, TokenSigner};
pub use tracker::{AbuseTracker, AkState, TrackerConfig};
