//! Error types for request signing.
//!
//! All signing and header-parsing failures are represented by [`SignError`].
//! None of them carry key material.

/// Errors that can occur while signing a request or parsing its signature.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// A header required for signing is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// A header value is not valid visible ASCII.
    #[error("Invalid value for header: {0}")]
    InvalidHeaderValue(String),

    /// The `Authorization` header does not match the expected grammar.
    #[error("Invalid Authorization header format")]
    InvalidAuthorization,

    /// The `x-sdk-date` header does not use the `YYYYMMDDTHHMMSSZ` format.
    #[error("Invalid x-sdk-date value: {0}")]
    InvalidDate(String),

    /// The HMAC could not be computed.
    #[error("Failed to compute request digest")]
    Digest,
}
