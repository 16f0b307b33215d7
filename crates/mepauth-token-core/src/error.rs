//! Token issuance errors.
//!
//! Every failure of the issuance pipeline maps onto one of four codes, each
//! with a fixed HTTP status. Internal errors carry a generic message; the
//! detailed cause is logged server-side and kept as the error source.

use std::fmt;

/// Token error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TokenErrorCode {
    /// The request is malformed (client IP, `Authorization`, `x-sdk-date`).
    InvalidRequest,
    /// The caller could not be authenticated.
    Unauthorized,
    /// The access key is block-listed.
    Forbidden,
    /// Storage, decryption or signing failed.
    InternalError,
}

impl TokenErrorCode {
    /// Returns the error code string used in JSON error bodies.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::InternalError => "InternalError",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::InvalidRequest => http::StatusCode::BAD_REQUEST,
            Self::Unauthorized => http::StatusCode::UNAUTHORIZED,
            Self::Forbidden => http::StatusCode::FORBIDDEN,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token issuance error.
#[derive(Debug)]
pub struct TokenError {
    /// The error code.
    pub code: TokenErrorCode,
    /// A message safe to return to the caller.
    pub message: String,
    /// The underlying source error, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenError({}): {}", self.code, self.message)
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl TokenError {
    /// Create a new error with a custom message.
    #[must_use]
    pub fn with_message(code: TokenErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        self.code.status_code()
    }

    /// Malformed request.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_message(TokenErrorCode::InvalidRequest, message)
    }

    /// Authentication failed.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_message(TokenErrorCode::Unauthorized, message)
    }

    /// Access key is block-listed.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_message(TokenErrorCode::Forbidden, message)
    }

    /// Internal failure with a generic caller-facing message.
    #[must_use]
    pub fn internal() -> Self {
        Self::with_message(TokenErrorCode::InternalError, "internal server error")
    }
}
