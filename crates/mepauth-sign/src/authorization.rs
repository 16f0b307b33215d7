//! `Authorization` header grammar and `x-sdk-date` parsing.
//!
//! The header must match exactly:
//!
//! ```text
//! SDK-HMAC-SHA256 Access=<20 chars of [A-Za-z0-9_=+/]>, SignedHeaders=<28 chars>, Signature=<64 chars>
//! ```
//!
//! Malformed input is reported as [`SignError::InvalidAuthorization`] before
//! any key material is touched.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::SignError;
use crate::signer::DATE_FORMAT;

static AUTHORIZATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^SDK-HMAC-SHA256 Access=([A-Za-z0-9_=+/]{20}), SignedHeaders=([^, ]{28}), Signature=([^, ]{64})$",
    )
    .expect("authorization grammar is a valid regex")
});

static ACCESS_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_=+/]{20}$").expect("access key grammar is a valid regex")
});

/// Parsed components of an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    /// The caller's access key.
    pub access_key: String,
    /// Lowercase names of the signed headers, in header order.
    pub signed_headers: Vec<String>,
    /// The hex signature presented by the caller.
    pub signature: String,
}

/// Parse an `Authorization` header value.
///
/// # Examples
///
/// ```
/// use mepauth_sign::parse_authorization;
///
/// let sig = "0".repeat(64);
/// let header = format!(
///     "SDK-HMAC-SHA256 Access=QVUJMSUMgS0VZLS0tLS0, SignedHeaders=content-type;host;x-sdk-date, Signature={sig}"
/// );
/// let parsed = parse_authorization(&header).unwrap();
/// assert_eq!(parsed.access_key, "QVUJMSUMgS0VZLS0tLS0");
/// ```
pub fn parse_authorization(header: &str) -> Result<AuthorizationHeader, SignError> {
    let captures = AUTHORIZATION_RE
        .captures(header)
        .ok_or(SignError::InvalidAuthorization)?;

    let field = |i: usize| {
        captures
            .get(i)
            .map(|m| m.as_str())
            .ok_or(SignError::InvalidAuthorization)
    };

    let access_key = field(1)?.to_owned();
    let signed_headers = field(2)?
        .split(';')
        .map(str::to_ascii_lowercase)
        .collect();
    let signature = field(3)?.to_owned();

    Ok(AuthorizationHeader {
        access_key,
        signed_headers,
        signature,
    })
}

/// Whether `access_key` matches the access-key class of the header grammar.
#[must_use]
pub fn is_valid_access_key(access_key: &str) -> bool {
    ACCESS_KEY_RE.is_match(access_key)
}

/// Parse an `x-sdk-date` value (`YYYYMMDDTHHMMSSZ`, UTC).
///
/// # Examples
///
/// ```
/// use mepauth_sign::parse_sdk_date;
///
/// assert!(parse_sdk_date("20200101T120000Z").is_ok());
/// assert!(parse_sdk_date("2020-01-01T12:00:00Z").is_err());
/// ```
pub fn parse_sdk_date(value: &str) -> Result<DateTime<Utc>, SignError> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| SignError::InvalidDate(value.to_owned()))
}
