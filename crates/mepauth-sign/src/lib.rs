//! SDK-HMAC-SHA256 request signing for mepauth.
//!
//! This crate implements both sides of the mepauth signing protocol: clients
//! use [`authorize`] to stamp the `x-sdk-date` and `Authorization` headers on
//! an outgoing request, and the token service uses [`sign`] to recompute the
//! expected signature of an inbound one.
//!
//! # Overview
//!
//! The signature is an HMAC-SHA256 over a string to sign that embeds the
//! SHA-256 of a canonical request:
//!
//! ```text
//! SDK-HMAC-SHA256\n
//! <x-sdk-date>\n
//! <hex(SHA256(canonical_request))>
//! ```
//!
//! # Modules
//!
//! - [`authorization`] - `Authorization` header grammar and date parsing
//! - [`canonical`] - Canonical request construction
//! - [`error`] - Signing error types
//! - [`signer`] - String-to-sign and HMAC computation

pub mod authorization;
pub mod canonical;
pub mod error;
pub mod signer;

pub use authorization::{
    AuthorizationHeader, is_valid_access_key, parse_authorization, parse_sdk_date,
};
pub use error::SignError;
pub use signer::{ALGORITHM, DATE_FORMAT, DATE_HEADER, authorize, sign};
