//! Core types, configuration, and access-key storage for mepauth.
//!
//! This crate provides the building blocks shared by every mepauth crate:
//! environment-driven configuration, the workspace-wide error type, and the
//! [`AccessKeyStore`] through which per-application credential records are
//! read during token issuance.

mod config;
mod error;
mod fs;
mod store;
mod types;

pub use config::MepAuthConfig;
pub use error::{MepAuthError, MepAuthResult};
pub use fs::write_owner_only;
pub use store::{AccessKeyStore, MemoryAccessKeyStore, StoreError};
pub use types::AccessKeyRecord;
