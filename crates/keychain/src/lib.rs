//! Credential rotation between Claude config dirs
//!
//! Each config dir owns one keychain entry (the OAuth token) and one cached
//! identity document. Rotating a worker means copying both from a fresh
//! account's profile into the worker's profile, keeping backups so a failed
//! handoff can be rolled back.
//!
//! Flow:
//! 1. `TokenValidator::validate` on the source profile (fail-open)
//! 2. `swap_credential` → `CredentialBackup`
//! 3. `swap_identity_metadata` → prior identity value
//! 4. On failure: `restore_identity_metadata`, then `restore_credential`

pub mod constants;
pub mod error;
pub mod identity;
pub mod profile;
pub mod rotate;
pub mod store;
pub mod validate;

pub use error::{Error, Result, ValidationError};
pub use identity::{restore_identity_metadata, swap_identity_metadata};
pub use profile::{Profile, service_address};
pub use rotate::{CredentialBackup, restore_credential, swap_credential};
pub use store::{KeychainStore, MemoryStore, SecretStore};
pub use validate::{TokenValidator, Validity};
