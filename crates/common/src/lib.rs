//! Types shared by the quota rotation crates and the scan binary

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
