//! Quota state for a pool of shared Claude accounts
//!
//! Tracks which accounts are rate-limited and when their limits reset, so an
//! external supervisor can rotate workers onto accounts that still have quota.
//! State lives in a single JSON file guarded by an OS advisory lock; every
//! process re-reads it from disk, so there is no in-memory cache to go stale.
//!
//! Account lifecycle:
//! 1. Supervisor registers accounts → `ensure_accounts_tracked` adds them as `Available`
//! 2. A worker hits its limit → `QuotaStore::mark_limited` records the reset time
//! 3. Periodic sweep → `clear_expired` flips accounts whose reset time has passed
//! 4. Supervisor picks the next account → `available_accounts` (least recently used first)

pub mod error;
pub mod policy;
pub mod reset;
pub mod state;
pub mod store;

pub use error::{Error, Result};
pub use policy::{
    available_accounts, clear_expired, clear_expired_at, ensure_accounts_tracked,
    limited_accounts,
};
pub use reset::parse_reset_time;
pub use state::{AccountQuotaState, CURRENT_VERSION, QuotaState, QuotaStatus};
pub use store::QuotaStore;
