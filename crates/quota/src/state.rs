//! Persisted quota state types
//!
//! Wire format (`quota.json`):
//!
//! ```json
//! {
//!   "version": 1,
//!   "accounts": {
//!     "work": {
//!       "status": "limited",
//!       "limitedAt": "2025-01-01T12:00:00Z",
//!       "resetsAt": "7pm (America/Los_Angeles)"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Schema version stamped on every save.
pub const CURRENT_VERSION: u32 = 1;

/// Rate-limit status of one account.
///
/// `Unset` is the empty string on disk and is treated as available, so
/// entries written before the status field existed keep working. `Cooldown`
/// is reserved for an external manager; nothing in this crate sets or clears it.
///
/// Other processes share `quota.json`, so a status this crate does not know
/// is kept verbatim as `Other` and written back unchanged. Such accounts are
/// neither available nor limited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuotaStatus {
    #[default]
    Unset,
    Available,
    Limited,
    Cooldown,
    Other(String),
}

impl From<String> for QuotaStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "" => QuotaStatus::Unset,
            "available" => QuotaStatus::Available,
            "limited" => QuotaStatus::Limited,
            "cooldown" => QuotaStatus::Cooldown,
            _ => QuotaStatus::Other(raw),
        }
    }
}

impl From<QuotaStatus> for String {
    fn from(status: QuotaStatus) -> Self {
        match status {
            QuotaStatus::Unset => String::new(),
            QuotaStatus::Other(raw) => raw,
            known => known.label().to_string(),
        }
    }
}

impl QuotaStatus {
    /// Status label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            QuotaStatus::Unset => "unset",
            QuotaStatus::Available => "available",
            QuotaStatus::Limited => "limited",
            QuotaStatus::Cooldown => "cooldown",
            QuotaStatus::Other(_) => "other",
        }
    }

    /// Whether the account can be handed out.
    pub fn is_available(&self) -> bool {
        matches!(self, QuotaStatus::Available | QuotaStatus::Unset)
    }
}

/// Quota status of a single account.
///
/// `last_used` belongs to the external usage tracker. Transitions made here
/// carry it over untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuotaState {
    #[serde(default)]
    pub status: QuotaStatus,
    /// RFC 3339 UTC timestamp of the transition into `Limited`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub limited_at: String,
    /// Human reset time, e.g. `"7pm (America/Los_Angeles)"`. Only meaningful while limited.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resets_at: String,
    /// RFC 3339 timestamp of last use, empty if never used
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_used: String,
}

impl AccountQuotaState {
    /// A fresh available entry that keeps `last_used`.
    pub fn available(last_used: String) -> Self {
        Self {
            status: QuotaStatus::Available,
            last_used,
            ..Self::default()
        }
    }
}

/// Versioned snapshot of all tracked accounts.
///
/// `accounts` is always present once loaded; a missing or `null` mapping on
/// disk becomes an empty map, and a `null` entry becomes a default (unset) one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    #[serde(default)]
    pub version: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub accounts: BTreeMap<String, AccountQuotaState>,
}

impl Default for QuotaState {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            accounts: BTreeMap::new(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, AccountQuotaState>, D::Error>
where
    D: Deserializer<'de>,
{
    let accounts: Option<BTreeMap<String, Option<AccountQuotaState>>> =
        Option::deserialize(deserializer)?;
    Ok(accounts
        .unwrap_or_default()
        .into_iter()
        .map(|(handle, acct)| (handle, acct.unwrap_or_default()))
        .collect())
}
