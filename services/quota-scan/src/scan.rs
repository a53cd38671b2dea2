//! One-shot quota sweep and report

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};
use keychain::{Profile, SecretStore, TokenValidator, ValidationError, Validity};
use quota::QuotaStore;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AccountConfig;

/// What the sweep found, printed as JSON on stdout.
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    /// Least recently used first
    pub available: Vec<String>,
    pub limited: Vec<String>,
    /// Limits cleared by this sweep
    pub cleared: usize,
    /// Accounts newly tracked by this sweep
    pub added: usize,
    /// Token verdicts per available account, only with `--validate`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
}

/// Track registered handles, clear expired limits, and summarize.
///
/// Runs as one locked read-modify-write. The state file is only rewritten
/// when something changed.
pub fn scan<Tz: TimeZone>(
    store: &QuotaStore,
    handles: &[String],
    now: &DateTime<Tz>,
) -> quota::Result<ScanReport> {
    store.with_lock(|| {
        let mut state = store.load()?;
        let added = quota::ensure_accounts_tracked(&mut state, handles);
        let cleared = quota::clear_expired_at(&mut state, now);

        if added > 0 || cleared > 0 {
            store.save_unlocked(&mut state)?;
            info!(added, cleared, path = %store.state_path().display(), "quota state updated");
        } else {
            debug!("quota state unchanged");
        }

        Ok(ScanReport {
            available: quota::available_accounts(&state),
            limited: quota::limited_accounts(&state),
            cleared,
            added,
            tokens: BTreeMap::new(),
        })
    })
}

/// Check the stored token of each available account.
///
/// Handles with no configured config dir are skipped.
pub async fn validate_tokens<S: SecretStore>(
    validator: &TokenValidator,
    store: &S,
    accounts: &[AccountConfig],
    available: &[String],
) -> BTreeMap<String, String> {
    let mut verdicts = BTreeMap::new();
    for handle in available {
        let Some(account) = accounts.iter().find(|a| &a.handle == handle) else {
            debug!(account = %handle, "no config dir registered, skipping validation");
            continue;
        };
        let profile = Profile::resolve(&account.config_dir);
        let result = validator.validate(store, &profile).await;
        verdicts.insert(handle.clone(), verdict(&result));
    }
    verdicts
}

fn verdict(result: &Result<Validity, ValidationError>) -> String {
    match result {
        Ok(validity) => format!("valid:{}", validity.label()),
        Err(e) => format!("invalid:{e}"),
    }
}
