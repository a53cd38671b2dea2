//! Account selection and expiry sweep
//!
//! Pure functions over a loaded `QuotaState`. None of them touch storage; the
//! caller persists any mutation, normally inside `QuotaStore::with_lock`.

use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::reset::parse_reset_time;
use crate::state::{AccountQuotaState, QuotaState, QuotaStatus};

/// Handles that can be handed out, least recently used first.
///
/// Empty status counts as available. Never-used accounts (empty `last_used`)
/// sort ahead of everything else. Ties keep handle order.
pub fn available_accounts(state: &QuotaState) -> Vec<String> {
    let mut available: Vec<(&String, &AccountQuotaState)> = state
        .accounts
        .iter()
        .filter(|(_, acct)| acct.status.is_available())
        .collect();
    available.sort_by(|(_, a), (_, b)| a.last_used.cmp(&b.last_used));
    available
        .into_iter()
        .map(|(handle, _)| handle.clone())
        .collect()
}

/// Handles whose status is exactly `Limited`. Cooldown accounts are in neither list.
pub fn limited_accounts(state: &QuotaState) -> Vec<String> {
    state
        .accounts
        .iter()
        .filter(|(_, acct)| acct.status == QuotaStatus::Limited)
        .map(|(handle, _)| handle.clone())
        .collect()
}

/// Add an `Available` entry for every registered handle not yet tracked.
///
/// Existing entries are never touched, so repeated calls are idempotent.
/// Returns the number of entries added.
pub fn ensure_accounts_tracked<I, S>(state: &mut QuotaState, registered: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut added = 0;
    for handle in registered {
        let handle = handle.as_ref();
        if !state.accounts.contains_key(handle) {
            state
                .accounts
                .insert(handle.to_string(), AccountQuotaState::available(String::new()));
            debug!(account = handle, "tracking new account");
            added += 1;
        }
    }
    added
}

/// Clear limits whose reset time has passed, using the local clock.
pub fn clear_expired(state: &mut QuotaState) -> usize {
    clear_expired_at(state, &Local::now())
}

/// Clear limits whose reset time is strictly before `now`.
///
/// Only `Limited` accounts with a non-empty `resets_at` are considered. A
/// reset time that fails to parse leaves the account limited. Cleared
/// accounts become `Available` with `last_used` kept. Returns the number
/// cleared.
pub fn clear_expired_at<Tz: TimeZone>(state: &mut QuotaState, now: &DateTime<Tz>) -> usize {
    let now_utc = now.with_timezone(&Utc);
    let mut cleared = 0;

    for (handle, acct) in state.accounts.iter_mut() {
        if acct.status != QuotaStatus::Limited || acct.resets_at.is_empty() {
            continue;
        }

        let reset = match parse_reset_time(&acct.resets_at, now) {
            Ok(reset) => reset,
            Err(e) => {
                warn!(
                    account = %handle,
                    resets_at = %acct.resets_at,
                    error = %e,
                    "skipping unparseable reset time"
                );
                continue;
            }
        };

        if now_utc > reset.with_timezone(&Utc) {
            info!(
                account = %handle,
                resets_at = %acct.resets_at,
                "limit expired, account available again"
            );
            *acct = AccountQuotaState::available(std::mem::take(&mut acct.last_used));
            cleared += 1;
        }
    }

    if cleared > 0 {
        metrics::counter!("quota_expired_cleared_total").increment(cleared as u64);
    }
    cleared
}
