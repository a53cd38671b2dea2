//! Crash-safe, cross-process quota state persistence
//!
//! Layout under the control directory:
//! - `quota.json` holds the `QuotaState` snapshot
//! - `.runtime/quota.lock` is an empty file used only as an `flock` handle
//!
//! The lock lives in a separate file so acquiring it never depends on the data
//! file existing. Writes go to a temp file in the same directory and are
//! renamed over the target, so readers see either the old or the new snapshot.
//!
//! Lock acquisition blocks the calling thread until granted. There is no
//! timeout; callers that need one must wrap the call themselves.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::state::{AccountQuotaState, CURRENT_VERSION, QuotaState, QuotaStatus};

const STATE_FILE: &str = "quota.json";
const RUNTIME_DIR: &str = ".runtime";
const LOCK_FILE: &str = "quota.lock";

/// Quota state store rooted at a control directory.
///
/// Holds no state in memory. Every operation re-reads the file, so the file
/// on disk is the single source of truth across processes and restarts.
#[derive(Debug, Clone)]
pub struct QuotaStore {
    state_path: PathBuf,
    lock_path: PathBuf,
}

/// Exclusive advisory lock on the quota lock file, released on drop.
struct QuotaLock {
    file: File,
    path: PathBuf,
}

impl Drop for QuotaLock {
    fn drop(&mut self) {
        // Closing the fd releases the lock anyway; unlock explicitly so release
        // happens at a deterministic point.
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release quota lock");
        }
    }
}

impl QuotaStore {
    pub fn new(control_dir: impl AsRef<Path>) -> Self {
        let control_dir = control_dir.as_ref();
        Self {
            state_path: control_dir.join(STATE_FILE),
            lock_path: control_dir.join(RUNTIME_DIR).join(LOCK_FILE),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Acquire the exclusive lock, blocking until it is granted.
    fn lock(&self) -> Result<QuotaLock> {
        if let Some(dir) = self.lock_path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Lock(format!("creating lock dir {}: {e}", dir.display()))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| {
                Error::Lock(format!(
                    "opening lock file {}: {e}",
                    self.lock_path.display()
                ))
            })?;

        FileExt::lock_exclusive(&file).map_err(|e| {
            Error::Lock(format!(
                "acquiring lock on {}: {e}",
                self.lock_path.display()
            ))
        })?;

        debug!(path = %self.lock_path.display(), "acquired quota lock");
        Ok(QuotaLock {
            file,
            path: self.lock_path.clone(),
        })
    }

    /// Read the persisted snapshot.
    ///
    /// A missing file is a first run and yields an empty state at the current
    /// version. A file that exists but does not parse is `StateCorrupt`; no
    /// partial state is ever returned.
    pub fn load(&self) -> Result<QuotaState> {
        let contents = match fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.state_path.display(), "quota state not found, starting empty");
                return Ok(QuotaState::default());
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading quota state {}: {e}",
                    self.state_path.display()
                )));
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            Error::StateCorrupt(format!(
                "parsing quota state {}: {e}",
                self.state_path.display()
            ))
        })
    }

    /// Stamp the current version and write the state under the lock.
    pub fn save(&self, state: &mut QuotaState) -> Result<()> {
        let _lock = self.lock()?;
        self.save_unlocked(state)
    }

    /// Run `f` while holding the exclusive lock.
    ///
    /// Use this for multi-step read-modify-write sequences (`load`, mutate,
    /// `save_unlocked`) so no other process can interleave between the read
    /// and the write. The lock is released on every exit path, including an
    /// error or panic inside `f`, and `f`'s error is returned unchanged.
    pub fn with_lock<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let _lock = self.lock()?;
        f()
    }

    /// Stamp the current version and write the state without locking.
    ///
    /// Only valid inside `with_lock`. Calling it anywhere else races with other
    /// writers and can lose their updates.
    pub fn save_unlocked(&self, state: &mut QuotaState) -> Result<()> {
        state.version = CURRENT_VERSION;
        write_atomic(&self.state_path, state)
    }

    /// Mark an account rate-limited until `resets_at`.
    ///
    /// Replaces the account's entry with a `Limited` one stamped with the
    /// current UTC time, keeping only `last_used` from the previous entry.
    pub fn mark_limited(&self, handle: &str, resets_at: &str) -> Result<()> {
        let _lock = self.lock()?;
        let mut state = self.load()?;

        let last_used = take_last_used(&mut state, handle);
        state.accounts.insert(
            handle.to_string(),
            AccountQuotaState {
                status: QuotaStatus::Limited,
                limited_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                resets_at: resets_at.to_string(),
                last_used,
            },
        );

        self.save_unlocked(&mut state)?;
        metrics::counter!("quota_transitions_total", "status" => "limited").increment(1);
        info!(account = handle, resets_at, "account marked limited");
        Ok(())
    }

    /// Mark an account available, clearing `limited_at` and `resets_at`.
    pub fn mark_available(&self, handle: &str) -> Result<()> {
        let _lock = self.lock()?;
        let mut state = self.load()?;

        let last_used = take_last_used(&mut state, handle);
        state
            .accounts
            .insert(handle.to_string(), AccountQuotaState::available(last_used));

        self.save_unlocked(&mut state)?;
        metrics::counter!("quota_transitions_total", "status" => "available").increment(1);
        info!(account = handle, "account marked available");
        Ok(())
    }
}

fn take_last_used(state: &mut QuotaState, handle: &str) -> String {
    state
        .accounts
        .remove(handle)
        .map(|acct| acct.last_used)
        .unwrap_or_default()
}

/// Write the state to `path` atomically.
///
/// Serializes to a temp file next to the target, then renames it over the
/// target. Creates the parent directory if needed.
fn write_atomic(path: &Path, state: &QuotaState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Io(format!("serializing quota state: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("quota state path has no parent directory".into()))?;
    fs::create_dir_all(dir)
        .map_err(|e| Error::Io(format!("creating quota dir {}: {e}", dir.display())))?;

    let tmp_path = dir.join(format!(".quota.tmp.{}", std::process::id()));
    fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp quota file: {e}")))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Io(format!("renaming temp quota file: {e}")))?;

    debug!(path = %path.display(), accounts = state.accounts.len(), "persisted quota state");
    Ok(())
}
