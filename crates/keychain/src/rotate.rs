//! Keychain credential swap and rollback
//!
//! Rotation keeps the worker's config dir and gives it another account's
//! token: the target profile's keychain entry is overwritten with the source
//! profile's secret. The target's conversation history stays where it is, so
//! a resumed session continues under the fresh account's quota.
//!
//! Swaps are not serialized against each other. Callers rotating the same
//! target from several places must serialize externally.

use common::Secret;
use tracing::info;

use crate::constants::ACCOUNT_LABEL;
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::store::SecretStore;

/// The target's pre-swap secret, held only until the caller decides whether
/// to roll back.
#[derive(Debug, Clone)]
pub struct CredentialBackup {
    address: String,
    token: Secret<String>,
}

impl CredentialBackup {
    /// Keychain address the backup was taken from.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }
}

/// Overwrite `target`'s keychain secret with `source`'s.
///
/// Steps, each fatal on failure:
/// 1. read the target secret (kept as the backup)
/// 2. read the source secret
/// 3. write the source secret to the target address
///
/// Returns the backup for `restore_credential`.
pub fn swap_credential<S: SecretStore>(
    store: &S,
    target: &Profile,
    source: &Profile,
) -> Result<CredentialBackup> {
    let target_addr = target.service_address();
    let source_addr = source.service_address();

    let backup = store.read(target_addr).map_err(|e| {
        Error::CredentialRead(format!(
            "backing up target token for {}: {e}",
            target.config_dir().display()
        ))
    })?;

    let fresh = store.read(source_addr).map_err(|e| {
        Error::CredentialRead(format!(
            "reading source token for {}: {e}",
            source.config_dir().display()
        ))
    })?;

    if let Err(e) = store.write(target_addr, ACCOUNT_LABEL, fresh.expose()) {
        metrics::counter!("credential_swaps_total", "outcome" => "failed").increment(1);
        return Err(Error::CredentialWrite(format!(
            "writing source token into target {}: {e}",
            target.config_dir().display()
        )));
    }

    metrics::counter!("credential_swaps_total", "outcome" => "swapped").increment(1);
    info!(
        target = %target.config_dir().display(),
        source = %source.config_dir().display(),
        address = target_addr,
        "swapped keychain credential"
    );

    Ok(CredentialBackup {
        address: target_addr.to_string(),
        token: backup,
    })
}

/// Write a backed-up secret back to its address. `None` is a no-op.
pub fn restore_credential<S: SecretStore>(
    store: &S,
    backup: Option<&CredentialBackup>,
) -> Result<()> {
    let Some(backup) = backup else {
        return Ok(());
    };

    store
        .write(&backup.address, ACCOUNT_LABEL, backup.token.expose())
        .map_err(|e| {
            Error::CredentialWrite(format!("restoring token at {:?}: {e}", backup.address))
        })?;

    metrics::counter!("credential_swaps_total", "outcome" => "restored").increment(1);
    info!(address = %backup.address, "restored keychain credential");
    Ok(())
}
