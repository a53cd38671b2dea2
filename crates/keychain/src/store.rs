//! OS secure credential store
//!
//! Rotation only needs two capabilities from the store: read the secret at an
//! address, and write a secret at an address. `KeychainStore` provides them on
//! macOS via the `security` tool. Other platforms report `Unsupported` instead
//! of falling back to plaintext storage.

use std::collections::HashMap;
use std::sync::Mutex;

use common::Secret;

use crate::error::{Error, Result};

/// Read/write access to secrets addressed by service name.
pub trait SecretStore: Send + Sync {
    /// Read the secret stored at `address`.
    fn read(&self, address: &str) -> Result<Secret<String>>;

    /// Create or replace the secret at `address`, labelled with `label`.
    fn write(&self, address: &str, label: &str, secret: &str) -> Result<()>;
}

impl<S: SecretStore + ?Sized> SecretStore for &S {
    fn read(&self, address: &str) -> Result<Secret<String>> {
        (**self).read(address)
    }

    fn write(&self, address: &str, label: &str, secret: &str) -> Result<()> {
        (**self).write(address, label, secret)
    }
}

/// The login keychain, driven through `/usr/bin/security`.
#[derive(Debug, Clone, Default)]
pub struct KeychainStore;

impl KeychainStore {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "macos")]
impl SecretStore for KeychainStore {
    fn read(&self, address: &str) -> Result<Secret<String>> {
        let output = std::process::Command::new("security")
            .args(["find-generic-password", "-s", address, "-w"])
            .output()
            .map_err(|e| Error::CredentialRead(format!("running security for {address:?}: {e}")))?;

        if !output.status.success() {
            return Err(Error::CredentialRead(format!(
                "no readable keychain entry {address:?}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = String::from_utf8(output.stdout).map_err(|e| {
            Error::CredentialRead(format!("keychain entry {address:?} is not UTF-8: {e}"))
        })?;
        tracing::debug!(address, "read keychain entry");
        Ok(Secret::new(token.trim().to_string()))
    }

    fn write(&self, address: &str, label: &str, secret: &str) -> Result<()> {
        // -U updates the entry in place if it already exists
        let output = std::process::Command::new("security")
            .args([
                "add-generic-password",
                "-U",
                "-s",
                address,
                "-a",
                label,
                "-w",
                secret,
            ])
            .output()
            .map_err(|e| {
                Error::CredentialWrite(format!("running security for {address:?}: {e}"))
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::CredentialWrite(format!(
                "writing keychain entry {address:?}: {}",
                combined.trim()
            )));
        }
        tracing::debug!(address, "wrote keychain entry");
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
impl SecretStore for KeychainStore {
    fn read(&self, address: &str) -> Result<Secret<String>> {
        Err(Error::Unsupported(format!(
            "cannot read {address:?}: no keychain on {}",
            std::env::consts::OS
        )))
    }

    fn write(&self, address: &str, _label: &str, _secret: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "cannot write {address:?}: no keychain on {}",
            std::env::consts::OS
        )))
    }
}

/// In-process store for tests and for embedding rotation logic without an
/// OS keychain.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry, returning the store for chaining.
    pub fn with_entry(self, address: &str, secret: &str) -> Self {
        self.lock()
            .insert(address.to_string(), (String::new(), secret.to_string()));
        self
    }

    /// Label last written at `address`, if any.
    pub fn label(&self, address: &str) -> Option<String> {
        self.lock().get(address).map(|(label, _)| label.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, String)>> {
        // Entries are replaced whole, so a poisoned map is still consistent
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn read(&self, address: &str) -> Result<Secret<String>> {
        self.lock()
            .get(address)
            .map(|(_, secret)| Secret::new(secret.clone()))
            .ok_or_else(|| Error::CredentialRead(format!("no entry for {address:?}")))
    }

    fn write(&self, address: &str, label: &str, secret: &str) -> Result<()> {
        self.lock()
            .insert(address.to_string(), (label.to_string(), secret.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.write("svc", "claude-code", "tok").unwrap();

        assert_eq!(store.read("svc").unwrap().expose(), "tok");
        assert_eq!(store.label("svc").as_deref(), Some("claude-code"));
    }

    #[test]
    fn memory_store_missing_entry_is_read_failure() {
        let store = MemoryStore::new();
        let err = store.read("missing").unwrap_err();
        assert!(matches!(err, Error::CredentialRead(_)), "got: {err}");
        assert!(err.to_string().contains("missing"));
    }

    fn read_via<S: SecretStore>(store: S, address: &str) -> String {
        store.read(address).unwrap().expose().clone()
    }

    #[test]
    fn store_works_through_reference() {
        let store = MemoryStore::new().with_entry("svc", "tok");
        assert_eq!(read_via(&store, "svc"), "tok");
        assert_eq!(store.read("svc").unwrap().expose(), "tok");
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn keychain_store_is_unsupported_off_macos() {
        let store = KeychainStore::new();
        assert!(matches!(store.read("svc"), Err(Error::Unsupported(_))));
        assert!(matches!(
            store.write("svc", "claude-code", "tok"),
            Err(Error::Unsupported(_))
        ));
    }
}
