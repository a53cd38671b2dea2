//! Config-dir profiles and their keychain service addresses
//!
//! The Claude CLI keys its keychain entry by config dir:
//! `"Claude Code-credentials-" + hex(SHA256(expanded_path)[..4])`, except the
//! default `~/.claude`, which uses the bare base name. Computing the same
//! address here lets us read and overwrite exactly the entry the CLI uses.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::constants::{DEFAULT_CONFIG_DIR, IDENTITY_FILE, SERVICE_BASE};

/// A config dir together with its keychain address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    config_dir: PathBuf,
    service_address: String,
}

impl Profile {
    /// Resolve a config dir against the current user's home directory.
    pub fn resolve(config_dir: impl AsRef<Path>) -> Self {
        Self::resolve_with_home(config_dir, dirs::home_dir().as_deref())
    }

    /// Resolve a config dir against an explicit home directory.
    ///
    /// A leading `~` is expanded to `home`; relative paths are made absolute
    /// against the current directory.
    pub fn resolve_with_home(config_dir: impl AsRef<Path>, home: Option<&Path>) -> Self {
        let config_dir = expand(config_dir.as_ref(), home);
        let service_address = address_for(&config_dir, home);
        Self {
            config_dir,
            service_address,
        }
    }

    /// Expanded, absolute config dir.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn service_address(&self) -> &str {
        &self.service_address
    }

    /// Path of the cached identity document (`.claude.json`).
    pub fn identity_path(&self) -> PathBuf {
        self.config_dir.join(IDENTITY_FILE)
    }
}

/// Keychain service address for a config dir.
pub fn service_address(config_dir: impl AsRef<Path>) -> String {
    Profile::resolve(config_dir).service_address
}

fn expand(path: &Path, home: Option<&Path>) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) if rest.as_os_str().is_empty() => home.to_path_buf(),
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}

fn address_for(config_dir: &Path, home: Option<&Path>) -> String {
    if home.is_some_and(|home| config_dir == home.join(DEFAULT_CONFIG_DIR)) {
        return SERVICE_BASE.to_string();
    }

    let digest = Sha256::digest(config_dir.to_string_lossy().as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("{SERVICE_BASE}-{suffix}")
}
