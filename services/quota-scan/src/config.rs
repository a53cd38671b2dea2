//! Configuration types and loading
//!
//! Config precedence: `--config` flag > `CONFIG_PATH` env var > `quota-scan.toml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use keychain::constants::{VALIDATION_ENDPOINT, VALIDATION_TIMEOUT_SECS};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub quota: QuotaConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Where the shared quota state lives
#[derive(Debug, Deserialize)]
pub struct QuotaConfig {
    /// Directory holding `quota.json` and `.runtime/quota.lock`
    pub control_dir: PathBuf,
}

/// Token validation probe settings
#[derive(Debug, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

/// A registered account and the config dir its worker uses
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub handle: String,
    pub config_dir: PathBuf,
}

fn default_endpoint() -> String {
    VALIDATION_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    VALIDATION_TIMEOUT_SECS
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| common::Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.quota.control_dir.as_os_str().is_empty() {
            return Err(common::Error::Config("control_dir must not be empty".into()));
        }

        if !self.validation.endpoint.starts_with("http://")
            && !self.validation.endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "endpoint must start with http:// or https://, got: {}",
                self.validation.endpoint
            )));
        }

        if self.validation.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.handle.is_empty() {
                return Err(common::Error::Config("account handle must not be empty".into()));
            }
            if !seen.insert(account.handle.as_str()) {
                return Err(common::Error::Config(format!(
                    "duplicate account handle {:?}",
                    account.handle
                )));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("quota-scan.toml")
    }

    /// Registered handles, in config order.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.accounts.iter().map(|a| a.handle.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("quota-scan.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn valid_toml() -> &'static str {
        r#"
[quota]
control_dir = "/srv/town/mayor"

[[accounts]]
handle = "work"
config_dir = "~/.claude-accounts/work"

[[accounts]]
handle = "personal"
config_dir = "/home/agent/.claude"
"#
    }

    #[test]
    fn test_load_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), valid_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.quota.control_dir, PathBuf::from("/srv/town/mayor"));
        assert_eq!(config.validation.endpoint, VALIDATION_ENDPOINT);
        assert_eq!(config.validation.timeout_secs, 10);
        assert_eq!(config.handles().collect::<Vec<_>>(), ["work", "personal"]);
        assert_eq!(
            config.accounts[0].config_dir,
            PathBuf::from("~/.claude-accounts/work")
        );
    }

    #[test]
    fn test_load_validation_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[quota]
control_dir = "/srv/town/mayor"

[validation]
endpoint = "http://127.0.0.1:9000/v1/messages"
timeout_secs = 3
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.validation.endpoint, "http://127.0.0.1:9000/v1/messages");
        assert_eq!(config.validation.timeout_secs, 3);
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/path/quota-scan.toml")).unwrap_err();
        assert!(matches!(err, common::Error::Read { .. }), "got: {err}");
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "not valid {{{{ toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, common::Error::Toml(_)), "got: {err}");
    }

    #[test]
    fn test_missing_quota_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[[accounts]]\nhandle = \"a\"\nconfig_dir = \"/a\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_empty_control_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[quota]\ncontrol_dir = \"\"\n");

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("control_dir"), "got: {err}");
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[quota]
control_dir = "/srv/town/mayor"

[[accounts]]
handle = "work"
config_dir = "/a"

[[accounts]]
handle = "work"
config_dir = "/b"
"#,
        );

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn test_empty_handle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[quota]\ncontrol_dir = \"/x\"\n\n[[accounts]]\nhandle = \"\"\nconfig_dir = \"/a\"\n",
        );

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("handle"), "got: {err}");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[quota]\ncontrol_dir = \"/x\"\n\n[validation]\ntimeout_secs = 0\n",
        );

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[quota]\ncontrol_dir = \"/x\"\n\n[validation]\nendpoint = \"api.anthropic.com\"\n",
        );

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("http://"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("quota-scan.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
