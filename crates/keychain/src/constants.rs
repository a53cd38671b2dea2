//! Claude Code credential layout
//!
//! These mirror where the Claude CLI keeps its OAuth token and cached
//! identity, so a swapped credential is picked up by an unmodified CLI.

/// Keychain service name for the default config dir. Other config dirs
/// append `-<8 hex chars>`.
pub const SERVICE_BASE: &str = "Claude Code-credentials";

/// Default config dir, relative to the user's home. Maps to the bare
/// `SERVICE_BASE` with no suffix.
pub const DEFAULT_CONFIG_DIR: &str = ".claude";

/// Account label written alongside every keychain entry
pub const ACCOUNT_LABEL: &str = "claude-code";

/// Identity metadata document inside a config dir
pub const IDENTITY_FILE: &str = ".claude.json";

/// Field of the identity document swapped during rotation
pub const IDENTITY_FIELD: &str = "oauthAccount";

/// Inference endpoint probed to check whether a token is accepted
pub const VALIDATION_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// API version header sent with the validation probe
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upper bound on the validation probe, in seconds
pub const VALIDATION_TIMEOUT_SECS: u64 = 10;
