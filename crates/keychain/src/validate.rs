//! Fail-open token validation
//!
//! Answers "is this profile's token still usable?" before a rotation is
//! planned. Only confident signals reject a token; anything ambiguous is
//! reported as valid so a flaky check never blocks rotation.
//!
//! Layers, first decisive one wins:
//! 1. Secret unreadable or empty → valid (the swap itself will fail clearly)
//! 2. JSON credential with `expires_at` (unix seconds) → expiry check
//! 3. Three-segment signed token with an `exp` claim → expiry check
//! 4. Probe the API with a deliberately invalid request → only 401 rejects

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::{ANTHROPIC_VERSION, VALIDATION_ENDPOINT, VALIDATION_TIMEOUT_SECS};
use crate::error::ValidationError;
use crate::profile::Profile;
use crate::store::SecretStore;

/// Why a token was considered usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Secret could not be read; deferred to the swap
    Unreadable,
    /// Locally encoded expiry is in the future
    Unexpired,
    /// The API's auth layer accepted the token
    Accepted,
    /// Probe failed or timed out; presumed valid
    Indeterminate,
}

impl Validity {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Validity::Unreadable => "unreadable",
            Validity::Unexpired => "unexpired",
            Validity::Accepted => "accepted",
            Validity::Indeterminate => "indeterminate",
        }
    }
}

/// JSON credential shape: only the expiry matters here.
#[derive(Deserialize)]
struct StoredCredential {
    #[serde(default)]
    expires_at: i64,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: i64,
}

/// Read-only validator for keychain tokens.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl TokenValidator {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: VALIDATION_ENDPOINT.to_string(),
            timeout: Duration::from_secs(VALIDATION_TIMEOUT_SECS),
        }
    }

    /// Probe a different endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the token stored for `profile`.
    pub async fn validate<S: SecretStore>(
        &self,
        store: &S,
        profile: &Profile,
    ) -> Result<Validity, ValidationError> {
        let token = match store.read(profile.service_address()) {
            Ok(token) => token,
            Err(e) => {
                debug!(
                    address = profile.service_address(),
                    error = %e,
                    "token unreadable, deferring to swap"
                );
                return Ok(record(Validity::Unreadable));
            }
        };

        let result = self.validate_token(token.expose()).await;
        if let Err(e) = &result {
            warn!(address = profile.service_address(), error = %e, "token invalid");
        }
        result
    }

    /// Validate a raw token value (layers 2-4).
    pub async fn validate_token(&self, raw: &str) -> Result<Validity, ValidationError> {
        if raw.is_empty() {
            return Ok(record(Validity::Unreadable));
        }

        if let Some(expires_at) = encoded_expiry(raw) {
            return check_expiry(expires_at, Utc::now().timestamp()).map(record);
        }

        self.probe(raw).await
    }

    /// Send an empty message request. The auth layer runs before body
    /// validation, so 401 means a bad token and anything else means the
    /// token got through.
    async fn probe(&self, token: &str) -> Result<Validity, ValidationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .body("{}")
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                metrics::counter!("token_validations_total", "verdict" => "rejected").increment(1);
                Err(ValidationError::Rejected("API returned 401 Unauthorized".into()))
            }
            Ok(response) => {
                debug!(status = %response.status(), "validation probe passed auth");
                Ok(record(Validity::Accepted))
            }
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "validation probe failed, presuming token valid"
                );
                Ok(record(Validity::Indeterminate))
            }
        }
    }
}

fn record(validity: Validity) -> Validity {
    metrics::counter!("token_validations_total", "verdict" => validity.label()).increment(1);
    validity
}

/// Expiry encoded in the token itself, as a JSON credential or signed-token claim.
fn encoded_expiry(raw: &str) -> Option<i64> {
    match serde_json::from_str::<StoredCredential>(raw) {
        Ok(credential) if credential.expires_at > 0 => return Some(credential.expires_at),
        _ => {}
    }

    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != 3 {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(segments[1]).ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;
    (claims.exp > 0).then_some(claims.exp)
}

fn check_expiry(expires_at: i64, now: i64) -> Result<Validity, ValidationError> {
    if now >= expires_at {
        metrics::counter!("token_validations_total", "verdict" => "expired").increment(1);
        let when = DateTime::<Utc>::from_timestamp(expires_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| expires_at.to_string());
        return Err(ValidationError::Expired(when));
    }
    Ok(Validity::Unexpired)
}
