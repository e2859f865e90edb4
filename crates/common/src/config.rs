use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{PremiumError, Result};
use crate::types::TargetDeltas;

/// Environment variable holding the data provider credential.
pub const API_KEY_ENV: &str = "POLYGON_API_KEY";

/// Values that mean "the key was never filled in".
const PLACEHOLDER_KEYS: [&str; 2] = ["REPLACE_WITH_YOUR_KEY", "YOUR_KEY"];

/// Data provider access credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validate a raw credential; empty and placeholder values are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into().trim().to_string();
        if raw.is_empty() || PLACEHOLDER_KEYS.contains(&raw.as_str()) {
            return Err(PremiumError::Configuration(format!(
                "please set {API_KEY_ENV} to a real provider key"
            )));
        }
        Ok(Self(raw))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(std::env::var(API_KEY_ENV).unwrap_or_default())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Longest single wait, configured or server-hinted, in seconds.
pub const MAX_WAIT_SECS: f64 = 3600.0;

/// Retry budget for rate-limited calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_secs: f64,
    pub max_backoff_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_secs: 1.0,
            max_backoff_secs: 8.0,
        }
    }
}

impl RetryPolicy {
    pub fn initial_backoff(&self) -> Duration {
        wait_duration(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        wait_duration(self.max_backoff_secs)
    }
}

/// Seconds clamped into `[0, MAX_WAIT_SECS]`; NaN counts as zero.
fn wait_duration(secs: f64) -> Duration {
    let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, MAX_WAIT_SECS) };
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

/// Run-scoped settings. Every field has a default, so an empty TOML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub base_url: String,
    pub bulk_timeout_secs: u64,
    pub symbol_timeout_secs: u64,
    pub chain_timeout_secs: u64,
    pub lookback_days: u32,
    pub page_limit: u32,
    pub retry: RetryPolicy,
    pub target_deltas: TargetDeltas,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.polygon.io".to_string(),
            bulk_timeout_secs: 120,
            symbol_timeout_secs: 30,
            chain_timeout_secs: 60,
            lookback_days: 7,
            page_limit: 250,
            retry: RetryPolicy::default(),
            target_deltas: TargetDeltas::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text)
            .map_err(|e| PremiumError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PremiumError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(PremiumError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let backoffs = [self.retry.initial_backoff_secs, self.retry.max_backoff_secs];
        if backoffs
            .iter()
            .any(|b| !b.is_finite() || *b < 0.0 || *b > MAX_WAIT_SECS)
        {
            return Err(PremiumError::Configuration(format!(
                "retry backoff must be between 0 and {MAX_WAIT_SECS} seconds"
            )));
        }
        if self.page_limit == 0 {
            return Err(PremiumError::Configuration(
                "page_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }

    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_secs(self.symbol_timeout_secs)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_keys_are_rejected() {
        for raw in ["", "   ", "REPLACE_WITH_YOUR_KEY", "YOUR_KEY"] {
            let err = ApiKey::new(raw).unwrap_err();
            assert!(err.is_fatal());
        }
        assert_eq!(ApiKey::new(" abc123 ").unwrap().expose(), "abc123");
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("secret-value").unwrap();
        assert!(!format!("{key:?}").contains("secret"));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.bulk_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_toml_overrides() {
        let text = r#"
            base_url = "http://localhost:8080"
            lookback_days = 3
            target_deltas = [0.30, 0.10]

            [retry]
            max_attempts = 2
        "#;

        let config = RunConfig::from_toml_str(text).unwrap();

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.lookback_days, 3);
        assert_eq!(config.target_deltas.values(), &[0.10, 0.30]);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_backoff_secs, 8.0);
    }

    #[test]
    fn test_invalid_deltas_in_toml_are_configuration_errors() {
        let err = RunConfig::from_toml_str("target_deltas = [1.5]").unwrap_err();
        assert!(matches!(err, PremiumError::Configuration(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = RunConfig::from_toml_str("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_oversized_backoff_rejected() {
        let err = RunConfig::from_toml_str("[retry]\nmax_backoff_secs = 1e20").unwrap_err();
        assert!(matches!(err, PremiumError::Configuration(_)));
    }

    #[test]
    fn test_unvalidated_backoff_is_clamped() {
        let policy = RetryPolicy {
            initial_backoff_secs: f64::NAN,
            max_backoff_secs: 1e20,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.initial_backoff(), Duration::ZERO);
        assert_eq!(policy.max_backoff(), Duration::from_secs(3600));
    }
}
