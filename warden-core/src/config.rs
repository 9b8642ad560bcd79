//! Configuration for the policy engine, model routing and integrity store.
//!
//! Every section and field has a default, so an empty JSON object is a valid
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::FailureDefault;
use crate::provider::RetryConfig;
use crate::routing::ModelChainConfig;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub policy: PolicyConfig,
    pub routing: RoutingConfig,
    pub integrity: IntegrityConfig,
}

impl WardenConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.max_concurrent_tools == 0 {
            return Err(ConfigError::Invalid(
                "policy.max_concurrent_tools must be at least 1".to_string(),
            ));
        }
        if self.routing.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "routing.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.routing.chain.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "routing.chain.models must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Model used for policy generation and enforcement
    pub model: String,
    /// Decision when the policy model is unavailable
    pub default_on_failure: FailureDefault,
    /// Ask the user instead of blocking on `deny` verdicts
    pub deny_override: bool,
    /// "Proceed always" covers only the approved argument set, not the whole tool
    pub remember_exact_args: bool,
    pub max_concurrent_tools: usize,
    /// Unanswered tool confirmations resolve as Cancel after this long
    pub confirmation_timeout_secs: Option<u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            default_on_failure: FailureDefault::default(),
            deny_override: false,
            remember_exact_args: false,
            max_concurrent_tools: 8,
            confirmation_timeout_secs: None,
        }
    }
}

impl PolicyConfig {
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub chain: ModelChainConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Hash store file; `~/.warden/policy_integrity.json` when unset
    pub store_path: Option<PathBuf>,
}

impl IntegrityConfig {
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join(".warden")
                .join("policy_integrity.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = WardenConfig::from_json_str("{}").unwrap();
        assert_eq!(config, WardenConfig::default());
        assert_eq!(config.policy.default_on_failure, FailureDefault::Allow);
        assert_eq!(config.policy.max_concurrent_tools, 8);
        assert_eq!(config.routing.retry.max_attempts, 3);
        assert!(config.policy.confirmation_timeout().is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = WardenConfig::from_json_str(
            r#"{
                "policy": {"default_on_failure": "deny", "confirmation_timeout_secs": 30},
                "routing": {"chain": {"models": ["pro", "flash"], "silent_fallback": true}},
                "integrity": {"store_path": "/tmp/hashes.json"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.policy.default_on_failure, FailureDefault::Deny);
        assert_eq!(
            config.policy.confirmation_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.routing.chain.models, vec!["pro", "flash"]);
        assert!(config.routing.chain.silent_fallback);
        assert_eq!(config.routing.retry, RetryConfig::default());
        assert_eq!(
            config.integrity.resolved_store_path(),
            PathBuf::from("/tmp/hashes.json")
        );
    }

    #[test]
    fn test_default_store_path() {
        let path = IntegrityConfig::default().resolved_store_path();
        assert!(path.ends_with(".warden/policy_integrity.json"));
    }

    #[test]
    fn test_validation() {
        let err = WardenConfig::from_json_str(r#"{"policy": {"max_concurrent_tools": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WardenConfig::from_json_str(r#"{"routing": {"chain": {"models": ["a", " "]}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("empty names"));

        assert!(matches!(
            WardenConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"policy": {{"deny_override": true}}}}"#).unwrap();

        let config = WardenConfig::load(file.path()).unwrap();
        assert!(config.policy.deny_override);

        let missing = WardenConfig::load("/nonexistent/warden.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
