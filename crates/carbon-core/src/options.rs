//! Dispatcher configuration
//!
//! [`DispatcherOptions`] can be built in code or read from TOML:
//!
//! ```toml
//! default_timeout_ms = 500
//! conversion_fallback = true
//! suggest_similar = true
//! max_suggestion_distance = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{
    DEFAULT_CONVERSION_FALLBACK, DEFAULT_MAX_SUGGESTION_DISTANCE, DEFAULT_SUGGEST_SIMILAR,
    DEFAULT_TIMEOUT_MS, MAX_SUGGESTION_DISTANCE_LIMIT,
};

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the options file
    #[error("Failed to read options: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize options
    #[error("Failed to serialize options: {0}")]
    Serialize(String),

    /// A value is out of range
    #[error("Invalid options: {0}")]
    Invalid(String),
}

/// Tunables for a `CommandDispatcher`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherOptions {
    /// Budget applied to commands without an explicit timeout; `None` is unlimited
    pub default_timeout_ms: Option<u64>,
    /// Try registered conversions when no overload matches exactly
    pub conversion_fallback: bool,
    /// Attach a "did you mean" suggestion to unknown-command errors
    pub suggest_similar: bool,
    /// Largest edit distance considered for suggestions
    pub max_suggestion_distance: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            conversion_fallback: DEFAULT_CONVERSION_FALLBACK,
            suggest_similar: DEFAULT_SUGGEST_SIMILAR,
            max_suggestion_distance: DEFAULT_MAX_SUGGESTION_DISTANCE,
        }
    }
}

impl DispatcherOptions {
    /// Parse options from a TOML string; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let options: DispatcherOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_suggestion_distance > MAX_SUGGESTION_DISTANCE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_suggestion_distance must be at most {}",
                MAX_SUGGESTION_DISTANCE_LIMIT
            )));
        }
        Ok(())
    }

    /// Default timeout as a `Duration`
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = DispatcherOptions::default();
        assert_eq!(opts.default_timeout(), None);
        assert!(opts.conversion_fallback);
        assert!(opts.suggest_similar);
        assert_eq!(opts.max_suggestion_distance, 2);
    }

    #[test]
    fn test_partial_toml() {
        let opts = DispatcherOptions::from_toml_str("default_timeout_ms = 250\n").unwrap();
        assert_eq!(opts.default_timeout(), Some(Duration::from_millis(250)));
        assert!(opts.conversion_fallback);
    }

    #[test]
    fn test_full_toml() {
        let opts = DispatcherOptions::from_toml_str(
            r#"
conversion_fallback = false
suggest_similar = false
max_suggestion_distance = 4
"#,
        )
        .unwrap();
        assert!(!opts.conversion_fallback);
        assert!(!opts.suggest_similar);
        assert_eq!(opts.max_suggestion_distance, 4);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            DispatcherOptions::from_toml_str("default_timeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DispatcherOptions::from_toml_str("max_suggestion_distance = 100"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DispatcherOptions::from_toml_str("suggest_similar = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let opts = DispatcherOptions {
            default_timeout_ms: Some(100),
            ..Default::default()
        };
        let text = opts.to_toml_string().unwrap();
        assert_eq!(DispatcherOptions::from_toml_str(&text).unwrap(), opts);
    }
}
