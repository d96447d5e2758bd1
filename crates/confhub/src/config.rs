//! Hub Configuration
//!
//! Settings that shape how a hub logs and cleans up after itself. They can be
//! built in code or loaded from RON text.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a [`Hub`](crate::Hub)
///
/// # Example
///
/// ```
/// use confhub::HubConfig;
///
/// let config = HubConfig::from_ron(r#"(name: "edge", trace_changes: true)"#).unwrap();
/// assert_eq!(config.name, "edge");
/// assert!(config.trace_changes);
/// // Unspecified fields keep their defaults
/// assert!(config.dispose_removed_helpers);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Label attached to every log line emitted by the hub
    pub name: String,

    /// Emit one trace event per change record when a snapshot is published
    pub trace_changes: bool,

    /// Dispose the reflection helpers of removed types once a transaction
    /// is final
    pub dispose_removed_helpers: bool,
}

impl HubConfig {
    /// Default configuration with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| Error::invalid_argument(format!("hub config: {}", e)))
    }

    /// Render this configuration as RON text
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::invalid_argument(format!("hub config: {}", e)))
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "hub".to_string(),
            trace_changes: false,
            dispose_removed_helpers: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.name, "hub");
        assert!(!config.trace_changes);
        assert!(config.dispose_removed_helpers);
    }

    #[test]
    fn test_named() {
        let config = HubConfig::named("primary");
        assert_eq!(config.name, "primary");
        assert!(config.dispose_removed_helpers);
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = HubConfig {
            name: "edge".to_string(),
            trace_changes: true,
            dispose_removed_helpers: false,
        };
        let text = config.to_ron().unwrap();
        assert_eq!(HubConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        assert_eq!(
            HubConfig::from_ron("(trace_changes: false)").unwrap(),
            HubConfig::default()
        );
    }

    #[test]
    fn test_invalid_ron() {
        let err = HubConfig::from_ron("(name: 42)").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
