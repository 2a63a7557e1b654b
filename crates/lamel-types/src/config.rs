//! Global configuration for lamel.
//!
//! Deserialized from `config.toml` in the data directory. Every field has a
//! default so a missing or partial file still yields a usable config.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Active workspace (e.g. "lamel-mo/default"). Scopes credential lookup.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Data feed settings.
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Object store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Loader function settings.
    #[serde(default)]
    pub invoke: InvokeConfig,
}

/// Data feed (extract) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Base URL of the feed API; the step's `source` is appended as a path
    /// segment.
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,
    /// Row count used when a flow does not specify one.
    #[serde(default = "default_row_count")]
    pub default_count: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            default_count: default_row_count(),
        }
    }
}

fn default_feed_base_url() -> String {
    "https://api.mockaroo.com/api".to_string()
}

fn default_row_count() -> u32 {
    500
}

/// Object store settings. The bucket name comes from the credential block,
/// not from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Endpoint of the S3-compatible object store gateway.
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
        }
    }
}

fn default_store_endpoint() -> String {
    "http://127.0.0.1:9000".to_string()
}

/// Loader function settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Endpoint of the function gateway.
    #[serde(default = "default_invoke_endpoint")]
    pub endpoint: String,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_invoke_endpoint(),
        }
    }
}

fn default_invoke_endpoint() -> String {
    "http://127.0.0.1:9100".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert!(config.workspace.is_none());
        assert_eq!(config.extract.default_count, 500);
        assert!(config.extract.base_url.starts_with("https://"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
workspace = "lamel-mo/default"

[store]
endpoint = "https://objects.example.com"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workspace.as_deref(), Some("lamel-mo/default"));
        assert_eq!(config.store.endpoint, "https://objects.example.com");
        // Untouched sections keep their defaults
        assert_eq!(config.extract.default_count, 500);
        assert_eq!(config.invoke.endpoint, default_invoke_endpoint());
    }

    #[test]
    fn test_empty_toml_is_valid() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.extract.base_url, default_feed_base_url());
    }
}
