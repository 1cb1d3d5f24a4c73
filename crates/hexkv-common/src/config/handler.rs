//! Storage handler configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ADAPTER, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE, DEFAULT_WRITE_BUFFER_LIMIT,
};
use crate::error::{HexError, HexResult};

/// What a handle does when a row mutation arrives while a scan is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMutationPolicy {
    /// Apply the mutation. The open cursor keeps iterating the snapshot it
    /// was created with; index entries whose row has since changed are
    /// skipped.
    #[default]
    Allow,
    /// Fail the mutation with a protocol-state error.
    Reject,
}

/// Storage handler configuration.
///
/// # Example
///
/// ```rust
/// use hexkv_common::config::{HandlerConfig, ScanMutationPolicy};
///
/// let config = HandlerConfig::from_toml_str(r#"
///     default_adapter = "memory"
///     write_buffer_limit = 16
///     scan_mutation_policy = "reject"
///     flush_timeout = "2s"
///
///     [adapters.memory]
/// "#).unwrap();
///
/// assert_eq!(config.write_buffer_limit, 16);
/// assert_eq!(config.scan_mutation_policy, ScanMutationPolicy::Reject);
/// assert!(config.is_adapter_configured("memory"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Backing-store adapters by name, each with its option map.
    #[serde(default = "default_adapters")]
    pub adapters: BTreeMap<String, BTreeMap<String, String>>,

    /// Adapter used when a table does not name one.
    /// Default: "memory"
    #[serde(default = "default_adapter")]
    pub default_adapter: String,

    /// Buffered key mutations after which a handle commits its local
    /// write batch on its own.
    /// Default: 1024
    #[serde(default = "default_write_buffer_limit")]
    pub write_buffer_limit: usize,

    /// Mutation behavior while a scan is open.
    /// Default: allow
    #[serde(default)]
    pub scan_mutation_policy: ScanMutationPolicy,

    /// Largest encoded store key accepted.
    /// Default: 16 KB
    #[serde(default = "default_max_key_size")]
    pub max_key_size: usize,

    /// Largest stored value accepted.
    /// Default: 8 MB
    #[serde(default = "default_max_value_size")]
    pub max_value_size: usize,

    /// Expected upper bound for a flush, reported in flush logs.
    /// Default: 5s
    #[serde(default = "default_flush_timeout", with = "humantime_serde")]
    pub flush_timeout: Duration,
}

fn default_adapters() -> BTreeMap<String, BTreeMap<String, String>> {
    let mut adapters = BTreeMap::new();
    adapters.insert(DEFAULT_ADAPTER.to_string(), BTreeMap::new());
    adapters
}

fn default_adapter() -> String {
    DEFAULT_ADAPTER.to_string()
}

fn default_write_buffer_limit() -> usize {
    DEFAULT_WRITE_BUFFER_LIMIT
}

fn default_max_key_size() -> usize {
    DEFAULT_MAX_KEY_SIZE
}

fn default_max_value_size() -> usize {
    DEFAULT_MAX_VALUE_SIZE
}

fn default_flush_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            adapters: default_adapters(),
            default_adapter: default_adapter(),
            write_buffer_limit: default_write_buffer_limit(),
            scan_mutation_policy: ScanMutationPolicy::default(),
            max_key_size: default_max_key_size(),
            max_value_size: default_max_value_size(),
            flush_timeout: default_flush_timeout(),
        }
    }
}

impl HandlerConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &Path) -> HexResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> HexResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| HexError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> HexResult<String> {
        toml::to_string_pretty(self).map_err(|e| HexError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> HexResult<()> {
        if !self.is_adapter_configured(&self.default_adapter) {
            return Err(invalid(format!(
                "default adapter '{}' is not configured",
                self.default_adapter
            )));
        }

        if self.write_buffer_limit == 0 {
            return Err(invalid("write_buffer_limit must be at least 1"));
        }

        // A data row key is at least prefix + table id + 16-byte identity.
        if self.max_key_size < 32 {
            return Err(invalid("max_key_size must be at least 32 bytes"));
        }

        if self.max_value_size == 0 {
            return Err(invalid("max_value_size must be at least 1 byte"));
        }

        Ok(())
    }

    /// Returns true if an adapter with this name is configured.
    #[must_use]
    pub fn is_adapter_configured(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Returns the option map of a configured adapter.
    pub fn adapter_options(&self, name: &str) -> HexResult<&BTreeMap<String, String>> {
        self.adapters
            .get(name)
            .ok_or_else(|| invalid(format!("adapter '{name}' is not configured")))
    }

    /// Returns a builder for configuration.
    #[must_use]
    pub fn builder() -> HandlerConfigBuilder {
        HandlerConfigBuilder::new()
    }
}

fn invalid(message: impl Into<String>) -> HexError {
    HexError::InvalidConfig {
        message: message.into(),
    }
}

/// Builder for handler configuration.
#[derive(Debug, Default)]
pub struct HandlerConfigBuilder {
    config: HandlerConfig,
}

impl HandlerConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an adapter and its options.
    #[must_use]
    pub fn adapter(mut self, name: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        self.config.adapters.insert(name.into(), options);
        self
    }

    /// Sets the default adapter.
    #[must_use]
    pub fn default_adapter(mut self, name: impl Into<String>) -> Self {
        self.config.default_adapter = name.into();
        self
    }

    /// Sets the write buffer limit.
    #[must_use]
    pub fn write_buffer_limit(mut self, limit: usize) -> Self {
        self.config.write_buffer_limit = limit;
        self
    }

    /// Sets the scan mutation policy.
    #[must_use]
    pub fn scan_mutation_policy(mut self, policy: ScanMutationPolicy) -> Self {
        self.config.scan_mutation_policy = policy;
        self
    }

    /// Sets the maximum key size.
    #[must_use]
    pub fn max_key_size(mut self, size: usize) -> Self {
        self.config.max_key_size = size;
        self
    }

    /// Sets the maximum value size.
    #[must_use]
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> HexResult<HandlerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HandlerConfig::default();
        assert_eq!(config.default_adapter, "memory");
        assert_eq!(config.write_buffer_limit, DEFAULT_WRITE_BUFFER_LIMIT);
        assert_eq!(config.scan_mutation_policy, ScanMutationPolicy::Allow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = HandlerConfig::default();
        config.write_buffer_limit = 0;
        assert!(config.validate().is_err());

        config.write_buffer_limit = 1;
        config.default_adapter = "hbase".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, HexError::InvalidConfig { .. }));

        config.adapters.insert("hbase".to_string(), BTreeMap::new());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            default_adapter = "hbase"
            max_key_size = 4096
            flush_timeout = "250ms"

            [adapters.hbase]
            table = "sql"
            flush_interval = "5000"
        "#;

        let config = HandlerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.default_adapter, "hbase");
        assert_eq!(config.max_key_size, 4096);
        assert_eq!(config.flush_timeout, Duration::from_millis(250));
        assert_eq!(
            config.adapter_options("hbase").unwrap().get("table"),
            Some(&"sql".to_string())
        );
        // Explicit adapter table replaces the default set.
        assert!(!config.is_adapter_configured("memory"));
        assert!(config.adapter_options("memory").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_default() {
        let toml = r#"
            default_adapter = "cassandra"
        "#;
        assert!(HandlerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hexkv.toml");

        let config = HandlerConfig::builder()
            .write_buffer_limit(8)
            .scan_mutation_policy(ScanMutationPolicy::Reject)
            .build()
            .unwrap();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = HandlerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = HandlerConfig::from_file(&temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HexError::Io { .. }));
    }
}
