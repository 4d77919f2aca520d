// Configuration module for the ACL node
//
// Loads and saves the node configuration as TOML. Every field has a default,
// so a file only needs to name what it changes.

use crate::error::{NodeError, Result};
use acl::AclConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// ACL configuration
    #[serde(default)]
    pub acl: AclSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// ACL configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclSection {
    /// Enable the ACL subsystem
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Policy cache lifetime in seconds. Zero turns off bootstrap on startup.
    #[serde(default = "default_policy_ttl")]
    pub policy_ttl_secs: u64,
    /// Lifetime of an issued one-time token in seconds
    #[serde(default = "default_one_time_token_ttl")]
    pub one_time_token_ttl_secs: u64,
    /// How often expired one-time tokens are reaped, in seconds
    #[serde(default = "default_one_time_token_gc_interval")]
    pub one_time_token_gc_interval_secs: u64,
    /// Reads are flagged stale past this much time since leader contact
    #[serde(default = "default_max_stale")]
    pub max_stale_secs: u64,
    /// Upper bound on how long a blocking query waits
    #[serde(default = "default_max_query_wait")]
    pub max_query_wait_secs: u64,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, text)
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

// Default values
fn default_true() -> bool {
    true
}

fn default_policy_ttl() -> u64 {
    30
}

fn default_one_time_token_ttl() -> u64 {
    acl::config::DEFAULT_ONE_TIME_TOKEN_TTL.as_secs()
}

fn default_one_time_token_gc_interval() -> u64 {
    600
}

fn default_max_stale() -> u64 {
    5
}

fn default_max_query_wait() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|e| {
            NodeError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.acl.one_time_token_gc_interval_secs == 0 {
            return Err(NodeError::Config(
                "one_time_token_gc_interval_secs must be greater than zero".to_string(),
            ));
        }
        let max_ttl = acl::config::MAX_ONE_TIME_TOKEN_TTL.as_secs();
        if self.acl.one_time_token_ttl_secs > max_ttl {
            return Err(NodeError::Config(format!(
                "one_time_token_ttl_secs must be at most {}",
                max_ttl
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(NodeError::Config("logging level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether the node creates the initial management token on startup
    pub fn auto_bootstrap(&self) -> bool {
        self.acl.enabled && self.acl.policy_ttl_secs != 0
    }

    pub fn to_acl_config(&self) -> AclConfig {
        AclConfig {
            enabled: self.acl.enabled,
            one_time_token_ttl: Duration::from_secs(self.acl.one_time_token_ttl_secs),
            max_stale: Duration::from_secs(self.acl.max_stale_secs),
            max_query_wait: Duration::from_secs(self.acl.max_query_wait_secs),
            ..AclConfig::default()
        }
    }

    pub fn one_time_token_gc_interval(&self) -> Duration {
        Duration::from_secs(self.acl.one_time_token_gc_interval_secs)
    }
}

impl Default for AclSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            policy_ttl_secs: default_policy_ttl(),
            one_time_token_ttl_secs: default_one_time_token_ttl(),
            one_time_token_gc_interval_secs: default_one_time_token_gc_interval(),
            max_stale_secs: default_max_stale(),
            max_query_wait_secs: default_max_query_wait(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [acl]
            policy_ttl_secs = 0

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert!(config.acl.enabled);
        assert_eq!(config.acl.policy_ttl_secs, 0);
        assert_eq!(config.acl.one_time_token_ttl_secs, 600);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.auto_bootstrap());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.auto_bootstrap());
    }

    #[test]
    fn test_disabled_acl_never_bootstraps() {
        let mut config = Config::default();
        config.acl.enabled = false;
        assert!(!config.auto_bootstrap());
        assert!(!config.to_acl_config().enabled);
    }

    #[test]
    fn test_acl_config_conversion() {
        let mut config = Config::default();
        config.acl.one_time_token_ttl_secs = 30;
        config.acl.max_stale_secs = 2;

        let acl = config.to_acl_config();
        assert_eq!(acl.one_time_token_ttl, Duration::from_secs(30));
        assert_eq!(acl.max_stale, Duration::from_secs(2));
        assert_eq!(acl.max_query_wait, Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [logging]
            format = "xml"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_one_time_token_ttl_is_bounded() {
        let mut config = Config::default();
        config.acl.one_time_token_ttl_secs = acl::config::MAX_ONE_TIME_TOKEN_TTL.as_secs();
        assert!(config.validate().is_ok());

        config.acl.one_time_token_ttl_secs = 10_000_000_000_000;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_zero_gc_interval_is_invalid() {
        let mut config = Config::default();
        config.acl.one_time_token_gc_interval_secs = 0;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }
}
