//! CLI configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `CUBEFLAGS_*` environment variables, then command-line flags. The YAML file
//! supports `${VAR}` and `${VAR:-default}` substitution.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_REGISTRY: &str = "CUBEFLAGS_REGISTRY";
pub const ENV_LOG_LEVEL: &str = "CUBEFLAGS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CUBEFLAGS_LOG_FORMAT";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Extra flag-coding registry merged over the built-in one
    pub registry_path: Option<PathBuf>,

    pub logging: LoggingConfig,

    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl CliConfig {
    /// Load configuration from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML config file after environment substitution.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Parse YAML config content after environment substitution.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = shellexpand::env(content)
            .map_err(|e| anyhow::anyhow!("Environment variable {} not set", e.var_name))?;
        let config: CliConfig =
            serde_yaml::from_str(&expanded).context("Failed to parse config YAML")?;
        Ok(config)
    }

    /// Apply `CUBEFLAGS_*` overrides looked up through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = lookup(ENV_REGISTRY) {
            self.registry_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = LogFormat::from_str(&format, true)
                .map_err(|_| anyhow::anyhow!("{ENV_LOG_FORMAT} must be 'json' or 'pretty', got '{format}'"))?;
        }
        Ok(())
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_lowercase();
        anyhow::ensure!(
            LOG_LEVELS.contains(&level.as_str()),
            "Log level must be one of {:?}, got '{}'",
            LOG_LEVELS,
            self.logging.level
        );
        if let Some(path) = &self.registry_path {
            anyhow::ensure!(path.is_file(), "Registry file {:?} does not exist", path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
registry_path: /tmp/codings.yaml
logging:
  level: debug
  format: json
output:
  format: json
"#;
        let config = CliConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.registry_path, Some(PathBuf::from("/tmp/codings.yaml")));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_env_substitution_default() {
        let yaml = "logging:\n  level: ${CUBEFLAGS_TEST_UNSET_LEVEL:-error}\n";
        let config = CliConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.logging.level, "error");
    }

    #[test]
    fn test_env_substitution_missing_variable() {
        let yaml = "registry_path: ${CUBEFLAGS_TEST_UNSET_REGISTRY}\n";
        let err = CliConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("CUBEFLAGS_TEST_UNSET_REGISTRY"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CliConfig::default();
        config
            .apply_env_overrides(env(&[
                (ENV_REGISTRY, "/etc/cubeflags/codings.yaml"),
                (ENV_LOG_LEVEL, "info"),
                (ENV_LOG_FORMAT, "JSON"),
            ]))
            .unwrap();
        assert_eq!(
            config.registry_path,
            Some(PathBuf::from("/etc/cubeflags/codings.yaml"))
        );
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = CliConfig::default();
        config
            .apply_env_overrides(env(&[(ENV_LOG_LEVEL, "")]))
            .unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_invalid_log_format_env() {
        let mut config = CliConfig::default();
        assert!(config
            .apply_env_overrides(env(&[(ENV_LOG_FORMAT, "xml")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let mut config = CliConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_registry() {
        let config = CliConfig {
            registry_path: Some(PathBuf::from("/nonexistent/codings.yaml")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
