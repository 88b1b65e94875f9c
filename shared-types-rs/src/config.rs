// shared-types-rs/src/config.rs
// Centralized configuration loader for the input-security pipeline

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static PIPELINE_CONFIG: OnceCell<Arc<PipelineConfig>> = OnceCell::new();

pub const CONFIG_PATH_ENV: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "./config/pipeline.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration not initialized")]
    NotInitialized,

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Main configuration structure. Every section falls back to its defaults
/// when absent from the file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deployment environment. Only `development` exposes failure internals.
    pub environment: String,
    pub logging: LoggingSettings,
    pub rate_limits: RateLimitSettings,
    pub scan: ScanSettings,
    pub normalization: NormalizationSettings,
    pub html: HtmlSettings,
    pub schemas: SchemaSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json_format: bool,
    pub log_to_file: bool,
    pub log_directory: String,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            log_to_file: false,
            log_directory: "logs".to_string(),
            file_prefix: "pipeline".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// `open` or `closed`.
    pub failure_mode: String,
    pub store_timeout_ms: u64,
    pub default_policy: PolicySettings,
    pub policies: Vec<PolicySettings>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            failure_mode: "open".to_string(),
            store_timeout_ms: 50,
            default_policy: PolicySettings::default(),
            policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicySettings {
    pub operation: String,
    pub requests_per_window: u32,
    pub window_secs: u64,
    /// `fixed_window`, `sliding_window`, `token_bucket` or `leaky_bucket`.
    pub algorithm: String,
    pub exceptions: Vec<PolicyExceptionSettings>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            operation: "*".to_string(),
            requests_per_window: 100,
            window_secs: 60,
            algorithm: "sliding_window".to_string(),
            exceptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyExceptionSettings {
    pub role: Option<String>,
    pub license_tier: Option<String>,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    pub report_threshold: String,
    pub timeout_ms: u64,
    pub max_content_size: usize,
    /// Empty means every engine.
    pub enabled_engines: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            report_threshold: "low".to_string(),
            timeout_ms: 100,
            max_content_size: 1024 * 1024,
            enabled_engines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub strip_html: bool,
    pub unicode_normalize: bool,
    pub strip_control_chars: bool,
    pub collapse_whitespace: bool,
    pub trim: bool,
    pub case_fold: bool,
    pub max_length: Option<usize>,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self {
            strip_html: false,
            unicode_normalize: true,
            strip_control_chars: true,
            collapse_whitespace: false,
            trim: true,
            case_fold: false,
            max_length: Some(10_000),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HtmlSettings {
    /// Empty keeps the built-in allow-list.
    pub allowed_tags: Vec<String>,
    /// Empty keeps the built-in allow-list.
    pub allowed_attributes: Vec<String>,
    pub allow_data_attributes: bool,
    /// `strip_all` (default) or `return_original`.
    pub on_parse_failure: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaSettings {
    pub cache_ttl_secs: u64,
    pub store_timeout_ms: u64,
    pub max_depth: usize,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            store_timeout_ms: 50,
            max_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    pub max_nesting_depth: usize,
    pub max_joins: usize,
    pub max_cost: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_nesting_depth: 5,
            max_joins: 5,
            max_cost: 100,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the file named by `PIPELINE_CONFIG_PATH`
    /// (or the default path) and install it as the global instance.
    pub fn load() -> Result<Arc<PipelineConfig>, ConfigError> {
        if let Some(config) = PIPELINE_CONFIG.get() {
            return Ok(Arc::clone(config));
        }

        let config_path =
            env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config = Self::from_file(&config_path)?;

        let config_arc = Arc::new(config);
        PIPELINE_CONFIG
            .set(Arc::clone(&config_arc))
            .map_err(|_| ConfigError::InvalidValue("Config already initialized".to_string()))?;

        Ok(config_arc)
    }

    /// Parse a config file without touching the global instance.
    pub fn from_file(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
        let path = PathBuf::from(path.as_ref());
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<PipelineConfig, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the global configuration instance
    pub fn get() -> Result<Arc<PipelineConfig>, ConfigError> {
        PIPELINE_CONFIG
            .get()
            .map(Arc::clone)
            .ok_or(ConfigError::NotInitialized)
    }

    pub fn is_development(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("development")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.rate_limits.failure_mode.as_str() {
            "open" | "closed" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limits.failure_mode must be 'open' or 'closed', got '{}'",
                    other
                )))
            }
        }

        let policies =
            std::iter::once(&self.rate_limits.default_policy).chain(&self.rate_limits.policies);
        for policy in policies {
            if policy.window_secs == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "policy '{}' has a zero-length window",
                    policy.operation
                )));
            }
            if policy.exceptions.iter().any(|e| e.multiplier < 0.0) {
                return Err(ConfigError::InvalidValue(format!(
                    "policy '{}' has a negative exception multiplier",
                    policy.operation
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.rate_limits.failure_mode, "open");
        assert_eq!(config.scan.timeout_ms, 100);
        assert!(!config.is_development());
    }

    #[test]
    fn test_sections_parse() {
        let toml = r#"
            environment = "Development"

            [rate_limits]
            failure_mode = "closed"

            [[rate_limits.policies]]
            operation = "search"
            requests_per_window = 30
            window_secs = 60
            algorithm = "token_bucket"
            exceptions = [{ role = "admin", multiplier = 5.0 }]

            [scan]
            report_threshold = "medium"
        "#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        assert!(config.is_development());
        assert_eq!(config.rate_limits.policies.len(), 1);
        assert_eq!(config.rate_limits.policies[0].exceptions[0].multiplier, 5.0);
        assert_eq!(config.scan.report_threshold, "medium");
        assert_eq!(config.scan.max_content_size, 1024 * 1024);
    }

    #[test]
    fn test_invalid_failure_mode_rejected() {
        let result = PipelineConfig::from_toml_str("[rate_limits]\nfailure_mode = \"maybe\"");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environment = \"production\"").unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.environment, "production");

        let missing = PipelineConfig::from_file("/nonexistent/pipeline.toml");
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
    }
}
