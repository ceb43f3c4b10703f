//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles config directory discovery,
//! environment detection, and layering of YAML files and environment variables
//! through the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::PipelineConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Base name of the configuration files inside the config directory
const CONFIG_FILE_STEM: &str = "observability";

/// Prefix for environment variable overrides
const ENV_PREFIX: &str = "OBSERVABILITY";

/// Loaded, validated configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_layered(&config_directory, environment)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (embedding, tests)
    pub fn from_config(config: PipelineConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn load_layered(config_directory: &Path, environment: &str) -> ConfigResult<PipelineConfig> {
        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.yaml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml"));

        let built = Config::builder()
            .add_source(File::from(base).format(FileFormat::Yaml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory, e))?;

        built
            .try_deserialize::<PipelineConfig>()
            .map_err(|e| ConfigurationError::load_error(config_directory, e))
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        env::var("OBSERVABILITY_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("OBSERVABILITY_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            let candidate = PathBuf::from(manifest_dir).join("config");
            if candidate.exists() {
                return candidate;
            }
        }
        PathBuf::from("config")
    }

    /// Sanitize configuration for safe logging by masking credential fields
    fn sanitize_config_for_logging(config: &PipelineConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        if !val.is_null() {
                            *val = serde_json::Value::String("[MASKED]".to_string());
                        }
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config(), &PipelineConfig::default());
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config_directory(), dir.path());
    }

    #[test]
    fn environment_overlay_overrides_base() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("observability.yaml"),
            "loading:\n  chunk_size: 250\nquality:\n  freshness_max_age_hours: 30\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("observability.production.yaml"),
            "loading:\n  chunk_size: 5000\n",
        )
        .unwrap();

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();
        assert_eq!(manager.config().loading.chunk_size, 5000);
        assert_eq!(manager.config().quality.freshness_max_age_hours, 30.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("observability.yaml"),
            "loading:\n  chunk_size: 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn debug_config_masks_credentials() {
        let manager = ConfigManager::from_config(PipelineConfig::default(), "test").unwrap();
        let json = manager.debug_config();
        assert_eq!(json["connections"]["source"]["password"], "[MASKED]");
        assert_eq!(json["connections"]["source"]["url"], serde_json::Value::Null);
        assert_eq!(json["connections"]["source"]["database"], "airflow");
    }
}
