//! Engine configuration.
//!
//! Loadable from YAML with `${VAR}` / `${VAR:-default}` environment
//! interpolation, or built in code and handed straight to the engine
//! builder. Every field has a default, so an empty document is a valid
//! configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use marketflow::config::{EngineConfig, load_config};
//!
//! let config = load_config(Some("marketflow.yaml"))?;
//! println!("invoke attempts: {}", config.invoke_retry.max_attempts);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::retry::RetrySettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML document.
    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// A configuration value is out of range.
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Retry budget for one call site, in config units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum calls, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

const fn default_max_attempts() -> u32 {
    4
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Default connect budget: patient, with a long cap.
    #[must_use]
    pub const fn connect() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 64_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Convert to resilience-layer settings.
    #[must_use]
    pub const fn to_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Circuit breaker configuration, in config units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Whether the breaker guards workflow calls at all.
    #[serde(default)]
    pub enabled: bool,
    /// Failure rate that opens the circuit (0.0-1.0).
    #[serde(default = "default_failure_rate")]
    pub failure_rate_threshold: f64,
    /// Number of call outcomes tracked.
    #[serde(default = "default_window_size")]
    pub sliding_window_size: u32,
    /// Minimum outcomes in the window before the rate is evaluated.
    #[serde(default = "default_minimum_calls")]
    pub minimum_calls: u32,
    /// Cool-down spent open before probing, in seconds.
    #[serde(default = "default_wait_secs")]
    pub wait_duration_secs: u64,
    /// Probe calls allowed while half-open.
    #[serde(default = "default_half_open_calls")]
    pub permitted_calls_in_half_open: u32,
}

const fn default_failure_rate() -> f64 {
    0.5
}

const fn default_window_size() -> u32 {
    20
}

const fn default_minimum_calls() -> u32 {
    5
}

const fn default_wait_secs() -> u64 {
    10
}

const fn default_half_open_calls() -> u32 {
    3
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_rate_threshold: default_failure_rate(),
            sliding_window_size: default_window_size(),
            minimum_calls: default_minimum_calls(),
            wait_duration_secs: default_wait_secs(),
            permitted_calls_in_half_open: default_half_open_calls(),
        }
    }
}

impl BreakerConfig {
    /// Convert to resilience-layer settings.
    #[must_use]
    pub const fn to_settings(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            sliding_window_size: self.sliding_window_size,
            minimum_calls: self.minimum_calls,
            wait_duration_in_open: Duration::from_secs(self.wait_duration_secs),
            permitted_calls_in_half_open: self.permitted_calls_in_half_open,
        }
    }
}

/// Batch write policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Stop at the first failed item instead of processing the rest.
    #[serde(default)]
    pub fail_fast: bool,
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry budget for connection establishment.
    #[serde(default = "RetryConfig::connect")]
    pub connect_retry: RetryConfig,
    /// Retry budget for per-operation handler calls.
    #[serde(default)]
    pub invoke_retry: RetryConfig,
    /// Circuit breaker guarding workflow calls.
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    /// Batch write policy.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_retry: RetryConfig::connect(),
            invoke_retry: RetryConfig::default(),
            circuit_breaker: BreakerConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, retry) in [
            ("connect_retry", &self.connect_retry),
            ("invoke_retry", &self.invoke_retry),
        ] {
            if retry.max_attempts == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name}.max_attempts must be at least 1"
                )));
            }
            if retry.initial_backoff_ms > retry.max_backoff_ms {
                return Err(ConfigError::Validation(format!(
                    "{name}.initial_backoff_ms must not exceed max_backoff_ms"
                )));
            }
            if retry.multiplier < 1.0 {
                return Err(ConfigError::Validation(format!(
                    "{name}.multiplier must be at least 1.0"
                )));
            }
            if !(0.0..=1.0).contains(&retry.jitter_factor) {
                return Err(ConfigError::Validation(format!(
                    "{name}.jitter_factor must be between 0.0 and 1.0"
                )));
            }
        }

        let breaker = &self.circuit_breaker;
        if !(0.0..=1.0).contains(&breaker.failure_rate_threshold) {
            return Err(ConfigError::Validation(
                "circuit_breaker.failure_rate_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if breaker.enabled && breaker.sliding_window_size == 0 {
            return Err(ConfigError::Validation(
                "circuit_breaker.sliding_window_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from a YAML file with environment interpolation.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let path = path.unwrap_or("marketflow.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: EngineConfig = serde_yaml_bw::from_str(&interpolated)?;
    config.validate()?;
    Ok(config)
}

/// Interpolate `${VAR}` and `${VAR:-default}` patterns from the process
/// environment.
fn interpolate_env_vars(input: &str) -> String {
    interpolate_vars(input, |name| std::env::var(name).ok())
}

/// Interpolation against an injectable variable lookup.
#[allow(clippy::expect_used)] // the pattern is a compile-time constant
fn interpolate_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    let mut result = input.to_string();
    for cap in re.captures_iter(input) {
        let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match lookup(var_match.as_str()) {
            Some(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match.as_str(), &value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_a_valid_config() {
        let config = load_config_from_string("{}").unwrap();
        assert_eq!(config.invoke_retry.max_attempts, 4);
        assert_eq!(config.connect_retry.max_attempts, 8);
        assert!(!config.circuit_breaker.enabled);
        assert!(!config.batch.fail_fast);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r"
invoke_retry:
  max_attempts: 2
  initial_backoff_ms: 50
circuit_breaker:
  enabled: true
  failure_rate_threshold: 0.25
batch:
  fail_fast: true
";
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.invoke_retry.max_attempts, 2);
        assert_eq!(config.invoke_retry.initial_backoff_ms, 50);
        // Untouched fields keep their defaults
        assert_eq!(config.invoke_retry.max_backoff_ms, 30_000);
        assert!(config.circuit_breaker.enabled);
        assert!((config.circuit_breaker.failure_rate_threshold - 0.25).abs() < f64::EPSILON);
        assert!(config.batch.fail_fast);
    }

    #[test]
    fn variables_are_interpolated_from_the_lookup() {
        let yaml = "invoke_retry:\n  max_attempts: ${MARKETFLOW_ATTEMPTS}\n";
        let interpolated = interpolate_vars(yaml, |name| {
            (name == "MARKETFLOW_ATTEMPTS").then(|| "6".to_string())
        });

        let config = load_config_from_string(&interpolated).unwrap();
        assert_eq!(config.invoke_retry.max_attempts, 6);
    }

    #[test]
    fn empty_lookup_values_fall_back_to_the_default() {
        let yaml = "max: ${MARKETFLOW_EMPTY:-9}";
        let interpolated = interpolate_vars(yaml, |_| Some(String::new()));
        assert_eq!(interpolated, "max: 9");
    }

    #[test]
    fn env_var_defaults_apply_when_unset() {
        let yaml = "invoke_retry:\n  max_attempts: ${MARKETFLOW_UNSET_VAR:-3}\n";
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.invoke_retry.max_attempts, 3);
    }

    #[test]
    fn zero_attempts_fail_validation() {
        let yaml = "invoke_retry:\n  max_attempts: 0\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(format!("{err}").contains("max_attempts"));
    }

    #[test]
    fn inverted_backoff_bounds_fail_validation() {
        let yaml = "connect_retry:\n  initial_backoff_ms: 5000\n  max_backoff_ms: 100\n";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn out_of_range_failure_rate_fails_validation() {
        let yaml = "circuit_breaker:\n  failure_rate_threshold: 1.5\n";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Some("/nonexistent/marketflow.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn retry_config_converts_to_settings() {
        let settings = RetryConfig::default().to_settings();
        assert_eq!(settings.max_attempts, 4);
        assert_eq!(settings.initial_backoff, Duration::from_millis(100));
        assert_eq!(settings.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn breaker_config_converts_to_settings() {
        let settings = BreakerConfig::default().to_settings();
        assert_eq!(settings.sliding_window_size, 20);
        assert_eq!(settings.wait_duration_in_open, Duration::from_secs(10));
    }
}
