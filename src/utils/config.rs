use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level tag locator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Minimum number of valid ranges before a position is solved (at least 3)
    pub min_ranges: usize,
    /// Capacity of the host request queue
    pub event_queue_capacity: usize,
    /// Connection retry and timeout policy
    pub retry: RetryConfig,
    /// Position solver parameters
    pub solver: SolverConfig,
    /// Anchor directory refresh schedule
    pub refresh: RefreshConfig,
}

/// Bounded retry policy for the connection state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Consecutive link failures tolerated before the session faults
    pub max_consecutive_failures: u32,
    /// Delay before the first retry (milliseconds); doubles per failure
    pub base_backoff_ms: u64,
    /// Upper bound on the retry delay (milliseconds)
    pub max_backoff_ms: u64,
    /// Give up on a scan that finds nothing after this long (milliseconds)
    pub scan_timeout_ms: u64,
    /// Give up on a connect attempt after this long (milliseconds)
    pub connect_timeout_ms: u64,
}

/// Levenberg-Marquardt solver parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Step length below which the solve counts as converged (meters)
    pub step_tolerance_m: f64,
    pub gradient_tolerance: f64,
    pub initial_damping: f64,
}

/// Anchor directory refresh schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub enabled: bool,
    /// Delay before the first fetch (milliseconds)
    pub initial_delay_ms: u64,
    /// Pause between the end of one fetch and the start of the next (milliseconds)
    pub interval_ms: u64,
    /// Abandon a fetch after this long (milliseconds)
    pub fetch_timeout_ms: u64,
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("{message}")]
    IoError { message: String },
    #[error("{message}")]
    SerializationError { message: String },
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_ranges: 3,
            event_queue_capacity: 64,
            retry: RetryConfig::default(),
            solver: SolverConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            base_backoff_ms: 250,
            max_backoff_ms: 8_000,
            scan_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            step_tolerance_m: 1e-7,
            gradient_tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1_000,
            interval_ms: 15_000,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl LocatorConfig {
    /// Read and validate a JSON configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: LocatorConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to parse config file '{}': {}", path_str, e),
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to serialize config: {}", e),
            })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ranges < 3 {
            return Err(invalid("min_ranges", self.min_ranges, "at least 3 ranges are needed for a 3D fix"));
        }
        if self.event_queue_capacity == 0 {
            return Err(invalid("event_queue_capacity", 0, "must be positive"));
        }

        let retry = &self.retry;
        if retry.max_consecutive_failures == 0 {
            return Err(invalid("retry.max_consecutive_failures", 0, "must be positive"));
        }
        if retry.max_backoff_ms < retry.base_backoff_ms {
            return Err(invalid(
                "retry.max_backoff_ms",
                retry.max_backoff_ms,
                "must not be below retry.base_backoff_ms",
            ));
        }
        if retry.scan_timeout_ms == 0 || retry.connect_timeout_ms == 0 {
            return Err(invalid("retry timeouts", 0, "must be positive"));
        }

        let solver = &self.solver;
        if solver.max_iterations == 0 {
            return Err(invalid("solver.max_iterations", 0, "must be positive"));
        }
        for (name, value) in [
            ("solver.step_tolerance_m", solver.step_tolerance_m),
            ("solver.gradient_tolerance", solver.gradient_tolerance),
            ("solver.initial_damping", solver.initial_damping),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(name, value, "must be a positive finite number"));
            }
        }

        let refresh = &self.refresh;
        if refresh.enabled && (refresh.interval_ms == 0 || refresh.fetch_timeout_ms == 0) {
            return Err(invalid("refresh", refresh.interval_ms, "interval and fetch timeout must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LocatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh.interval_ms, 15_000);
        assert_eq!(config.min_ranges, 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LocatorConfig =
            serde_json::from_str(r#"{ "retry": { "max_consecutive_failures": 2 } }"#).unwrap();
        assert_eq!(config.retry.max_consecutive_failures, 2);
        assert_eq!(config.retry.base_backoff_ms, RetryConfig::default().base_backoff_ms);
        assert_eq!(config.solver, SolverConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = LocatorConfig::default();
        config.min_ranges = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { ref parameter, .. }) if parameter == "min_ranges"
        ));

        let mut config = LocatorConfig::default();
        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());

        let mut config = LocatorConfig::default();
        config.solver.initial_damping = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("tag_locator_config_{}.json", std::process::id()));
        let mut config = LocatorConfig::default();
        config.retry.max_consecutive_failures = 7;

        config.save_to_file(&path).unwrap();
        let loaded = LocatorConfig::load_from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = LocatorConfig::load_from_file("/nonexistent/tag_locator.json");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
