//! Configuration structures for lockstep.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Pipeline sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Pipeline sizing, threaded through every stage constructor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PipelineConfig {
    /// Main buffer capacity and the per-cycle read bound for both readers
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of slots in the secondary ring buffer
    #[serde(default = "default_secondary_capacity")]
    pub secondary_capacity: usize,

    /// Number of evaluator stages consuming each cycle
    #[serde(default = "default_evaluators")]
    pub evaluators: usize,
}

impl PipelineConfig {
    /// Create a config with the given batch size; the ring gets the same size.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            secondary_capacity: batch_size,
            evaluators: default_evaluators(),
        }
    }

    /// Set the secondary ring capacity.
    pub fn with_secondary_capacity(mut self, capacity: usize) -> Self {
        self.secondary_capacity = capacity;
        self
    }

    /// Set the number of evaluators.
    pub fn with_evaluators(mut self, evaluators: usize) -> Self {
        self.evaluators = evaluators;
        self
    }

    /// Validate the pipeline sizing.
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::Error::Config(
                "Batch size must be greater than zero".into(),
            ));
        }

        if self.secondary_capacity == 0 {
            return Err(crate::Error::Config(
                "Secondary buffer capacity must be greater than zero".into(),
            ));
        }

        if self.evaluators == 0 {
            return Err(crate::Error::Config(
                "At least one evaluator is required".into(),
            ));
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            secondary_capacity: default_secondary_capacity(),
            evaluators: default_evaluators(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive string understood by tracing filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Plain text format (default)
    #[default]
    Text,
}

// Default value functions
fn default_batch_size() -> usize {
    10
}
fn default_secondary_capacity() -> usize {
    10
}
fn default_evaluators() -> usize {
    1
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.secondary_capacity, 10);
        assert_eq!(config.evaluators, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new(4)
            .with_secondary_capacity(8)
            .with_evaluators(3);

        assert_eq!(config.batch_size, 4);
        assert_eq!(config.secondary_capacity, 8);
        assert_eq!(config.evaluators, 3);
    }

    #[test]
    fn test_config_validation_zero_batch() {
        let config = Config {
            pipeline: PipelineConfig::new(0),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Batch size"));
    }

    #[test]
    fn test_config_validation_zero_evaluators() {
        let config = Config {
            pipeline: PipelineConfig::new(5).with_evaluators(0),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("evaluator"));
    }

    #[test]
    fn test_config_validation_zero_ring() {
        let config = PipelineConfig::new(5).with_secondary_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            batch_size = 25

            [monitoring]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.batch_size, 25);
        assert_eq!(config.pipeline.secondary_capacity, 10);
        assert_eq!(config.monitoring.log_format, LogFormat::Json);
        assert_eq!(config.monitoring.log_level, LogLevel::Info);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbatch_size = 3\nevaluators = 2").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.batch_size, 3);
        assert_eq!(config.pipeline.evaluators, 2);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbatch_size = 0").unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_log_level_variants() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_ne!(LogLevel::Debug, LogLevel::Warn);
    }

    #[test]
    fn test_log_format_variants() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
        assert_ne!(LogFormat::Json, LogFormat::Text);
    }
}
