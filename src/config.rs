//! File-backed pipeline configuration.
//!
//! ```toml
//! discipline = "push"
//! production_interval_millis = 300
//! handling_delay_millis = 1000
//! mode = { kind = "buffered", capacity = 2, eviction = "drop_oldest" }
//! ```

use crate::backpressure::{Discipline, OverflowMode};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest `Buffered` capacity accepted from configuration
pub const MAX_BUFFER_CAPACITY: usize = 1 << 20;

/// Everything needed to wire a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: OverflowMode,
    pub discipline: Discipline,
    /// Delay between two source emissions
    pub production_interval_millis: u64,
    /// Simulated processing cost per delivered value
    pub handling_delay_millis: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: OverflowMode::UnboundedFail,
            discipline: Discipline::Push,
            production_interval_millis: 1,
            handling_delay_millis: 5,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode.capacity() > MAX_BUFFER_CAPACITY {
            return Err(PipelineError::ConfigError(format!(
                "buffer capacity {} exceeds the maximum of {MAX_BUFFER_CAPACITY}",
                self.mode.capacity()
            )));
        }
        Ok(())
    }

    pub fn production_interval(&self) -> Duration {
        Duration::from_millis(self.production_interval_millis)
    }

    pub fn handling_delay(&self) -> Duration {
        Duration::from_millis(self.handling_delay_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::EvictionPolicy;

    #[test]
    fn test_parse_buffered_mode() {
        let config = PipelineConfig::from_toml_str(
            r#"
            production_interval_millis = 300
            handling_delay_millis = 1000
            mode = { kind = "buffered", capacity = 2, eviction = "drop_latest" }
            "#,
        )
        .unwrap();

        assert_eq!(
            config.mode,
            OverflowMode::Buffered {
                capacity: 2,
                eviction: EvictionPolicy::DropLatest
            }
        );
        assert_eq!(config.discipline, Discipline::Push);
        assert_eq!(config.production_interval(), Duration::from_millis(300));
        assert_eq!(config.handling_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = PipelineConfig::from_toml_str(
            r#"
            discipline = "demand_driven"
            mode = { kind = "keep_latest" }
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, OverflowMode::KeepLatest);
        assert_eq!(config.discipline, Discipline::DemandDriven);
        assert_eq!(config.production_interval_millis, 1);
        assert_eq!(config.handling_delay_millis, 5);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = PipelineConfig::from_toml_str(r#"mode = { kind = "block" }"#);
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let config = PipelineConfig {
            mode: OverflowMode::Buffered {
                capacity: MAX_BUFFER_CAPACITY + 1,
                eviction: EvictionPolicy::DropOldest,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = PipelineConfig::load("/nonexistent/pipeline.toml");
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }
}
