use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Capacity used when none is given.
pub const DEFAULT_CAPACITY: usize = 4;

fn default_capacity() -> usize {
  DEFAULT_CAPACITY
}

/// Settings for a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
  /// Maximum number of task bodies executing at once.
  #[serde(default = "default_capacity")]
  pub capacity: usize,
  /// Cancel the run after this many milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      timeout_ms: None,
    }
  }
}

impl PipelineConfig {
  /// Config with the given capacity and no deadline.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity,
      ..Self::default()
    }
  }

  /// Builder-style deadline setter.
  pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }

  /// The deadline as a [`Duration`], if any.
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_ms.map(Duration::from_millis)
  }

  /// Check the invariants the pipeline relies on.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.capacity == 0 {
      return Err(ConfigError::InvalidCapacity {
        capacity: self.capacity,
      });
    }
    if self.timeout_ms == Some(0) {
      return Err(ConfigError::InvalidTimeout);
    }
    Ok(())
  }

  /// Parse and validate a JSON config.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let config: Self =
      serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a JSON config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_apply_to_missing_fields() {
    let config = PipelineConfig::from_json("{}").unwrap();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(config.capacity, DEFAULT_CAPACITY);
    assert!(config.timeout().is_none());
  }

  #[test]
  fn test_parse_full_config() {
    let config = PipelineConfig::from_json(r#"{"capacity": 8, "timeout_ms": 1500}"#).unwrap();
    assert_eq!(config.capacity, 8);
    assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
  }

  #[test]
  fn test_zero_capacity_rejected() {
    let err = PipelineConfig::with_capacity(0).validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidCapacity { capacity: 0 }));
  }

  #[test]
  fn test_zero_timeout_rejected() {
    let err = PipelineConfig::from_json(r#"{"timeout_ms": 0}"#).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidTimeout));
  }

  #[test]
  fn test_parse_error() {
    let err = PipelineConfig::from_json(r#"{"capacity": "lots"}"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn test_serialize_skips_missing_timeout() {
    let json = serde_json::to_value(PipelineConfig::with_capacity(2)).unwrap();
    assert_eq!(json, serde_json::json!({ "capacity": 2 }));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.json");
    std::fs::write(&path, r#"{"capacity": 3}"#).unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.capacity, 3);
  }

  #[test]
  fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineConfig::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }
}
