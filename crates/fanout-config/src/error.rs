use std::path::PathBuf;

/// Errors produced while loading or validating a [`crate::PipelineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// Capacity must allow at least one task to run.
  #[error("capacity must be at least 1, got {capacity}")]
  InvalidCapacity { capacity: usize },

  /// A zero timeout would cancel the run before it starts.
  #[error("timeout_ms must be greater than 0")]
  InvalidTimeout,

  /// The config file could not be read.
  #[error("failed to read config file '{}'", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The config is not valid JSON for this schema.
  #[error("failed to parse config: {source}")]
  Parse {
    #[source]
    source: serde_json::Error,
  },
}
