//! Task errors.

/// Errors a task body can return.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
  /// The body observed cancellation and stopped early.
  #[error("task cancelled")]
  Cancelled,

  /// The body failed.
  #[error("{message}")]
  Failed { message: String },

  /// An I/O operation inside the body failed.
  #[error("io error: {source}")]
  Io {
    #[from]
    source: std::io::Error,
  },
}

impl TaskError {
  /// Create a [`TaskError::Failed`] from a message.
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  /// Whether the body gave up because it observed cancellation.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}
