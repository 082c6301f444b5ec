//! Pipeline errors.

use fanout_config::ConfigError;
use fanout_task::TaskError;

use crate::cancel::CancelReason;

/// Errors that can come out of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// The pipeline was constructed with an invalid configuration.
  #[error("invalid pipeline configuration: {source}")]
  InvalidConfig {
    #[from]
    source: ConfigError,
  },

  /// A task body returned an error.
  #[error("task '{task_id}' failed: {source}")]
  TaskFailed {
    task_id: String,
    #[source]
    source: TaskError,
  },

  /// A task body panicked.
  #[error("task '{task_id}' faulted: {message}")]
  TaskFaulted { task_id: String, message: String },

  /// A task was admitted but cancellation fired before its body started.
  #[error("task '{task_id}' skipped: pipeline cancelled")]
  Skipped { task_id: String },

  /// The run was cancelled from outside (caller abort or deadline) and no
  /// task failed.
  #[error("pipeline cancelled: {reason}")]
  Cancelled { reason: CancelReason },
}

impl PipelineError {
  /// The id of the task this error is attributed to, if any.
  pub fn task_id(&self) -> Option<&str> {
    match self {
      Self::TaskFailed { task_id, .. }
      | Self::TaskFaulted { task_id, .. }
      | Self::Skipped { task_id } => Some(task_id),
      Self::InvalidConfig { .. } | Self::Cancelled { .. } => None,
    }
  }

  /// Whether this is a genuine task failure (error or panic), as opposed to
  /// a skip or a cancellation.
  pub fn is_task_failure(&self) -> bool {
    matches!(self, Self::TaskFailed { .. } | Self::TaskFaulted { .. })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_task_id_attribution() {
    let failed = PipelineError::TaskFailed {
      task_id: "3".to_string(),
      source: TaskError::failed("boom"),
    };
    assert_eq!(failed.task_id(), Some("3"));
    assert!(failed.is_task_failure());
    assert_eq!(failed.to_string(), "task '3' failed: boom");

    let skipped = PipelineError::Skipped {
      task_id: "4".to_string(),
    };
    assert_eq!(skipped.task_id(), Some("4"));
    assert!(!skipped.is_task_failure());

    let cancelled = PipelineError::Cancelled {
      reason: CancelReason::Deadline,
    };
    assert_eq!(cancelled.task_id(), None);
  }

  #[test]
  fn test_fault_is_distinct() {
    let err = PipelineError::TaskFaulted {
      task_id: "t".to_string(),
      message: "index out of bounds".to_string(),
    };
    assert!(err.is_task_failure());
    assert_eq!(err.to_string(), "task 't' faulted: index out of bounds");
  }
}
