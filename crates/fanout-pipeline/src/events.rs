//! Pipeline events and notifiers for observability.
//!
//! Events are emitted while a run progresses so callers can print, persist or
//! stream results without the pipeline knowing how they are formatted.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::cancel::CancelReason;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
  /// The run has started admitting tasks.
  PipelineStarted { execution_id: String, capacity: usize },

  /// A task body has started executing.
  TaskStarted {
    execution_id: String,
    task_id: String,
    sequence: u64,
  },

  /// A task body returned a value.
  TaskCompleted {
    execution_id: String,
    task_id: String,
    sequence: u64,
    value: serde_json::Value,
    elapsed_ms: u64,
  },

  /// A task body returned an error or panicked.
  TaskFailed {
    execution_id: String,
    task_id: String,
    sequence: u64,
    error: String,
    elapsed_ms: u64,
  },

  /// A task was admitted but never started because the run was cancelled.
  TaskSkipped {
    execution_id: String,
    task_id: String,
    sequence: u64,
  },

  /// The run's cancellation signal fired.
  PipelineCancelled {
    execution_id: String,
    reason: CancelReason,
  },

  /// Every task succeeded.
  PipelineCompleted { execution_id: String },

  /// The run ended with an error.
  PipelineFailed { execution_id: String, error: String },
}

/// Trait for receiving pipeline events.
///
/// The pipeline calls `notify` from its own flow and from executors, so
/// implementations must be cheap and must not block.
pub trait PipelineNotifier: Send + Sync {
  /// Called when a pipeline event occurs.
  fn notify(&self, event: PipelineEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl PipelineNotifier for NoopNotifier {
  fn notify(&self, _event: PipelineEvent) {}
}

/// A notifier that forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls an executor; volume is at most
  // a few events per task.
  sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelNotifier {
  /// Create a new channel notifier.
  pub fn new(sender: mpsc::UnboundedSender<PipelineEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl PipelineNotifier for ChannelNotifier {
  fn notify(&self, event: PipelineEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
