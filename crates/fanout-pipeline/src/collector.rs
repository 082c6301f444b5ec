//! Result collection.
//!
//! Executors publish through an [`Intake`]. Publishing decides the first
//! failure on the spot (completion order) and triggers cancellation before
//! the executor gives its slot back, so nothing can be admitted between a
//! failure and the signal. The [`Collector`] then drains every outcome until
//! the last intake handle is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::cancel::{CancelReason, Cancellation};
use crate::error::PipelineError;
use crate::events::{PipelineEvent, PipelineNotifier};
use crate::outcome::Outcome;

const NO_FAILURE: u64 = u64::MAX;

/// Remembers which outcome carried the first failure.
#[derive(Debug)]
struct FailureLatch {
  winner: AtomicU64,
  cancel: Cancellation,
}

impl FailureLatch {
  fn record(&self, sequence: u64, task_id: &str) -> bool {
    let won = self
      .winner
      .compare_exchange(NO_FAILURE, sequence, Ordering::AcqRel, Ordering::Acquire)
      .is_ok();
    if won {
      self.cancel.trigger(CancelReason::TaskFailed {
        task_id: task_id.to_string(),
      });
    }
    won
  }

  fn is_winner(&self, sequence: u64) -> bool {
    self.winner.load(Ordering::Acquire) == sequence
  }
}

/// Sending side of the collector. Cloned into every executor and the closer;
/// the collector's channel closes once every clone is dropped.
#[derive(Debug, Clone)]
pub(crate) struct Intake {
  sender: mpsc::UnboundedSender<Outcome>,
  latch: Arc<FailureLatch>,
}

impl Intake {
  /// Publish one outcome. Never blocks.
  pub(crate) fn publish(&self, outcome: Outcome) {
    if let Err(err) = &outcome.result
      && err.is_task_failure()
    {
      self.latch.record(outcome.sequence, &outcome.task_id);
    }
    // Only fails when the run future was dropped; the outcome has no reader then.
    let _ = self.sender.send(outcome);
  }
}

/// What the collector saw once the intake closed.
#[derive(Debug, Default)]
pub(crate) struct Collected {
  pub first_error: Option<PipelineError>,
  pub succeeded: u64,
  pub failed: u64,
  pub skipped: u64,
}

/// Receiving side: drains outcomes in completion order.
pub(crate) struct Collector {
  receiver: mpsc::UnboundedReceiver<Outcome>,
  latch: Arc<FailureLatch>,
  execution_id: String,
  notifier: Arc<dyn PipelineNotifier>,
}

/// Create a connected intake/collector pair.
pub(crate) fn channel(
  cancel: Cancellation,
  execution_id: String,
  notifier: Arc<dyn PipelineNotifier>,
) -> (Intake, Collector) {
  let (sender, receiver) = mpsc::unbounded_channel();
  let latch = Arc::new(FailureLatch {
    winner: AtomicU64::new(NO_FAILURE),
    cancel,
  });
  let intake = Intake {
    sender,
    latch: latch.clone(),
  };
  let collector = Collector {
    receiver,
    latch,
    execution_id,
    notifier,
  };
  (intake, collector)
}

impl Collector {
  /// Drain until every intake handle has been dropped.
  pub(crate) async fn drain(mut self) -> Collected {
    let mut collected = Collected::default();

    while let Some(outcome) = self.receiver.recv().await {
      let elapsed_ms = outcome.elapsed.as_millis() as u64;
      match outcome.result {
        Ok(value) => {
          collected.succeeded += 1;
          self.notifier.notify(PipelineEvent::TaskCompleted {
            execution_id: self.execution_id.clone(),
            task_id: outcome.task_id,
            sequence: outcome.sequence,
            value,
            elapsed_ms,
          });
        }
        Err(PipelineError::Skipped { task_id }) => {
          collected.skipped += 1;
          self.notifier.notify(PipelineEvent::TaskSkipped {
            execution_id: self.execution_id.clone(),
            task_id,
            sequence: outcome.sequence,
          });
        }
        Err(err) => {
          collected.failed += 1;
          self.notifier.notify(PipelineEvent::TaskFailed {
            execution_id: self.execution_id.clone(),
            task_id: outcome.task_id.clone(),
            sequence: outcome.sequence,
            error: err.to_string(),
            elapsed_ms,
          });
          if self.latch.is_winner(outcome.sequence) {
            collected.first_error = Some(err);
          } else {
            debug!(
              task_id = %outcome.task_id,
              error = %err,
              "discarding error after first failure"
            );
          }
        }
      }
    }

    collected
  }
}
