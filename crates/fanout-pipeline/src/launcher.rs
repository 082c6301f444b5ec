//! Executor launching.
//!
//! Every admitted task gets its own executor, spawned on the run's
//! [`TaskTracker`]. The executor owns the task's slot and an intake handle,
//! and releases them in that order after publishing the outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use fanout_task::{BoxTask, CancelObserver};
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument};

use crate::collector::Intake;
use crate::error::PipelineError;
use crate::events::{PipelineEvent, PipelineNotifier};
use crate::gate::Slot;
use crate::outcome::Outcome;

/// Spawns executors for admitted tasks.
pub(crate) struct Launcher {
  execution_id: String,
  tracker: TaskTracker,
  intake: Intake,
  observer: CancelObserver,
  notifier: Arc<dyn PipelineNotifier>,
  next_sequence: u64,
}

impl Launcher {
  pub(crate) fn new(
    execution_id: String,
    tracker: TaskTracker,
    intake: Intake,
    observer: CancelObserver,
    notifier: Arc<dyn PipelineNotifier>,
  ) -> Self {
    Self {
      execution_id,
      tracker,
      intake,
      observer,
      notifier,
      next_sequence: 0,
    }
  }

  /// Number of executors launched so far.
  pub(crate) fn launched(&self) -> u64 {
    self.next_sequence
  }

  /// Hand `task` and its slot to a new executor.
  pub(crate) fn launch(&mut self, task: BoxTask, slot: Slot) {
    let execution = Execution {
      execution_id: self.execution_id.clone(),
      task_id: task.id().to_string(),
      sequence: self.next_sequence,
      task,
      slot,
      intake: self.intake.clone(),
      observer: self.observer.clone(),
      notifier: self.notifier.clone(),
    };
    self.next_sequence += 1;
    self.tracker.spawn(execution.run());
  }
}

/// One admitted task and everything it holds while running.
struct Execution {
  execution_id: String,
  task_id: String,
  sequence: u64,
  task: BoxTask,
  slot: Slot,
  intake: Intake,
  observer: CancelObserver,
  notifier: Arc<dyn PipelineNotifier>,
}

impl Execution {
  #[instrument(
    name = "task_execute",
    skip(self),
    fields(
      execution_id = %self.execution_id,
      task_id = %self.task_id,
      sequence = self.sequence,
    )
  )]
  async fn run(self) {
    let Self {
      execution_id,
      task_id,
      sequence,
      task,
      slot,
      intake,
      observer,
      notifier,
    } = self;

    let started = Instant::now();
    // Everything up to publishing sits inside the unwind boundary, including
    // caller code that builds the body future and the notifier.
    let attempt = AssertUnwindSafe(execute(
      &execution_id,
      &task_id,
      sequence,
      task,
      &observer,
      notifier.as_ref(),
    ))
    .catch_unwind()
    .await;

    let result = match attempt {
      Ok(result) => result,
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        error!(
          execution_id = %execution_id,
          task_id = %task_id,
          panic = %message,
          "task_failed"
        );
        Err(PipelineError::TaskFaulted {
          task_id: task_id.clone(),
          message,
        })
      }
    };
    let elapsed = match &result {
      Err(PipelineError::Skipped { .. }) => Duration::ZERO,
      _ => started.elapsed(),
    };

    // A failure triggers cancellation inside publish, before the slot frees.
    intake.publish(Outcome {
      task_id,
      sequence,
      result,
      elapsed,
    });
    drop(slot);
    drop(intake);
  }
}

async fn execute(
  execution_id: &str,
  task_id: &str,
  sequence: u64,
  task: BoxTask,
  observer: &CancelObserver,
  notifier: &dyn PipelineNotifier,
) -> Result<serde_json::Value, PipelineError> {
  if observer.is_cancelled() {
    drop(task);
    info!(execution_id = %execution_id, task_id = %task_id, "task_skipped");
    return Err(PipelineError::Skipped {
      task_id: task_id.to_string(),
    });
  }

  notifier.notify(PipelineEvent::TaskStarted {
    execution_id: execution_id.to_string(),
    task_id: task_id.to_string(),
    sequence,
  });
  info!(execution_id = %execution_id, task_id = %task_id, "task_started");

  let started = Instant::now();
  match task.run(observer.clone()).await {
    Ok(value) => {
      info!(
        execution_id = %execution_id,
        task_id = %task_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "task_completed"
      );
      Ok(value)
    }
    Err(source) => {
      error!(
        execution_id = %execution_id,
        task_id = %task_id,
        error = %source,
        "task_failed"
      );
      Err(PipelineError::TaskFailed {
        task_id: task_id.to_string(),
        source,
      })
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "task panicked".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::num::NonZeroUsize;

  use fanout_task::{FnTask, TaskError};

  use crate::cancel::{CancelReason, Cancellation};
  use crate::collector;
  use crate::events::NoopNotifier;
  use crate::gate::{Admission, AdmissionGate};

  struct Harness {
    cancel: Cancellation,
    gate: AdmissionGate,
    tracker: TaskTracker,
    launcher: Launcher,
    collector: collector::Collector,
  }

  fn harness(capacity: usize, notifier: Arc<dyn PipelineNotifier>) -> Harness {
    let cancel = Cancellation::new();
    let (intake, collector) = collector::channel(cancel.clone(), "e".to_string(), notifier.clone());
    let tracker = TaskTracker::new();
    let launcher = Launcher::new(
      "e".to_string(),
      tracker.clone(),
      intake,
      cancel.observer(),
      notifier,
    );
    Harness {
      gate: AdmissionGate::new(NonZeroUsize::new(capacity).unwrap()),
      cancel,
      tracker,
      launcher,
      collector,
    }
  }

  async fn slot(gate: &AdmissionGate, cancel: &Cancellation) -> Slot {
    match gate.acquire(&cancel.observer()).await {
      Admission::Granted(slot) => slot,
      Admission::Cancelled => panic!("unexpected cancellation"),
    }
  }

  /// Stop launching and collect everything the executors published.
  async fn finish(h: Harness) -> collector::Collected {
    drop(h.launcher);
    h.tracker.close();
    h.tracker.wait().await;
    assert_eq!(h.gate.outstanding(), 0);
    h.collector.drain().await
  }

  struct PanicOnStart;

  impl PipelineNotifier for PanicOnStart {
    fn notify(&self, event: PipelineEvent) {
      if let PipelineEvent::TaskStarted { .. } = event {
        panic!("notifier exploded");
      }
    }
  }

  #[tokio::test]
  async fn test_executor_releases_everything() {
    let mut h = harness(1, Arc::new(NoopNotifier));
    let slot = slot(&h.gate, &h.cancel).await;
    h.launcher.launch(
      FnTask::boxed("a", |_| async { Ok(serde_json::json!(1)) }),
      slot,
    );
    assert_eq!(h.launcher.launched(), 1);

    let collected = finish(h).await;
    assert_eq!(collected.succeeded, 1);
  }

  #[tokio::test]
  async fn test_skips_when_already_cancelled() {
    let mut h = harness(1, Arc::new(NoopNotifier));
    let slot = slot(&h.gate, &h.cancel).await;
    h.cancel.trigger(CancelReason::External);

    h.launcher.launch(
      FnTask::boxed("a", |_| async {
        if true {
          panic!("body must not run");
        }
        Ok(serde_json::Value::Null)
      }),
      slot,
    );

    let collected = finish(h).await;
    assert_eq!(collected.skipped, 1);
    assert_eq!(collected.failed, 0);
  }

  #[tokio::test]
  async fn test_failure_cancels_before_slot_release() {
    let mut h = harness(1, Arc::new(NoopNotifier));
    let slot = slot(&h.gate, &h.cancel).await;
    h.launcher.launch(
      FnTask::boxed("bad", |_| async { Err(TaskError::failed("nope")) }),
      slot,
    );

    // Once the slot is back, the signal must already be visible.
    let admission = h.gate.acquire(&h.cancel.observer()).await;
    assert!(matches!(admission, Admission::Cancelled));
    assert!(h.cancel.is_cancelled());

    let collected = finish(h).await;
    assert_eq!(collected.first_error.unwrap().task_id(), Some("bad"));
  }

  #[tokio::test]
  async fn test_panic_becomes_fault() {
    let mut h = harness(1, Arc::new(NoopNotifier));
    let slot = slot(&h.gate, &h.cancel).await;
    h.launcher.launch(
      FnTask::boxed("p", |_| async {
        if true {
          panic!("kaboom");
        }
        Ok(serde_json::Value::Null)
      }),
      slot,
    );

    let collected = finish(h).await;
    match collected.first_error {
      Some(PipelineError::TaskFaulted { task_id, message }) => {
        assert_eq!(task_id, "p");
        assert_eq!(message, "kaboom");
      }
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_notifier_panic_still_publishes_outcome() {
    let mut h = harness(1, Arc::new(PanicOnStart));
    let slot = slot(&h.gate, &h.cancel).await;
    h.launcher.launch(
      FnTask::boxed("n", |_| async { Ok(serde_json::Value::Null) }),
      slot,
    );

    let collected = finish(h).await;
    assert_eq!(collected.failed, 1);
    match collected.first_error {
      Some(PipelineError::TaskFaulted { task_id, message }) => {
        assert_eq!(task_id, "n");
        assert_eq!(message, "notifier exploded");
      }
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn test_panic_message_formats() {
    let payload: Box<dyn Any + Send> = Box::new(format!("index {}", 3));
    assert_eq!(panic_message(payload.as_ref()), "index 3");

    let payload: Box<dyn Any + Send> = Box::new(42u8);
    assert_eq!(panic_message(payload.as_ref()), "task panicked");
  }
}
