//! The pipeline orchestrator.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use fanout_config::{ConfigError, PipelineConfig};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use crate::cancel::{CancelReason, Cancellation};
use crate::collector;
use crate::error::PipelineError;
use crate::events::{NoopNotifier, PipelineEvent, PipelineNotifier};
use crate::gate::{Admission, AdmissionGate};
use crate::launcher::Launcher;
use crate::outcome::RunSummary;
use crate::source::TaskSource;

/// How the admission loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdmissionEnd {
  SourceExhausted,
  CancelledWhileAdmitting,
}

/// Runs tasks from a source with at most `capacity` bodies in flight.
///
/// A pipeline holds no per-run state; the gate, cancellation signal, task
/// tracker and collector are built fresh for each [`Pipeline::run`], so one
/// pipeline may run several sources concurrently.
#[derive(Clone)]
pub struct Pipeline {
  config: PipelineConfig,
  capacity: NonZeroUsize,
  notifier: Arc<dyn PipelineNotifier>,
}

impl fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

impl Pipeline {
  /// Create a pipeline, validating `config` up front.
  pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
    config.validate()?;
    let capacity = NonZeroUsize::new(config.capacity).ok_or(ConfigError::InvalidCapacity {
      capacity: config.capacity,
    })?;
    Ok(Self {
      config,
      capacity,
      notifier: Arc::new(NoopNotifier),
    })
  }

  /// Create a pipeline with the given capacity and no deadline.
  pub fn with_capacity(capacity: usize) -> Result<Self, PipelineError> {
    Self::new(PipelineConfig::with_capacity(capacity))
  }

  /// Send run events to `notifier`.
  pub fn with_notifier(mut self, notifier: Arc<dyn PipelineNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// The validated configuration this pipeline was built from.
  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Maximum number of task bodies running at once.
  pub fn capacity(&self) -> usize {
    self.capacity.get()
  }

  /// Run every task from `source`.
  ///
  /// Returns once every launched task has finished. The error, if any, is
  /// the first task failure in completion order.
  pub async fn run<S>(&self, source: S) -> Result<RunSummary, PipelineError>
  where
    S: TaskSource,
  {
    self.run_with_cancel(source, CancellationToken::new()).await
  }

  /// Like [`Pipeline::run`], but also stops when `cancel` fires.
  ///
  /// The run never cancels `cancel` itself. Dropping the returned future
  /// cancels the run's own signal, so executors already spawned observe
  /// cancellation and wind down on their own.
  #[instrument(
    name = "pipeline_run",
    skip(self, source, cancel),
    fields(
      execution_id = tracing::field::Empty,
      capacity = self.capacity.get(),
    )
  )]
  pub async fn run_with_cancel<S>(
    &self,
    mut source: S,
    cancel: CancellationToken,
  ) -> Result<RunSummary, PipelineError>
  where
    S: TaskSource,
  {
    let execution_id = uuid::Uuid::new_v4().to_string();
    tracing::Span::current().record("execution_id", execution_id.as_str());
    let started = Instant::now();

    let cancellation = Cancellation::child_of(&cancel);
    // Fires the run's signal if this future is dropped before completion.
    let cancel_on_drop = cancellation.drop_guard();
    let gate = AdmissionGate::new(self.capacity);
    let tracker = TaskTracker::new();
    let (intake, collector) =
      collector::channel(cancellation.clone(), execution_id.clone(), self.notifier.clone());
    let launcher = Launcher::new(
      execution_id.clone(),
      tracker.clone(),
      intake.clone(),
      cancellation.observer(),
      self.notifier.clone(),
    );

    self.notifier.notify(PipelineEvent::PipelineStarted {
      execution_id: execution_id.clone(),
      capacity: self.capacity.get(),
    });

    // The collector's intake closes once admission is over and the last
    // executor is done.
    let closer = async {
      tracker.wait().await;
      drop(intake);
    };

    let deadline = async {
      let Some(timeout) = self.config.timeout() else {
        return;
      };
      tokio::select! {
        _ = tracker.wait() => {}
        _ = tokio::time::sleep(timeout) => {
          if cancellation.trigger(CancelReason::Deadline) {
            warn!(
              execution_id = %execution_id,
              timeout_ms = timeout.as_millis() as u64,
              "pipeline deadline exceeded"
            );
          }
        }
      }
    };

    let ((end, launched), collected, (), ()) = tokio::join!(
      admit(
        &execution_id,
        &mut source,
        &gate,
        &cancellation,
        launcher,
        &tracker
      ),
      collector.drain(),
      closer,
      deadline,
    );

    cancel_on_drop.disarm();
    debug_assert!(tracker.is_empty());
    debug_assert_eq!(gate.outstanding(), 0);

    let reason = cancellation.reason();
    if let Some(reason) = &reason {
      warn!(execution_id = %execution_id, reason = %reason, "pipeline_cancelled");
      self.notifier.notify(PipelineEvent::PipelineCancelled {
        execution_id: execution_id.clone(),
        reason: reason.clone(),
      });
    }

    let summary = RunSummary {
      execution_id: execution_id.clone(),
      launched,
      succeeded: collected.succeeded,
      failed: collected.failed,
      skipped: collected.skipped,
      elapsed_ms: started.elapsed().as_millis() as u64,
    };

    let incomplete =
      end == AdmissionEnd::CancelledWhileAdmitting || collected.skipped > 0;
    let result = match collected.first_error {
      Some(err) => Err(err),
      None if incomplete => Err(PipelineError::Cancelled {
        reason: reason.unwrap_or(CancelReason::External),
      }),
      None => Ok(summary),
    };

    match &result {
      Ok(summary) => {
        info!(
          execution_id = %execution_id,
          launched = summary.launched,
          elapsed_ms = summary.elapsed_ms,
          "pipeline_completed"
        );
        self.notifier.notify(PipelineEvent::PipelineCompleted {
          execution_id: execution_id.clone(),
        });
      }
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "pipeline_failed");
        self.notifier.notify(PipelineEvent::PipelineFailed {
          execution_id: execution_id.clone(),
          error: e.to_string(),
        });
      }
    }
    info!(execution_id = %execution_id, "pipeline_done");

    result
  }
}

/// Pull tasks and launch them until the source runs dry or the run is
/// cancelled. Consumes the launcher and closes the tracker as soon as
/// admission ends, while draining continues.
async fn admit<S>(
  execution_id: &str,
  source: &mut S,
  gate: &AdmissionGate,
  cancellation: &Cancellation,
  mut launcher: Launcher,
  tracker: &TaskTracker,
) -> (AdmissionEnd, u64)
where
  S: TaskSource,
{
  info!(execution_id = %execution_id, "pipeline_admitting");
  let observer = cancellation.observer();

  let end = loop {
    if cancellation.is_cancelled() {
      break AdmissionEnd::CancelledWhileAdmitting;
    }

    let task = tokio::select! {
      biased;
      _ = cancellation.cancelled() => break AdmissionEnd::CancelledWhileAdmitting,
      task = source.next_task() => task,
    };
    let Some(task) = task else {
      break AdmissionEnd::SourceExhausted;
    };

    match gate.acquire(&observer).await {
      Admission::Granted(slot) => launcher.launch(task, slot),
      Admission::Cancelled => break AdmissionEnd::CancelledWhileAdmitting,
    }
  };

  let launched = launcher.launched();
  drop(launcher);
  tracker.close();
  info!(
    execution_id = %execution_id,
    launched,
    end = ?end,
    "pipeline_draining"
  );
  (end, launched)
}
