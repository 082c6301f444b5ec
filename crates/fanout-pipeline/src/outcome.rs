//! Per-task outcomes and the run summary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// What happened to one admitted task.
///
/// Exactly one outcome is produced per admitted task.
#[derive(Debug)]
pub(crate) struct Outcome {
  /// Caller-supplied task id.
  pub task_id: String,
  /// Launch order within the run, starting at 0. Outcomes arrive in
  /// completion order; the failure latch compares this to pick a winner.
  pub sequence: u64,
  /// The body's value, or why there is none.
  pub result: Result<serde_json::Value, PipelineError>,
  /// Time spent in the body (zero for skipped tasks).
  pub elapsed: Duration,
}

/// Counters for a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  /// Unique id of the run.
  pub execution_id: String,
  /// Executors launched.
  pub launched: u64,
  /// Bodies that returned a value.
  pub succeeded: u64,
  /// Bodies that returned an error or panicked.
  pub failed: u64,
  /// Tasks admitted but skipped because of cancellation.
  pub skipped: u64,
  /// Wall time of the whole run in milliseconds.
  pub elapsed_ms: u64,
}
