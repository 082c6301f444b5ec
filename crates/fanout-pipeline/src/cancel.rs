//! One-shot cancellation broadcast.
//!
//! [`Cancellation`] wraps a [`CancellationToken`] with a reason that is
//! decided once and never changes.
//! Observers never register with it: a token that has been cancelled stays
//! cancelled, so tasks spawned after the trigger still see it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use fanout_task::CancelObserver;
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a run was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
  /// A task failed and the run stopped admitting work.
  TaskFailed { task_id: String },
  /// The caller's token was cancelled (user abort, shutdown).
  External,
  /// The configured deadline elapsed.
  Deadline,
}

impl fmt::Display for CancelReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::TaskFailed { task_id } => write!(f, "task '{}' failed", task_id),
      Self::External => write!(f, "cancelled by caller"),
      Self::Deadline => write!(f, "deadline exceeded"),
    }
  }
}

/// A cancellation signal shared by everything in a single run.
#[derive(Debug, Clone)]
pub struct Cancellation {
  token: CancellationToken,
  reason: Arc<Mutex<Option<CancelReason>>>,
}

impl Cancellation {
  /// A fresh, untriggered signal.
  pub fn new() -> Self {
    Self::from_token(CancellationToken::new())
  }

  /// A signal that also fires when `parent` is cancelled.
  ///
  /// Triggering the child never cancels `parent`.
  pub fn child_of(parent: &CancellationToken) -> Self {
    Self::from_token(parent.child_token())
  }

  fn from_token(token: CancellationToken) -> Self {
    Self {
      token,
      reason: Arc::new(Mutex::new(None)),
    }
  }

  /// Trigger cancellation.
  ///
  /// Returns `true` only for the call that performed the transition; every
  /// later call (or a call after the parent token fired) is a no-op.
  pub fn trigger(&self, reason: CancelReason) -> bool {
    let mut cell = self.lock_reason();
    if cell.is_some() {
      return false;
    }
    // Checked while holding the cell so a parent that already fired keeps
    // the real cause.
    if self.token.is_cancelled() {
      *cell = Some(CancelReason::External);
      return false;
    }
    *cell = Some(reason);
    self.token.cancel();
    true
  }

  /// Cancel when the returned guard is dropped, unless it is disarmed first.
  pub fn drop_guard(&self) -> DropGuard {
    self.token.clone().drop_guard()
  }

  /// Non-blocking point check.
  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Resolves once cancelled.
  pub async fn cancelled(&self) {
    self.token.cancelled().await
  }

  /// The cause of cancellation, if cancelled.
  ///
  /// Once this returns `Some`, it returns the same reason forever.
  pub fn reason(&self) -> Option<CancelReason> {
    let mut cell = self.lock_reason();
    if cell.is_none() && self.token.is_cancelled() {
      *cell = Some(CancelReason::External);
    }
    cell.clone()
  }

  fn lock_reason(&self) -> MutexGuard<'_, Option<CancelReason>> {
    // Nothing panics while the lock is held.
    self.reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// A read-only handle for task bodies and sources.
  pub fn observer(&self) -> CancelObserver {
    CancelObserver::new(self.token.clone())
  }
}

impl Default for Cancellation {
  fn default() -> Self {
    Self::new()
  }
}
