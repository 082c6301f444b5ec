//! The task contract.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::cancel::CancelObserver;
use crate::error::TaskError;

/// Future returned by [`Task::run`].
pub type TaskFuture = BoxFuture<'static, Result<serde_json::Value, TaskError>>;

/// A boxed task, as produced by task sources.
pub type BoxTask = Box<dyn Task>;

/// An opaque unit of work.
///
/// `run` consumes the task, so a body can only ever be started once. Bodies
/// are expected to return promptly after `cancel` fires; the pipeline never
/// aborts a running body.
pub trait Task: Send + 'static {
  /// Caller-supplied identifier, used for reporting only.
  fn id(&self) -> &str;

  /// Start the body.
  fn run(self: Box<Self>, cancel: CancelObserver) -> TaskFuture;
}

/// A task backed by a closure.
pub struct FnTask<F> {
  id: String,
  body: F,
}

impl<F, Fut> FnTask<F>
where
  F: FnOnce(CancelObserver) -> Fut + Send + 'static,
  Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send + 'static,
{
  /// Create a new closure-backed task.
  pub fn new(id: impl Into<String>, body: F) -> Self {
    Self {
      id: id.into(),
      body,
    }
  }

  /// Create a new closure-backed task, already boxed.
  pub fn boxed(id: impl Into<String>, body: F) -> BoxTask {
    Box::new(Self::new(id, body))
  }
}

impl<F, Fut> Task for FnTask<F>
where
  F: FnOnce(CancelObserver) -> Fut + Send + 'static,
  Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send + 'static,
{
  fn id(&self) -> &str {
    &self.id
  }

  fn run(self: Box<Self>, cancel: CancelObserver) -> TaskFuture {
    let this = *self;
    (this.body)(cancel).boxed()
  }
}

impl<F> fmt::Debug for FnTask<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnTask").field("id", &self.id).finish()
  }
}
