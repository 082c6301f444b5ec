//! Task sources.
//!
//! A source is pulled one task at a time. It may be finite or unbounded and
//! is never rewound. Any `Stream` of boxed tasks is a source.

use fanout_task::BoxTask;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::mpsc;

/// Produces the next task, or `None` once exhausted.
pub trait TaskSource: Send {
  /// Pull the next task.
  fn next_task(&mut self) -> BoxFuture<'_, Option<BoxTask>>;
}

impl<S> TaskSource for S
where
  S: Stream<Item = BoxTask> + Send + Unpin,
{
  fn next_task(&mut self) -> BoxFuture<'_, Option<BoxTask>> {
    StreamExt::next(self).boxed()
  }
}

/// A source over an in-memory collection of tasks.
pub fn from_tasks<I>(tasks: I) -> BoxStream<'static, BoxTask>
where
  I: IntoIterator<Item = BoxTask>,
  I::IntoIter: Send + 'static,
{
  stream::iter(tasks).boxed()
}

/// A source fed by a channel; exhausted once every sender is dropped.
///
/// Use this when tasks are produced while the run is already in progress
/// and their number is not known up front.
pub fn from_channel(receiver: mpsc::Receiver<BoxTask>) -> BoxStream<'static, BoxTask> {
  stream::unfold(receiver, |mut receiver| async move {
    receiver.recv().await.map(|task| (task, receiver))
  })
  .boxed()
}
