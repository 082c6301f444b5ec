//! Read-only view of a pipeline's cancellation signal.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// A read-only handle on a cancellation signal.
///
/// Handed to every task body. Once the signal fires, every observer (including
/// ones cloned after the fact) sees it immediately and forever. Observers
/// cannot trigger the signal themselves.
#[derive(Debug, Clone)]
pub struct CancelObserver {
  token: CancellationToken,
}

impl CancelObserver {
  /// Wrap a token. Only the owner of `token` can trigger cancellation.
  pub fn new(token: CancellationToken) -> Self {
    Self { token }
  }

  /// An observer that never fires.
  ///
  /// Useful when running a task body outside of a pipeline.
  pub fn detached() -> Self {
    Self::new(CancellationToken::new())
  }

  /// Non-blocking point check.
  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Resolves once cancellation has been triggered.
  pub async fn cancelled(&self) {
    self.token.cancelled().await
  }

  /// Return `Err(TaskError::Cancelled)` if cancellation has been triggered.
  ///
  /// Bodies call this before each unit of sub-work.
  pub fn check(&self) -> Result<(), TaskError> {
    if self.is_cancelled() {
      Err(TaskError::Cancelled)
    } else {
      Ok(())
    }
  }

  /// Run `fut` unless cancellation fires first, in which case `fut` is dropped
  /// and `None` is returned.
  pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
  where
    F: Future,
  {
    tokio::select! {
      biased;
      _ = self.token.cancelled() => None,
      output = fut => Some(output),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn test_check_before_and_after_cancel() {
    let token = CancellationToken::new();
    let observer = CancelObserver::new(token.clone());

    assert!(observer.check().is_ok());
    token.cancel();
    assert!(matches!(observer.check(), Err(TaskError::Cancelled)));
  }

  #[test]
  fn test_late_clone_sees_cancellation() {
    let token = CancellationToken::new();
    let observer = CancelObserver::new(token.clone());
    token.cancel();

    let late = observer.clone();
    assert!(late.is_cancelled());
  }

  #[tokio::test(start_paused = true)]
  async fn test_run_until_cancelled_drops_future() {
    let token = CancellationToken::new();
    let observer = CancelObserver::new(token.clone());

    let canceller = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      token.cancel();
    });

    let result = observer
      .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
      .await;
    assert!(result.is_none());
    canceller.await.unwrap();
  }

  #[tokio::test]
  async fn test_run_until_cancelled_completes() {
    let observer = CancelObserver::detached();
    let result = observer.run_until_cancelled(async { 7 }).await;
    assert_eq!(result, Some(7));
  }
}
