//! Admission gate: a cancellable counting semaphore.

use std::num::NonZeroUsize;
use std::sync::Arc;

use fanout_task::CancelObserver;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct Slot {
  _permit: OwnedSemaphorePermit,
}

/// Result of [`AdmissionGate::acquire`].
#[derive(Debug)]
pub enum Admission {
  /// A slot was reserved for the caller.
  Granted(Slot),
  /// Cancellation fired before a slot became available. No slot is held.
  Cancelled,
}

/// Bounds how many task bodies may execute at once.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
  semaphore: Arc<Semaphore>,
  capacity: usize,
}

impl AdmissionGate {
  /// Create a gate with `capacity` slots.
  pub fn new(capacity: NonZeroUsize) -> Self {
    Self {
      semaphore: Arc::new(Semaphore::new(capacity.get())),
      capacity: capacity.get(),
    }
  }

  /// Wait for a free slot, unless cancellation fires first.
  ///
  /// If a slot and cancellation are both available, cancellation wins, so no
  /// new work is admitted after the signal.
  pub async fn acquire(&self, cancel: &CancelObserver) -> Admission {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Admission::Cancelled,
      permit = self.semaphore.clone().acquire_owned() => match permit {
        Ok(permit) => Admission::Granted(Slot { _permit: permit }),
        // The semaphore is never closed; treat it like cancellation anyway.
        Err(_) => Admission::Cancelled,
      },
    }
  }

  /// Total number of slots.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of slots currently held.
  pub fn outstanding(&self) -> usize {
    self.capacity - self.semaphore.available_permits()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  use crate::cancel::{CancelReason, Cancellation};

  fn gate(capacity: usize) -> AdmissionGate {
    AdmissionGate::new(NonZeroUsize::new(capacity).unwrap())
  }

  #[tokio::test]
  async fn test_acquire_and_release() {
    let gate = gate(2);
    let cancel = Cancellation::new();
    let observer = cancel.observer();

    let a = gate.acquire(&observer).await;
    let b = gate.acquire(&observer).await;
    assert!(matches!(a, Admission::Granted(_)));
    assert!(matches!(b, Admission::Granted(_)));
    assert_eq!(gate.outstanding(), 2);

    drop(a);
    assert_eq!(gate.outstanding(), 1);
    drop(b);
    assert_eq!(gate.outstanding(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_acquire_blocks_at_capacity() {
    let gate = gate(1);
    let observer = Cancellation::new().observer();

    let held = gate.acquire(&observer).await;
    let pending = tokio::time::timeout(Duration::from_millis(50), gate.acquire(&observer)).await;
    assert!(pending.is_err(), "second acquire should wait");

    drop(held);
    let next = gate.acquire(&observer).await;
    assert!(matches!(next, Admission::Granted(_)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_interrupts_waiting_acquire() {
    let gate = gate(1);
    let cancel = Cancellation::new();
    let observer = cancel.observer();
    let _held = gate.acquire(&observer).await;

    let waiter = {
      let gate = gate.clone();
      let observer = observer.clone();
      tokio::spawn(async move { gate.acquire(&observer).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.trigger(CancelReason::External);

    let admission = waiter.await.unwrap();
    assert!(matches!(admission, Admission::Cancelled));
    assert_eq!(gate.outstanding(), 1);
  }

  #[tokio::test]
  async fn test_cancel_wins_over_free_slot() {
    let gate = gate(3);
    let cancel = Cancellation::new();
    cancel.trigger(CancelReason::External);

    let admission = gate.acquire(&cancel.observer()).await;
    assert!(matches!(admission, Admission::Cancelled));
    assert_eq!(gate.outstanding(), 0);
  }
}
