//! Bounded sensor event queue shared by many producers and one consumer.
//!
//! Producers never block: a full queue drops the offered event and bumps a shared
//! counter the consumer reports later. The consumer side can flush everything
//! pending in one go when it falls behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use crate::types::SensorEvent;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("event queue full, event dropped")]
    Full,
    #[error("event queue closed")]
    Closed,
}

/// Producer half. Cheap to clone; one per sensor task.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<SensorEvent>,
    rejected: Arc<AtomicU64>,
}

impl EventSender {
    pub fn try_send(&self, event: SensorEvent) -> Result<(), EnqueueError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(EnqueueError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(EnqueueError::Closed),
        }
    }
}

/// Consumer half
pub struct EventReceiver {
    rx: Receiver<SensorEvent>,
    rejected: Arc<AtomicU64>,
    capacity: usize,
}

impl EventReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SensorEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<SensorEvent, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.rx.len())
    }

    /// Discard everything currently queued. Returns how many events were dropped.
    pub fn drain_all(&self) -> u64 {
        self.rx.try_iter().count() as u64
    }

    /// Events rejected by producers since the last call
    pub fn take_rejected(&self) -> u64 {
        self.rejected.swap(0, Ordering::Relaxed)
    }

    pub(crate) fn receiver(&self) -> &Receiver<SensorEvent> {
        &self.rx
    }
}

pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = channel::bounded(capacity);
    let rejected = Arc::new(AtomicU64::new(0));
    (
        EventSender { tx, rejected: rejected.clone() },
        EventReceiver { rx, rejected, capacity },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = event_queue(4);
        tx.try_send(SensorEvent::ultrasonic(1, 0.1)).unwrap();
        tx.try_send(SensorEvent::ultrasonic(2, 0.2)).unwrap();

        assert_eq!(rx.try_recv().unwrap().timestamp_us, 1);
        assert_eq!(rx.try_recv().unwrap().timestamp_us, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_rejects_and_counts() {
        let (tx, rx) = event_queue(2);
        let other = tx.clone();
        tx.try_send(SensorEvent::ultrasonic(1, 0.1)).unwrap();
        other.try_send(SensorEvent::ultrasonic(2, 0.1)).unwrap();

        assert_eq!(tx.try_send(SensorEvent::ultrasonic(3, 0.1)), Err(EnqueueError::Full));
        assert_eq!(other.try_send(SensorEvent::ultrasonic(4, 0.1)), Err(EnqueueError::Full));
        assert_eq!(rx.free_slots(), 0);
        assert_eq!(rx.take_rejected(), 2);
        assert_eq!(rx.take_rejected(), 0);
    }

    #[test]
    fn test_drain_all() {
        let (tx, rx) = event_queue(8);
        for t in 0..5 {
            tx.try_send(SensorEvent::ultrasonic(t, 0.1)).unwrap();
        }
        assert_eq!(rx.free_slots(), 3);
        assert_eq!(rx.drain_all(), 5);
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.free_slots(), 8);
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = event_queue(2);
        drop(rx);
        assert_eq!(tx.try_send(SensorEvent::ultrasonic(1, 0.1)), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_recv_timeout_when_idle() {
        let (_tx, rx) = event_queue(2);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(5)).unwrap_err(),
            RecvTimeoutError::Timeout
        );
    }
}
