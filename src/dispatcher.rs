//! Single consumer of the sensor event queue.
//!
//! Owns the [`FusionEngine`] and applies the queue policies around it: control
//! commands first, sensor events in arrival order, a liveness tick when nothing
//! arrives for `idle_timeout_ms`, and a full flush whenever the queue is about to
//! fill up.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Select, Sender, TryRecvError, TrySendError};

use crate::config::FusionConfig;
use crate::error::FusionResult;
use crate::fusion_engine::{FusionEngine, FusionEvent, FusionSnapshot, OverflowOrigin};
use crate::queue::{event_queue, EventReceiver, EventSender};
use crate::types::SensorEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    ResetHome,
}

/// Notified after a home reset, e.g. the navigation driver
pub trait HomeListener: Send {
    fn set_home(&mut self);
}

impl<F: FnMut() + Send> HomeListener for F {
    fn set_home(&mut self) {
        self()
    }
}

/// Issues control commands to a running dispatcher
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Request a tare. Returns false once the dispatcher is gone.
    pub fn reset_home(&self) -> bool {
        self.tx.send(ControlCommand::ResetHome).is_ok()
    }
}

/// Latest published snapshot, readable from any thread
#[derive(Clone, Default)]
pub struct EstimateHandle {
    inner: Arc<Mutex<FusionSnapshot>>,
}

impl EstimateHandle {
    pub fn latest(&self) -> FusionSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn publish(&self, snapshot: FusionSnapshot) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Processed,
    HomeReset,
    Idle,
    /// Every producer is gone and the queue is empty
    Disconnected,
}

pub struct Dispatcher {
    engine: FusionEngine,
    events: EventReceiver,
    control: Receiver<ControlCommand>,
    idle_timeout: Duration,
    listeners: Vec<Box<dyn HomeListener>>,
    estimate: EstimateHandle,
    diagnostics: Option<Sender<FusionEvent>>,
}

impl Dispatcher {
    pub fn new(engine: FusionEngine, events: EventReceiver) -> (Self, ControlHandle) {
        let (control_tx, control_rx) = channel::unbounded();
        let idle_timeout = Duration::from_millis(engine.config().idle_timeout_ms);
        let estimate = EstimateHandle::default();
        estimate.publish(engine.snapshot());
        (
            Self {
                engine,
                events,
                control: control_rx,
                idle_timeout,
                listeners: Vec::new(),
                estimate,
                diagnostics: None,
            },
            ControlHandle { tx: control_tx },
        )
    }

    /// Engine, queue and dispatcher wired from one config
    pub fn from_config(config: FusionConfig) -> FusionResult<(Self, EventSender, ControlHandle)> {
        let (tx, rx) = event_queue(config.queue_capacity);
        let engine = FusionEngine::new(config)?;
        let (dispatcher, control) = Self::new(engine, rx);
        Ok((dispatcher, tx, control))
    }

    pub fn add_home_listener(&mut self, listener: Box<dyn HomeListener>) {
        self.listeners.push(listener);
    }

    /// Forward every diagnostic event to `tx`. Events are dropped when it is full.
    pub fn with_diagnostics(mut self, tx: Sender<FusionEvent>) -> Self {
        self.diagnostics = Some(tx);
        self
    }

    pub fn estimate_handle(&self) -> EstimateHandle {
        self.estimate.clone()
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    /// Wait for and handle exactly one command, event or idle tick.
    pub fn step(&mut self) -> StepOutcome {
        loop {
            match self.control.try_recv() {
                Ok(cmd) => return self.handle_control(cmd),
                // All control handles dropped; stop waking up for it
                Err(TryRecvError::Disconnected) => self.control = channel::never(),
                Err(TryRecvError::Empty) => {}
            }

            let ready = {
                let mut sel = Select::new();
                sel.recv(&self.control);
                sel.recv(self.events.receiver());
                sel.ready_timeout(self.idle_timeout)
            };
            if ready.is_err() {
                return self.handle_idle();
            }

            // A command may have landed while waiting on an event
            if let Ok(cmd) = self.control.try_recv() {
                return self.handle_control(cmd);
            }

            match self.events.try_recv() {
                Ok(event) => return self.handle_event(event),
                Err(TryRecvError::Disconnected) => return StepOutcome::Disconnected,
                // Woken by the control channel
                Err(TryRecvError::Empty) => continue,
            }
        }
    }

    /// Run until every producer has hung up. Returns the engine for inspection.
    pub fn run(mut self) -> FusionEngine {
        log::info!("Fusion dispatcher started");
        while self.step() != StepOutcome::Disconnected {}
        let stats = self.engine.stats();
        log::info!(
            "Fusion dispatcher stopped: {} events, {} flushed, {} dropped by producers",
            stats.events_processed,
            stats.flushed_events,
            stats.producer_drops
        );
        self.engine
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<FusionEngine>> {
        thread::Builder::new()
            .name("fusion".into())
            .spawn(move || self.run())
    }

    fn handle_control(&mut self, cmd: ControlCommand) -> StepOutcome {
        match cmd {
            ControlCommand::ResetHome => {
                let event = self.engine.reset_home();
                for listener in self.listeners.iter_mut() {
                    listener.set_home();
                }
                self.finish(vec![event]);
                StepOutcome::HomeReset
            }
        }
    }

    fn handle_event(&mut self, event: SensorEvent) -> StepOutcome {
        let mut out = self.engine.process(&event);

        // Falling behind: drop every pending event rather than process stale data
        if self.events.free_slots() <= 1 {
            let flushed = self.events.drain_all();
            out.push(self.engine.record_overflow(OverflowOrigin::ConsumerFlush, flushed));
        }

        self.finish(out);
        StepOutcome::Processed
    }

    fn handle_idle(&mut self) -> StepOutcome {
        let idle_ms = self.idle_timeout.as_millis() as u64;
        match self.engine.snapshot().last_event_us {
            Some(ts) => log::debug!("{ts},online"),
            None => log::debug!("online, no events yet"),
        }
        self.finish(vec![FusionEvent::Liveness { idle_ms }]);
        StepOutcome::Idle
    }

    fn finish(&mut self, mut out: Vec<FusionEvent>) {
        let rejected = self.events.take_rejected();
        if rejected > 0 {
            out.push(self.engine.record_overflow(OverflowOrigin::ProducerDrop, rejected));
        }

        self.estimate.publish(self.engine.snapshot());

        if let Some(tx) = &self.diagnostics {
            for event in out {
                match tx.try_send(event) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => {
                        self.diagnostics = None;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Axis, SensorKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_config(capacity: usize) -> FusionConfig {
        FusionConfig {
            queue_capacity: capacity,
            idle_timeout_ms: 20,
            ..FusionConfig::default()
        }
    }

    #[test]
    fn test_processes_in_order() {
        let (mut dispatcher, tx, _control) = Dispatcher::from_config(small_config(16)).unwrap();
        tx.try_send(SensorEvent::acceleration(0, 1.0, 0.0, 0.0)).unwrap();
        tx.try_send(SensorEvent::acceleration(1_000_000, 1.0, 0.0, 0.0)).unwrap();

        assert_eq!(dispatcher.step(), StepOutcome::Processed);
        assert_eq!(dispatcher.step(), StepOutcome::Processed);

        let est = dispatcher.estimate_handle().latest();
        assert!((est.x.position - 0.5).abs() < 1e-9);
        assert!((est.x.velocity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_tick() {
        let (diag_tx, diag_rx) = channel::bounded(8);
        let (dispatcher, _tx, _control) = Dispatcher::from_config(small_config(4)).unwrap();
        let mut dispatcher = dispatcher.with_diagnostics(diag_tx);

        assert_eq!(dispatcher.step(), StepOutcome::Idle);
        assert_eq!(diag_rx.try_recv().unwrap(), FusionEvent::Liveness { idle_ms: 20 });
    }

    #[test]
    fn test_flush_drops_older_events() {
        let (diag_tx, diag_rx) = channel::bounded(32);
        let (dispatcher, tx, _control) = Dispatcher::from_config(small_config(4)).unwrap();
        let mut dispatcher = dispatcher.with_diagnostics(diag_tx);

        // Consumer stalled: four fit, two are rejected at the producer
        let accepted = (1..=6)
            .filter(|t| tx.try_send(SensorEvent::ultrasonic(*t, 0.1)).is_ok())
            .count();
        assert_eq!(accepted, 4);

        // First event processed, then the three behind it are flushed
        assert_eq!(dispatcher.step(), StepOutcome::Processed);
        let stats = dispatcher.engine().stats().clone();
        assert_eq!(stats.events_processed, 1);
        assert_eq!(stats.flushed_events, 3);
        assert_eq!(stats.producer_drops, 2);

        let overflows: Vec<FusionEvent> = diag_rx
            .try_iter()
            .filter(|e| matches!(e, FusionEvent::QueueOverflow { .. }))
            .collect();
        assert_eq!(
            overflows,
            vec![
                FusionEvent::QueueOverflow { origin: OverflowOrigin::ConsumerFlush, dropped: 3 },
                FusionEvent::QueueOverflow { origin: OverflowOrigin::ProducerDrop, dropped: 2 },
            ]
        );

        // Newer data is accepted and processed again
        tx.try_send(SensorEvent::ultrasonic(100, 0.2)).unwrap();
        assert_eq!(dispatcher.step(), StepOutcome::Processed);
        let snap = dispatcher.estimate_handle().latest();
        assert_eq!(snap.last_seen_us[SensorKind::Ultrasonic.index()], Some(100));
        assert_eq!(snap.stats.events_processed, 2);
    }

    #[test]
    fn test_reset_has_priority_and_notifies() {
        let (mut dispatcher, tx, control) = Dispatcher::from_config(small_config(16)).unwrap();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        dispatcher.add_home_listener(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tx.try_send(SensorEvent::acceleration(0, 1.0, 1.0, 1.0)).unwrap();
        tx.try_send(SensorEvent::acceleration(1_000_000, 1.0, 1.0, 1.0)).unwrap();
        dispatcher.step();
        dispatcher.step();
        assert!(dispatcher.engine().estimate(Axis::X).position > 0.0);

        tx.try_send(SensorEvent::acceleration(2_000_000, 1.0, 1.0, 1.0)).unwrap();
        assert!(control.reset_home());
        assert_eq!(dispatcher.step(), StepOutcome::HomeReset);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        let snap = dispatcher.estimate_handle().latest();
        for axis in Axis::ALL {
            assert_eq!(snap.axis(axis).position, 0.0);
            assert_eq!(snap.axis(axis).velocity, 0.0);
        }
        assert_eq!(snap.stats.home_resets, 1);

        // The queued event is still there, predicting from the kept clock
        assert_eq!(dispatcher.step(), StepOutcome::Processed);
        assert_eq!(dispatcher.engine().x_filter().last_predict_us(), 2_000_000);
    }

    #[test]
    fn test_reset_sent_while_waiting_is_handled_first() {
        let config = FusionConfig { idle_timeout_ms: 2_000, ..small_config(16) };
        let (mut dispatcher, tx, control) = Dispatcher::from_config(config).unwrap();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            assert!(control.reset_home());
            tx.try_send(SensorEvent::acceleration(0, 1.0, 1.0, 1.0)).unwrap();
            tx
        });

        assert_eq!(dispatcher.step(), StepOutcome::HomeReset);
        let _tx = sender.join().unwrap();
        assert_eq!(dispatcher.step(), StepOutcome::Processed);
    }

    #[test]
    fn test_run_stops_when_producers_leave() {
        let (dispatcher, tx, control) = Dispatcher::from_config(small_config(16)).unwrap();
        let estimate = dispatcher.estimate_handle();
        drop(control);

        let handle = dispatcher.spawn().unwrap();
        tx.try_send(SensorEvent::ultrasonic(5, 0.25)).unwrap();
        drop(tx);

        let engine = handle.join().unwrap();
        assert_eq!(engine.stats().events_processed, 1);
        assert_eq!(estimate.latest().last_event_us, Some(5));
    }
}
