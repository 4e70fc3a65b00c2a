// fusion_engine.rs: pure computation layer of the estimator
//
// Nothing in here knows about threads, queues or clocks. Events go in, the three
// axis filters are predicted/corrected, diagnostics come out. The dispatcher is the
// only caller in production; tests drive it directly with synthetic streams.

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::error::{FilterStep, FusionError, FusionResult};
use crate::filters::axis_ekf::{AxisEstimate, AxisFilter};
use crate::filters::axis_model::AxisModel;
use crate::health_monitor::HealthMonitor;
use crate::types::{
    Axis, Quaternion, SensorEvent, SensorKind, SensorPayload, MEASURE_DIM_X, MEASURE_DIM_Y,
    MEASURE_DIM_Z,
};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowOrigin {
    /// Producer found the queue full and dropped its event
    ProducerDrop,
    /// Consumer flushed a near-full queue
    ConsumerFlush,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FusionEvent {
    Liveness { idle_ms: u64 },
    QueueOverflow { origin: OverflowOrigin, dropped: u64 },
    SensorTimeout { kind: SensorKind, silent_for_us: i64 },
    SensorRecovered { kind: SensorKind },
    ComputationFailure(FusionError),
    HomeReset { last_event_us: Option<i64> },
}

// ─── Output snapshot ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionStats {
    pub events_processed: u64,
    pub malformed_events: u64,
    pub predictions: u64,
    pub corrections: u64,
    pub stale_dropped: u64,
    pub ignored_sources: u64,
    pub computation_failures: u64,
    pub producer_drops: u64,
    pub queue_flushes: u64,
    pub flushed_events: u64,
    pub sensor_timeouts: u64,
    pub home_resets: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationFix {
    pub timestamp_us: i64,
    pub orientation: Quaternion,
    pub accuracy: f64,
}

/// Canonical fused output
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionSnapshot {
    pub x: AxisEstimate,
    pub y: AxisEstimate,
    pub z: AxisEstimate,
    /// Recorded only; not fused
    pub orientation: Option<OrientationFix>,
    pub last_event_us: Option<i64>,
    /// Indexed by `SensorKind::index()`
    pub last_seen_us: [Option<i64>; SensorKind::COUNT],
    pub stats: FusionStats,
}

impl FusionSnapshot {
    pub fn axis(&self, axis: Axis) -> &AxisEstimate {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

// ─── The engine ──────────────────────────────────────────────────────────────

pub struct FusionEngine {
    config: FusionConfig,

    x: AxisFilter<MEASURE_DIM_X>,
    y: AxisFilter<MEASURE_DIM_Y>,
    z: AxisFilter<MEASURE_DIM_Z>,

    health: HealthMonitor,
    orientation: Option<OrientationFix>,
    last_event_us: Option<i64>,
    stats: FusionStats,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> FusionResult<Self> {
        config.validate()?;
        let symmetrize = config.symmetrize_covariance;
        Ok(Self {
            x: AxisFilter::new(AxisModel::x_axis(&config), symmetrize),
            y: AxisFilter::new(AxisModel::y_axis(&config), symmetrize),
            z: AxisFilter::new(AxisModel::z_axis(&config), symmetrize),
            health: HealthMonitor::new(config.sensor_timeout_us(), &config.timeout_exempt),
            orientation: None,
            last_event_us: None,
            stats: FusionStats::default(),
            config,
        })
    }

    // ── Event handling ───────────────────────────────────────────────────

    /// Route one event to the axis filters, then update liveness.
    pub fn process(&mut self, event: &SensorEvent) -> Vec<FusionEvent> {
        let mut events = Vec::new();
        let ts = event.timestamp_us;
        log::trace!("{}", event.trace_line());

        // Each stream must be non-decreasing in time
        if let Some(last_seen) = self.health.health(event.kind).last_seen_us {
            if ts < last_seen {
                self.stats.stale_dropped += 1;
                log::trace!("stale {} event at {ts}µs, last seen {last_seen}µs", event.kind);
                return events;
            }
        }

        match (event.kind, event.payload) {
            (SensorKind::Acceleration, SensorPayload::Vector(u)) => {
                let results = [
                    self.x.predict(u.x, ts),
                    self.y.predict(u.y, ts),
                    self.z.predict(u.z, ts),
                ];
                self.absorb(results, FilterStep::Predict, &mut events);
                self.log_axes(&Axis::ALL);
            }
            (SensorKind::Position | SensorKind::GroundSpeed, SensorPayload::Vector(v)) => {
                let results = [
                    self.x.correct(event.kind, v.x),
                    self.y.correct(event.kind, v.y),
                    self.z.correct(event.kind, v.z),
                ];
                self.absorb(results, FilterStep::Correct, &mut events);
                self.log_axes(&Axis::ALL);
            }
            (SensorKind::Altimeter | SensorKind::Ultrasonic, SensorPayload::Distance(d)) => {
                let result = self.z.correct(event.kind, d);
                self.absorb([result], FilterStep::Correct, &mut events);
                self.log_axes(&[Axis::Z]);
            }
            (SensorKind::Orientation, SensorPayload::Orientation(q)) => {
                self.orientation = Some(OrientationFix {
                    timestamp_us: ts,
                    orientation: q,
                    accuracy: event.accuracy,
                });
            }
            (kind, payload) => {
                log::warn!("Dropping {kind} event with mismatched payload {payload:?}");
                self.stats.malformed_events += 1;
                return events;
            }
        }

        self.stats.events_processed += 1;
        self.last_event_us = Some(self.last_event_us.map_or(ts, |last| last.max(ts)));

        if self.health.record(event.kind, ts) {
            log::info!("Sensor {} reporting again", event.kind);
            events.push(FusionEvent::SensorRecovered { kind: event.kind });
        }

        for report in self.health.check(ts) {
            if report.newly_timed_out {
                self.stats.sensor_timeouts += 1;
                log::warn!(
                    "Timeout of sensor {} (silent {:.1}s)",
                    report.kind,
                    report.silent_for_us as f64 * 1e-6
                );
            }
            events.push(FusionEvent::SensorTimeout {
                kind: report.kind,
                silent_for_us: report.silent_for_us,
            });
        }

        events
    }

    /// Tare: zero every axis and restore the home prior.
    pub fn reset_home(&mut self) -> FusionEvent {
        self.x.reset();
        self.y.reset();
        self.z.reset();
        self.stats.home_resets += 1;
        log::info!("Home reset at {:?}µs", self.last_event_us);
        FusionEvent::HomeReset { last_event_us: self.last_event_us }
    }

    /// Account for events lost to queue pressure.
    pub fn record_overflow(&mut self, origin: OverflowOrigin, dropped: u64) -> FusionEvent {
        match origin {
            OverflowOrigin::ProducerDrop => {
                self.stats.producer_drops += dropped;
                log::warn!("Event queue full, producers dropped {dropped} event(s)");
            }
            OverflowOrigin::ConsumerFlush => {
                self.stats.queue_flushes += 1;
                self.stats.flushed_events += dropped;
                log::warn!("Event queue reset, flushed {dropped} pending event(s)");
            }
        }
        FusionEvent::QueueOverflow { origin, dropped }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> FusionSnapshot {
        FusionSnapshot {
            x: self.x.estimate(),
            y: self.y.estimate(),
            z: self.z.estimate(),
            orientation: self.orientation,
            last_event_us: self.last_event_us,
            last_seen_us: self.health.last_seen(),
            stats: self.stats.clone(),
        }
    }

    pub fn estimate(&self, axis: Axis) -> AxisEstimate {
        match axis {
            Axis::X => self.x.estimate(),
            Axis::Y => self.y.estimate(),
            Axis::Z => self.z.estimate(),
        }
    }

    pub fn x_filter(&self) -> &AxisFilter<MEASURE_DIM_X> {
        &self.x
    }

    pub fn y_filter(&self) -> &AxisFilter<MEASURE_DIM_Y> {
        &self.y
    }

    pub fn z_filter(&self) -> &AxisFilter<MEASURE_DIM_Z> {
        &self.z
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn stats(&self) -> &FusionStats {
        &self.stats
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn absorb<const N: usize>(
        &mut self,
        results: [FusionResult<()>; N],
        step: FilterStep,
        events: &mut Vec<FusionEvent>,
    ) {
        for result in results {
            match result {
                Ok(()) => match step {
                    FilterStep::Predict => self.stats.predictions += 1,
                    FilterStep::Correct => self.stats.corrections += 1,
                },
                Err(err) if err.is_silent() => {
                    if matches!(err, FusionError::StaleInput { .. }) {
                        self.stats.stale_dropped += 1;
                    } else {
                        self.stats.ignored_sources += 1;
                    }
                    log::trace!("{err}");
                }
                Err(err) => {
                    self.stats.computation_failures += 1;
                    log::error!("{err}");
                    events.push(FusionEvent::ComputationFailure(err));
                }
            }
        }
    }

    fn log_axes(&self, axes: &[Axis]) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for &axis in axes {
            let est = self.estimate(axis);
            log::debug!("F{},{:.4},{:.4}", axis, est.position, est.velocity);
        }
    }
}
