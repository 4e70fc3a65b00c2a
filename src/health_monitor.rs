use crate::types::SensorKind;

/// Tracks liveness of a single sensor stream
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub kind: SensorKind,
    pub last_seen_us: Option<i64>,
    pub timed_out: bool,
    pub timeout_count: u64,
}

impl SensorHealth {
    pub fn new(kind: SensorKind) -> Self {
        SensorHealth {
            kind,
            last_seen_us: None,
            timed_out: false,
            timeout_count: 0,
        }
    }

    pub fn update(&mut self, timestamp_us: i64) {
        self.last_seen_us = Some(timestamp_us);
    }

    /// Silence relative to `now_us`; never-seen sensors count from `baseline_us`
    pub fn silence_us(&self, now_us: i64, baseline_us: i64) -> i64 {
        now_us - self.last_seen_us.unwrap_or(baseline_us)
    }
}

/// A sensor that exceeded its silence window during a check
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeoutReport {
    pub kind: SensorKind,
    pub silent_for_us: i64,
    /// True on the check that first detected the silence
    pub newly_timed_out: bool,
}

/// Per-sensor-type timeout table, checked after every processed event.
///
/// Reporting only; no fail-safe transition is triggered from here.
pub struct HealthMonitor {
    sensors: [SensorHealth; SensorKind::COUNT],
    timeout_us: i64,
    exempt: Vec<SensorKind>,
    /// First timestamp observed; baseline for sensors not seen yet
    baseline_us: Option<i64>,
}

impl HealthMonitor {
    pub fn new(timeout_us: i64, exempt: &[SensorKind]) -> Self {
        HealthMonitor {
            sensors: SensorKind::ALL.map(SensorHealth::new),
            timeout_us,
            exempt: exempt.to_vec(),
            baseline_us: None,
        }
    }

    /// Record an observation. Returns true when the sensor was timed out before.
    pub fn record(&mut self, kind: SensorKind, timestamp_us: i64) -> bool {
        self.baseline_us.get_or_insert(timestamp_us);
        let health = &mut self.sensors[kind.index()];
        health.update(timestamp_us);
        std::mem::replace(&mut health.timed_out, false)
    }

    /// Every non-exempt sensor whose last observation is older than `now_us - timeout`.
    pub fn check(&mut self, now_us: i64) -> Vec<TimeoutReport> {
        let baseline = *self.baseline_us.get_or_insert(now_us);
        let threshold = now_us.saturating_sub(self.timeout_us);
        let mut reports = Vec::new();

        for health in self.sensors.iter_mut() {
            if self.exempt.contains(&health.kind) {
                continue;
            }
            if health.last_seen_us.unwrap_or(baseline) < threshold {
                let newly_timed_out = !health.timed_out;
                if newly_timed_out {
                    health.timed_out = true;
                    health.timeout_count += 1;
                }
                reports.push(TimeoutReport {
                    kind: health.kind,
                    silent_for_us: health.silence_us(now_us, baseline),
                    newly_timed_out,
                });
            }
        }
        reports
    }

    pub fn is_exempt(&self, kind: SensorKind) -> bool {
        self.exempt.contains(&kind)
    }

    pub fn health(&self, kind: SensorKind) -> &SensorHealth {
        &self.sensors[kind.index()]
    }

    pub fn last_seen(&self) -> [Option<i64>; SensorKind::COUNT] {
        std::array::from_fn(|i| self.sensors[i].last_seen_us)
    }

    /// Format health status for logging
    pub fn format_status(&self) -> String {
        let parts: Vec<String> = self
            .sensors
            .iter()
            .map(|h| {
                let status = if self.is_exempt(h.kind) {
                    "-"
                } else if h.timed_out {
                    "⚠"
                } else {
                    "✓"
                };
                format!("{} {}", h.kind, status)
            })
            .collect();
        format!("Health: {}", parts.join(" | "))
    }
}
