use std::f64::consts::PI;
use std::time::Instant;

use flight_fusion_rs::queue::{EnqueueError, EventSender};
use flight_fusion_rs::types::{Quaternion, SensorEvent, SensorKind, Vec3};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Sample rate of each simulated sensor [Hz]
pub const DEMO_RATES: [(SensorKind, u64); 6] = [
    (SensorKind::Acceleration, 100),
    (SensorKind::Orientation, 50),
    (SensorKind::Ultrasonic, 20),
    (SensorKind::Altimeter, 10),
    (SensorKind::Position, 1),
    (SensorKind::GroundSpeed, 1),
];

/// Synthetic flight: a slow horizontal circle while climbing to hover height.
///
/// All producers share one monotonic origin so timestamps are comparable.
#[derive(Clone, Copy, Debug)]
pub struct MockFlight {
    origin: Instant,
    radius_m: f64,
    lap_s: f64,
    hover_m: f64,
    climb_s: f64,
}

impl MockFlight {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            radius_m: 5.0,
            lap_s: 20.0,
            hover_m: 1.2,
            climb_s: 8.0,
        }
    }

    pub fn now_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }

    /// Position, velocity and acceleration at `t` seconds
    fn kinematics(&self, t: f64) -> (Vec3, Vec3, Vec3) {
        let w = 2.0 * PI / self.lap_s;
        let (s, c) = (w * t).sin_cos();
        let r = self.radius_m;

        let wz = 2.0 * PI / self.climb_s;
        let (z, vz, az) = if t < self.climb_s / 2.0 {
            let (sz, cz) = (wz * t).sin_cos();
            (
                0.5 * self.hover_m * (1.0 - cz),
                0.5 * self.hover_m * wz * sz,
                0.5 * self.hover_m * wz * wz * cz,
            )
        } else {
            (self.hover_m, 0.0, 0.0)
        };

        (
            Vec3::new(r * c - r, r * s, z),
            Vec3::new(-r * w * s, r * w * c, vz),
            Vec3::new(-r * w * w * c, -r * w * w * s, az),
        )
    }

    pub fn sample(&self, kind: SensorKind, timestamp_us: i64) -> SensorEvent {
        let t = timestamp_us as f64 * 1e-6;
        let (pos, vel, acc) = self.kinematics(t);
        // Deterministic wobble standing in for sensor noise
        let jitter = |scale: f64, freq: f64| scale * (t * freq).sin();

        match kind {
            SensorKind::Acceleration => SensorEvent::acceleration(
                timestamp_us,
                acc.x + jitter(0.05, 31.0),
                acc.y + jitter(0.05, 37.0),
                acc.z + jitter(0.05, 41.0),
            ),
            SensorKind::Orientation => {
                let yaw = 2.0 * PI * t / self.lap_s + PI / 2.0;
                let q = Quaternion { i: 0.0, j: 0.0, k: (0.5 * yaw).sin(), real: (0.5 * yaw).cos() };
                SensorEvent::orientation(timestamp_us, q, 0.02)
            }
            SensorKind::Ultrasonic => SensorEvent::ultrasonic(timestamp_us, pos.z + jitter(0.002, 53.0)),
            SensorKind::Altimeter => SensorEvent::altimeter(timestamp_us, pos.z + jitter(0.3, 3.0), 0.5),
            SensorKind::Position => SensorEvent::position(
                timestamp_us,
                pos.x + jitter(1.0, 0.7),
                pos.y + jitter(1.0, 0.9),
                pos.z + jitter(2.0, 0.5),
                2.0,
            ),
            SensorKind::GroundSpeed => {
                SensorEvent::ground_speed(timestamp_us, vel.x, vel.y + jitter(0.2, 1.3), 0.5)
            }
        }
    }
}

impl Default for MockFlight {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn sensor_loop(kind: SensorKind, rate_hz: u64, flight: MockFlight, tx: EventSender) {
    let mut interval = interval(Duration::from_micros(1_000_000 / rate_hz.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sample_count = 0u64;
    let mut dropped = 0u64;

    loop {
        interval.tick().await;

        let event = flight.sample(kind, flight.now_us());
        match tx.try_send(event) {
            Ok(()) => {
                sample_count += 1;
                if sample_count % 500 == 0 {
                    log::debug!("[{kind}] {sample_count} samples");
                }
            }
            Err(EnqueueError::Closed) => {
                log::info!("[{kind}] Queue closed after {sample_count} samples");
                break;
            }
            Err(EnqueueError::Full) => {
                // Queue full, drop this sample
                dropped += 1;
                if dropped % 100 == 1 {
                    log::warn!("[{kind}] queue full, {dropped} samples dropped so far");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flight_fusion_rs::types::SensorPayload;

    #[test]
    fn test_mock_starts_at_home() {
        let flight = MockFlight::new();
        let event = flight.sample(SensorKind::Position, 0);
        match event.payload {
            SensorPayload::Vector(p) => {
                assert!(p.x.abs() < 1e-9);
                assert!(p.z.abs() < 1e-9);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_mock_payload_shapes() {
        let flight = MockFlight::new();
        for (kind, _) in DEMO_RATES {
            let event = flight.sample(kind, 1_234_567);
            assert_eq!(event.kind, kind);
            let scalar = matches!(event.payload, SensorPayload::Distance(_));
            assert_eq!(scalar, matches!(kind, SensorKind::Ultrasonic | SensorKind::Altimeter));
        }
    }

    #[test]
    fn test_mock_hovers_after_climb() {
        let flight = MockFlight::new();
        let event = flight.sample(SensorKind::Ultrasonic, 30_000_000);
        match event.payload {
            SensorPayload::Distance(d) => assert!((d - 1.2).abs() < 0.01),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
