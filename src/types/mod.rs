pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor stream an event originates from.
///
/// The discriminant doubles as the index into per-type tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Acceleration = 0,
    Orientation = 1,
    Altimeter = 2,
    Ultrasonic = 3,
    Position = 4,
    GroundSpeed = 5,
}

impl SensorKind {
    pub const COUNT: usize = 6;

    pub const ALL: [SensorKind; SensorKind::COUNT] = [
        SensorKind::Acceleration,
        SensorKind::Orientation,
        SensorKind::Altimeter,
        SensorKind::Ultrasonic,
        SensorKind::Position,
        SensorKind::GroundSpeed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// One-letter tag used in the per-event trace log.
    pub fn tag(self) -> char {
        match self {
            SensorKind::Acceleration => 'A',
            SensorKind::Orientation => 'O',
            SensorKind::Altimeter => 'B',
            SensorKind::Ultrasonic => 'U',
            SensorKind::Position => 'P',
            SensorKind::GroundSpeed => 'S',
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Acceleration => "acceleration",
            SensorKind::Orientation => "orientation",
            SensorKind::Altimeter => "altimeter",
            SensorKind::Ultrasonic => "ultrasonic",
            SensorKind::Position => "position",
            SensorKind::GroundSpeed => "ground_speed",
        };
        f.write_str(name)
    }
}

/// Spatial axis of the local ENU-like frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x"),
            Axis::Y => f.write_str("y"),
            Axis::Z => f.write_str("z"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn component(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub i: f64,
    pub j: f64,
    pub k: f64,
    pub real: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self { i: 0.0, j: 0.0, k: 0.0, real: 1.0 }
    }
}

/// Measured quantity carried by an event. Which variant is valid depends on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorPayload {
    Vector(Vec3),
    Distance(f64),
    Orientation(Quaternion),
}

/// One normalized observation from a sensor driver (SI units, ENU axes).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub kind: SensorKind,
    /// Monotonic clock [µs]
    pub timestamp_us: i64,
    pub payload: SensorPayload,
    #[serde(default)]
    pub accuracy: f64,
}

impl SensorEvent {
    pub fn acceleration(timestamp_us: i64, x: f64, y: f64, z: f64) -> Self {
        Self::vector(SensorKind::Acceleration, timestamp_us, Vec3::new(x, y, z), 0.0)
    }

    pub fn position(timestamp_us: i64, x: f64, y: f64, z: f64, accuracy: f64) -> Self {
        Self::vector(SensorKind::Position, timestamp_us, Vec3::new(x, y, z), accuracy)
    }

    pub fn ground_speed(timestamp_us: i64, x: f64, y: f64, accuracy: f64) -> Self {
        Self::vector(SensorKind::GroundSpeed, timestamp_us, Vec3::new(x, y, 0.0), accuracy)
    }

    pub fn ultrasonic(timestamp_us: i64, distance: f64) -> Self {
        Self {
            kind: SensorKind::Ultrasonic,
            timestamp_us,
            payload: SensorPayload::Distance(distance),
            accuracy: 0.0,
        }
    }

    pub fn altimeter(timestamp_us: i64, altitude: f64, accuracy: f64) -> Self {
        Self {
            kind: SensorKind::Altimeter,
            timestamp_us,
            payload: SensorPayload::Distance(altitude),
            accuracy,
        }
    }

    pub fn orientation(timestamp_us: i64, orientation: Quaternion, accuracy: f64) -> Self {
        Self {
            kind: SensorKind::Orientation,
            timestamp_us,
            payload: SensorPayload::Orientation(orientation),
            accuracy,
        }
    }

    pub fn vector(kind: SensorKind, timestamp_us: i64, vector: Vec3, accuracy: f64) -> Self {
        Self { kind, timestamp_us, payload: SensorPayload::Vector(vector), accuracy }
    }

    /// CSV-like line for the trace log: `<ts>,<tag>,<values...>,<accuracy>`
    pub fn trace_line(&self) -> String {
        match self.payload {
            SensorPayload::Vector(v) => format!(
                "{},{},{:.4},{:.4},{:.4},{:.3}",
                self.timestamp_us,
                self.kind.tag(),
                v.x,
                v.y,
                v.z,
                self.accuracy
            ),
            SensorPayload::Distance(d) => format!(
                "{},{},{:.4},{:.3}",
                self.timestamp_us,
                self.kind.tag(),
                d,
                self.accuracy
            ),
            SensorPayload::Orientation(q) => format!(
                "{},{},{:.4},{:.4},{:.4},{:.4},{:.3}",
                self.timestamp_us,
                self.kind.tag(),
                q.i,
                q.j,
                q.k,
                q.real,
                self.accuracy
            ),
        }
    }
}
