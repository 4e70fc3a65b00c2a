//! Position/velocity estimation core for a small flight controller.
//!
//! Three independent per-axis Kalman filters fed from one bounded event queue:
//! acceleration drives prediction, GPS, ground speed, ultrasonic range and
//! barometric altitude drive correction.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filters;
pub mod fusion_engine;
pub mod health_monitor;
pub mod queue;
pub mod types;

pub use config::FusionConfig;
pub use dispatcher::{ControlHandle, Dispatcher, EstimateHandle, HomeListener, StepOutcome};
pub use error::{FusionError, FusionResult};
pub use fusion_engine::{FusionEngine, FusionEvent, FusionSnapshot, FusionStats, OverflowOrigin};
pub use queue::{event_queue, EnqueueError, EventReceiver, EventSender};
pub use types::{Axis, SensorEvent, SensorKind};
