pub mod axis_ekf;
pub mod axis_model;

pub use axis_ekf::{AxisEstimate, AxisFilter};
pub use axis_model::{AxisModel, MeasurementSource, StateComponent};
