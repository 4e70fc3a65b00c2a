//! Linear algebra type system for the axis filters
//!
//! Every matrix in the fusion core is at most 3×3, so all of them are
//! stack-allocated `SMatrix` values with compile-time dimensions.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const AXIS_STATE_DIM: usize = 2; // (position, velocity)

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_X: usize = 1; // GPS lon
pub const MEASURE_DIM_Y: usize = 2; // GPS lat, ground speed lat
pub const MEASURE_DIM_Z: usize = 3; // ultrasonic, barometer, GPS altitude

// ===== Axis State Types =====
pub type AxisStateVec = SVector<f64, AXIS_STATE_DIM>;
pub type AxisStateMat = SMatrix<f64, AXIS_STATE_DIM, AXIS_STATE_DIM>;

/// Control matrix G for the acceleration input (2×1)
pub type ControlVec = SVector<f64, AXIS_STATE_DIM>;

// ===== Measurement Types (generic over row count) =====
pub type MeasurementVec<const M: usize> = SVector<f64, M>;
pub type MeasurementNoiseMat<const M: usize> = SMatrix<f64, M, M>;

// Measurement Jacobian H (M×2) and Kalman gain K (2×M)
pub type MeasurementJacobian<const M: usize> = SMatrix<f64, M, AXIS_STATE_DIM>;
pub type KalmanGain<const M: usize> = SMatrix<f64, AXIS_STATE_DIM, M>;
