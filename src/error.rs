use thiserror::Error;

use crate::types::{Axis, SensorKind};

/// Filter step that produced a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStep {
    Predict,
    Correct,
}

impl std::fmt::Display for FilterStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterStep::Predict => f.write_str("predict"),
            FilterStep::Correct => f.write_str("correct"),
        }
    }
}

/// Fusion core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("stale input on {axis} axis: {timestamp_us}µs precedes last predict at {last_predict_us}µs")]
    StaleInput {
        axis: Axis,
        timestamp_us: i64,
        last_predict_us: i64,
    },

    #[error("{kind} is not a measurement source of the {axis} axis")]
    UnrecognizedSource { axis: Axis, kind: SensorKind },

    #[error("{step} failed on {axis} axis: {reason}")]
    ComputationFailure {
        axis: Axis,
        step: FilterStep,
        reason: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FusionError {
    /// Errors that are part of normal operation and must not be reported.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            FusionError::StaleInput { .. } | FusionError::UnrecognizedSource { .. }
        )
    }
}

pub type FusionResult<T> = Result<T, FusionError>;
