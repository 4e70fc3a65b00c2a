/// Per-axis process and measurement models
///
/// State per axis: [position, velocity].
/// Process: constant acceleration driven by the measured linear acceleration `u`,
///   x' = F·x + G·u,  F = [[1, dt], [0, 1]],  G = [½dt², dt]ᵀ
/// Measurement: one row per source; each source observes either position or
/// velocity directly, so every row of H has at most a single 1.0.
use crate::config::{AxisConfig, FusionConfig};
use crate::types::{
    Axis, AxisStateMat, AxisStateVec, ControlVec, MeasurementJacobian, MeasurementNoiseMat,
    MeasurementVec, SensorKind, MEASURE_DIM_X, MEASURE_DIM_Y, MEASURE_DIM_Z,
};

/// State element a measurement source observes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateComponent {
    Position = 0,
    Velocity = 1,
}

impl StateComponent {
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementSource {
    pub kind: SensorKind,
    pub component: StateComponent,
    /// Measurement variance [unit²]; `inf` disables the channel
    pub variance: f64,
}

impl MeasurementSource {
    pub fn new(kind: SensorKind, component: StateComponent, variance: f64) -> Self {
        Self { kind, component, variance }
    }

    pub fn is_disabled(&self) -> bool {
        self.variance == f64::INFINITY
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AxisModel<const M: usize> {
    pub axis: Axis,
    pub accel_noise_floor: f64,
    pub velocity_limit: f64,
    /// Row `i` of the measurement vector belongs to `sources[i]`
    pub sources: [MeasurementSource; M],
}

impl AxisModel<MEASURE_DIM_X> {
    /// X (east): GPS longitude component only
    pub fn x_axis(config: &FusionConfig) -> Self {
        Self::new(
            Axis::X,
            &config.x_axis,
            [MeasurementSource::new(SensorKind::Position, StateComponent::Position, config.noise.gps_x)],
        )
    }
}

impl AxisModel<MEASURE_DIM_Y> {
    /// Y (north): GPS latitude component and ground speed
    pub fn y_axis(config: &FusionConfig) -> Self {
        Self::new(
            Axis::Y,
            &config.y_axis,
            [
                MeasurementSource::new(SensorKind::Position, StateComponent::Position, config.noise.gps_y),
                MeasurementSource::new(
                    SensorKind::GroundSpeed,
                    StateComponent::Velocity,
                    config.noise.ground_speed_y,
                ),
            ],
        )
    }
}

impl AxisModel<MEASURE_DIM_Z> {
    /// Z (up): ultrasonic range, barometric altitude, GPS altitude
    pub fn z_axis(config: &FusionConfig) -> Self {
        Self::new(
            Axis::Z,
            &config.z_axis,
            [
                MeasurementSource::new(SensorKind::Ultrasonic, StateComponent::Position, config.noise.ultrasonic),
                MeasurementSource::new(SensorKind::Altimeter, StateComponent::Position, config.noise.barometer),
                MeasurementSource::new(SensorKind::Position, StateComponent::Position, config.noise.gps_z),
            ],
        )
    }
}

impl<const M: usize> AxisModel<M> {
    pub fn new(axis: Axis, config: &AxisConfig, sources: [MeasurementSource; M]) -> Self {
        Self {
            axis,
            accel_noise_floor: config.accel_noise_floor,
            velocity_limit: config.velocity_limit,
            sources,
        }
    }

    /// Measurement row of `kind`, if this axis models it
    pub fn slot(&self, kind: SensorKind) -> Option<usize> {
        self.sources.iter().position(|s| s.kind == kind)
    }

    pub fn source(&self, slot: usize) -> MeasurementSource {
        self.sources[slot]
    }

    /// Transition with Jacobian. The predicted velocity is clamped to ±velocity_limit.
    pub fn transition(&self, x: &AxisStateVec, u: f64, dt: f64) -> (AxisStateVec, AxisStateMat) {
        let f = AxisStateMat::new(1.0, dt, 0.0, 1.0);
        let g = ControlVec::new(0.5 * dt * dt, dt);

        let mut xp = f * x + g * u;
        let limit = self.velocity_limit;
        if xp[1] > limit {
            xp[1] = limit;
        } else if xp[1] < -limit {
            xp[1] = -limit;
        }
        (xp, f)
    }

    /// Discretized white-noise-acceleration covariance with sigma = |u| + floor
    pub fn process_noise(&self, u: f64, dt: f64) -> AxisStateMat {
        let sigma = u.abs() + self.accel_noise_floor;
        let var = sigma * sigma;
        let dt2 = dt * dt;
        let q_pos = 0.25 * var * dt2 * dt2;
        let q_cross = 0.5 * var * dt2 * dt;
        let q_vel = var * dt2;
        AxisStateMat::new(q_pos, q_cross, q_cross, q_vel)
    }

    /// Predicted measurement `zp = H·x` and its Jacobian for the active row `slot`
    pub fn measurement(&self, slot: usize, x: &AxisStateVec) -> (MeasurementVec<M>, MeasurementJacobian<M>) {
        let mut h = MeasurementJacobian::<M>::zeros();
        h[(slot, self.sources[slot].component.index())] = 1.0;
        (h * x, h)
    }

    /// Diagonal R with the variance of `slot` and zeros elsewhere
    pub fn measurement_noise(&self, slot: usize) -> MeasurementNoiseMat<M> {
        let mut r = MeasurementNoiseMat::<M>::zeros();
        r[(slot, slot)] = self.sources[slot].variance;
        r
    }
}
