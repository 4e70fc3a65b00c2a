/// 2-State Extended Kalman Filter for one spatial axis
///
/// State Vector (2D):
/// [0]: Position along the axis (meters, relative to home)
/// [1]: Velocity along the axis (m/s)
///
/// Predict is driven by the axis component of linear acceleration.
/// Correct is "lazy": the scratch measurement vector keeps the last value of every
/// source, but H and R only carry information on the row that was just updated,
/// so slow sources are fused independently of fast ones.
use serde::{Deserialize, Serialize};

use crate::error::{FilterStep, FusionError, FusionResult};
use crate::filters::axis_model::AxisModel;
use crate::types::{AxisStateMat, AxisStateVec, MeasurementVec, SensorKind};

/// Read-only view of one axis, published to navigation and telemetry consumers
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisEstimate {
    /// Position relative to home [m]
    pub position: f64,
    /// Velocity [m/s]
    pub velocity: f64,
    /// Row-major [[P00, P01], [P10, P11]]
    pub covariance: [[f64; 2]; 2],
    /// Timestamp of the last accepted predict step [µs]
    pub last_predict_us: i64,
}

impl AxisEstimate {
    /// 1-sigma position uncertainty [m]
    pub fn position_sigma(&self) -> f64 {
        self.covariance[0][0].max(0.0).sqrt()
    }
}

pub struct AxisFilter<const M: usize> {
    model: AxisModel<M>,

    /// [position, velocity]
    state: AxisStateVec,

    /// 2×2 estimate covariance
    covariance: AxisStateMat,

    /// Last value seen from each measurement source
    measurement: MeasurementVec<M>,

    last_predict_us: i64,

    symmetrize: bool,
}

impl<const M: usize> AxisFilter<M> {
    pub fn new(model: AxisModel<M>, symmetrize: bool) -> Self {
        Self {
            model,
            state: AxisStateVec::zeros(),
            covariance: Self::home_covariance(),
            measurement: MeasurementVec::<M>::zeros(),
            last_predict_us: 0,
            symmetrize,
        }
    }

    /// Seed a prior other than the home prior
    pub fn with_prior(mut self, state: AxisStateVec, covariance: AxisStateMat) -> Self {
        self.state = state;
        self.covariance = covariance;
        self
    }

    /// Home prior: known position, unit velocity uncertainty
    fn home_covariance() -> AxisStateMat {
        AxisStateMat::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Zero state and scratch, restore the home prior.
    ///
    /// `last_predict_us` is kept so the next acceleration sample integrates
    /// only the time since the previous one.
    pub fn reset(&mut self) {
        self.state = AxisStateVec::zeros();
        self.covariance = Self::home_covariance();
        self.measurement = MeasurementVec::<M>::zeros();
        log::debug!("fuse{} reset", self.model.axis);
    }

    /// Predict with the axis component `u` of linear acceleration measured at `timestamp_us`.
    ///
    /// Out-of-order samples are rejected with `StaleInput` and leave the filter untouched.
    pub fn predict(&mut self, u: f64, timestamp_us: i64) -> FusionResult<()> {
        let elapsed_us = timestamp_us - self.last_predict_us;
        if elapsed_us < 0 {
            return Err(FusionError::StaleInput {
                axis: self.model.axis,
                timestamp_us,
                last_predict_us: self.last_predict_us,
            });
        }
        let dt = elapsed_us as f64 * 1e-6;

        let (xp, f) = self.model.transition(&self.state, u, dt);
        let q = self.model.process_noise(u, dt);
        let pp = f * self.covariance * f.transpose() + q;

        if !is_finite(xp.as_slice()) || !is_finite(pp.as_slice()) {
            return Err(self.failure(FilterStep::Predict, "non-finite prediction"));
        }

        self.state = xp;
        self.covariance = self.finish_covariance(pp);
        self.last_predict_us = timestamp_us;
        Ok(())
    }

    /// Correct with a scalar reading from `kind`.
    pub fn correct(&mut self, kind: SensorKind, value: f64) -> FusionResult<()> {
        let slot = self
            .model
            .slot(kind)
            .ok_or(FusionError::UnrecognizedSource { axis: self.model.axis, kind })?;
        if !value.is_finite() {
            return Err(self.failure(FilterStep::Correct, "non-finite measurement"));
        }

        let mut z = self.measurement;
        z[slot] = value;

        let source = self.model.source(slot);
        if source.is_disabled() {
            // Remembered, but carries no information
            self.measurement = z;
            return Ok(());
        }

        let (zp, h) = self.model.measurement(slot, &self.state);
        let r = self.model.measurement_noise(slot);

        // Rows other than `slot` have zero H and R: mask their innovation and give
        // them a unit diagonal so S stays invertible. Their gain columns come out zero.
        let mut innovation = z - zp;
        let mut s = h * self.covariance * h.transpose() + r;
        for row in 0..M {
            if row != slot {
                innovation[row] = 0.0;
                s[(row, row)] = 1.0;
            }
        }

        let s_inv = s
            .try_inverse()
            .ok_or_else(|| self.failure(FilterStep::Correct, "singular innovation covariance"))?;
        let k = self.covariance * h.transpose() * s_inv;

        let x_new = self.state + k * innovation;
        let p_new = (AxisStateMat::identity() - k * h) * self.covariance;

        if !is_finite(x_new.as_slice()) || !is_finite(p_new.as_slice()) {
            return Err(self.failure(FilterStep::Correct, "non-finite correction"));
        }

        self.measurement = z;
        self.state = x_new;
        self.covariance = self.finish_covariance(p_new);
        Ok(())
    }

    fn finish_covariance(&self, p: AxisStateMat) -> AxisStateMat {
        if self.symmetrize {
            (p + p.transpose()) * 0.5
        } else {
            p
        }
    }

    fn failure(&self, step: FilterStep, reason: &'static str) -> FusionError {
        FusionError::ComputationFailure { axis: self.model.axis, step, reason }
    }

    pub fn state(&self) -> &AxisStateVec {
        &self.state
    }

    pub fn covariance(&self) -> &AxisStateMat {
        &self.covariance
    }

    pub fn measurement(&self) -> &MeasurementVec<M> {
        &self.measurement
    }

    pub fn last_predict_us(&self) -> i64 {
        self.last_predict_us
    }

    pub fn estimate(&self) -> AxisEstimate {
        let p = &self.covariance;
        AxisEstimate {
            position: self.state[0],
            velocity: self.state[1],
            covariance: [[p[(0, 0)], p[(0, 1)]], [p[(1, 0)], p[(1, 1)]]],
            last_predict_us: self.last_predict_us,
        }
    }
}

fn is_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FusionConfig;
    use crate::types::Axis;
    use approx::assert_abs_diff_eq;

    fn x_filter() -> AxisFilter<1> {
        AxisFilter::new(AxisModel::x_axis(&FusionConfig::default()), true)
    }

    fn z_filter(config: &FusionConfig) -> AxisFilter<3> {
        AxisFilter::new(AxisModel::z_axis(config), true)
    }

    #[test]
    fn test_starts_at_home_prior() {
        let filter = x_filter();
        let est = filter.estimate();
        assert_eq!(est.position, 0.0);
        assert_eq!(est.velocity, 0.0);
        assert_eq!(est.covariance, [[0.0, 0.0], [0.0, 1.0]]);
        assert_eq!(est.last_predict_us, 0);
    }

    #[test]
    fn test_zero_acceleration_coasts() {
        let mut filter = x_filter().with_prior(AxisStateVec::new(2.0, 1.5), AxisStateMat::identity());
        filter.predict(0.0, 0).unwrap();

        for step in 1..=10 {
            let t = step * 250_000;
            let before = *filter.state();
            filter.predict(0.0, t).unwrap();
            assert_abs_diff_eq!(filter.state()[1], before[1], epsilon = 1e-12);
            assert_abs_diff_eq!(filter.state()[0], before[0] + before[1] * 0.25, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(filter.state()[0], 2.0 + 1.5 * 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_stale_predict_is_idempotent() {
        let mut filter = x_filter();
        filter.predict(1.0, 0).unwrap();
        filter.predict(1.0, 500_000).unwrap();
        let state = *filter.state();
        let cov = *filter.covariance();

        let err = filter.predict(3.0, 499_999).unwrap_err();
        assert!(matches!(err, FusionError::StaleInput { axis: Axis::X, .. }));
        assert_eq!(*filter.state(), state);
        assert_eq!(*filter.covariance(), cov);
        assert_eq!(filter.last_predict_us(), 500_000);
    }

    #[test]
    fn test_duplicate_timestamp_is_zero_dt() {
        let mut filter = x_filter();
        filter.predict(1.0, 100).unwrap();
        let state = *filter.state();
        filter.predict(5.0, 100).unwrap();
        assert_eq!(*filter.state(), state);
    }

    #[test]
    fn test_velocity_clamp_is_exact() {
        let config = FusionConfig::default();
        let limit = config.z_axis.velocity_limit;
        let mut filter = z_filter(&config);
        filter.predict(0.0, 0).unwrap();
        filter.predict(50.0, 1_000_000).unwrap();
        assert_eq!(filter.state()[1], limit);
        filter.predict(-500.0, 2_000_000).unwrap();
        assert_eq!(filter.state()[1], -limit);
    }

    #[test]
    fn test_predict_grows_uncertainty() {
        let mut filter = x_filter();
        filter.predict(0.0, 0).unwrap();
        filter.predict(0.0, 1_000_000).unwrap();
        let p = filter.covariance();
        // P00 = dt²·P11 + Q00
        assert!(p[(0, 0)] > 1.0);
        assert!(p[(1, 1)] > 1.0);
        assert_eq!(p[(0, 1)], p[(1, 0)]);
    }

    #[test]
    fn test_ultrasonic_pulls_altitude() {
        let mut config = FusionConfig::default();
        config.noise.ultrasonic = 1e-9;
        let mut filter = z_filter(&config).with_prior(AxisStateVec::zeros(), AxisStateMat::identity());

        filter.correct(SensorKind::Ultrasonic, 0.8).unwrap();
        assert_abs_diff_eq!(filter.state()[0], 0.8, epsilon = 1e-6);
        assert!(filter.covariance()[(0, 0)] < 1e-6);
        assert_eq!(filter.measurement()[0], 0.8);
    }

    #[test]
    fn test_disabled_channel_keeps_estimate() {
        let mut config = FusionConfig::default();
        config.noise.ultrasonic = f64::INFINITY;
        let mut filter = z_filter(&config).with_prior(AxisStateVec::new(0.2, 0.0), AxisStateMat::identity());

        filter.correct(SensorKind::Ultrasonic, 5.0).unwrap();
        assert_eq!(filter.state()[0], 0.2);
        assert_eq!(*filter.covariance(), AxisStateMat::identity());
        assert_eq!(filter.measurement()[0], 5.0);
    }

    #[test]
    fn test_lazy_correction_keeps_other_slots() {
        let config = FusionConfig::default();
        let mut filter = z_filter(&config).with_prior(AxisStateVec::zeros(), AxisStateMat::identity());

        filter.correct(SensorKind::Altimeter, 1.2).unwrap();
        filter.correct(SensorKind::Ultrasonic, 1.0).unwrap();
        assert_eq!(filter.measurement()[0], 1.0);
        assert_eq!(filter.measurement()[1], 1.2);
        assert_eq!(filter.measurement()[2], 0.0);
        // Ultrasonic is far more trusted than the barometer
        assert_abs_diff_eq!(filter.state()[0], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_ground_speed_corrects_velocity() {
        let config = FusionConfig::default();
        let mut filter = AxisFilter::new(AxisModel::y_axis(&config), true)
            .with_prior(AxisStateVec::zeros(), AxisStateMat::identity());

        filter.correct(SensorKind::GroundSpeed, 2.0).unwrap();
        let expected = 2.0 / (1.0 + config.noise.ground_speed_y);
        assert_abs_diff_eq!(filter.state()[1], expected, epsilon = 1e-12);
        assert_eq!(filter.state()[0], 0.0);
    }

    #[test]
    fn test_unrecognized_source_is_noop() {
        let mut filter = x_filter();
        let err = filter.correct(SensorKind::Ultrasonic, 3.0).unwrap_err();
        assert_eq!(err, FusionError::UnrecognizedSource { axis: Axis::X, kind: SensorKind::Ultrasonic });
        assert_eq!(filter.state()[0], 0.0);
    }

    #[test]
    fn test_singular_innovation_preserves_state() {
        let mut config = FusionConfig::default();
        config.noise.gps_x = 0.0;
        let mut filter = AxisFilter::new(AxisModel::x_axis(&config), true);

        // Home prior has P00 = 0 and R = 0, so S = 0
        let err = filter.correct(SensorKind::Position, 4.0).unwrap_err();
        assert!(matches!(err, FusionError::ComputationFailure { step: FilterStep::Correct, .. }));
        assert_eq!(filter.state()[0], 0.0);
        assert_eq!(filter.measurement()[0], 0.0);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut filter = x_filter();
        assert!(matches!(
            filter.predict(f64::NAN, 10),
            Err(FusionError::ComputationFailure { step: FilterStep::Predict, .. })
        ));
        assert_eq!(filter.last_predict_us(), 0);
        assert!(filter.correct(SensorKind::Position, f64::INFINITY).is_err());
    }

    #[test]
    fn test_reset_keeps_predict_clock() {
        let mut filter = x_filter();
        filter.predict(0.0, 0).unwrap();
        filter.predict(2.0, 1_000_000).unwrap();
        filter.correct(SensorKind::Position, 1.0).unwrap();
        filter.reset();

        let est = filter.estimate();
        assert_eq!((est.position, est.velocity), (0.0, 0.0));
        assert_eq!(est.covariance, [[0.0, 0.0], [0.0, 1.0]]);
        assert_eq!(filter.measurement()[0], 0.0);
        assert_eq!(est.last_predict_us, 1_000_000);
    }

    #[test]
    fn test_position_sigma_shrinks_on_fix() {
        let mut filter = x_filter().with_prior(AxisStateVec::zeros(), AxisStateMat::identity() * 4.0);
        assert_abs_diff_eq!(filter.estimate().position_sigma(), 2.0, epsilon = 1e-12);

        filter.correct(SensorKind::Position, 1.0).unwrap();
        // P00 = 4·4 / (4 + 4)
        assert_abs_diff_eq!(filter.estimate().position_sigma(), 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(AxisEstimate::default().position_sigma(), 0.0);
    }
}
