//! Complementary-filter attitude fusion
//!
//! Each cycle the accelerometer is compared with the gravity direction
//! predicted from the current orientation. The cross product of the two is
//! fed back into the gyro rates (proportional term) and into the gyro bias
//! integral (integral term) before the quaternion is integrated.

use nalgebra::{Quaternion, Vector3};

use crate::conditioner::ConditionedSample;
use crate::filter::{AxisFilters, FilterState, apply_vector};
use crate::math::{DEG_TO_RAD, QuaternionExt};
use crate::scheduler::Gains;
use crate::types::AttitudeActual;

/// Below this magnitude a vector carries no usable direction
const MIN_MAGNITUDE: f32 = 1.0e-3;

/// Step used when the clock has not advanced between invocations, seconds
const NOMINAL_DELTA_TIME: f32 = 0.001;

/// Estimator state owned by the periodic task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorState {
    /// Orientation (w, i, j, k), unit norm with `w >= 0`
    pub quaternion: Quaternion<f32>,
    /// Learned gyro bias integral, deg/s
    pub gyro_bias: Vector3<f32>,
    /// Filter history of the measured acceleration
    pub accel_filter: AxisFilters,
    /// Filter history of the predicted gravity direction
    pub gravity_filter: AxisFilters,
    last_tick_ms: Option<u32>,
}

impl EstimatorState {
    pub fn new() -> Self {
        Self {
            quaternion: Quaternion::identity(),
            gyro_bias: Vector3::zeros(),
            accel_filter: AxisFilters::default(),
            gravity_filter: AxisFilters::default(),
            last_tick_ms: None,
        }
    }

    /// Time step for an invocation at `now_ms`, recording `now_ms` as the
    /// previous invocation time
    ///
    /// The tick counter may wrap. The first invocation and a repeated
    /// timestamp both yield the nominal 1 ms step.
    pub fn delta_time(&mut self, now_ms: u32) -> f32 {
        let elapsed = self.last_tick_ms.map_or(0, |last| now_ms.wrapping_sub(last));
        self.last_tick_ms = Some(now_ms);

        if elapsed == 0 {
            NOMINAL_DELTA_TIME
        } else {
            elapsed as f32 / 1000.0
        }
    }

    /// Current attitude object for publication
    pub fn attitude(&self) -> AttitudeActual {
        let q = &self.quaternion;
        let euler = q.to_euler_degrees();
        AttitudeActual {
            q1: q.w,
            q2: q.i,
            q3: q.j,
            q4: q.k,
            roll: euler.x,
            pitch: euler.y,
            yaw: euler.z,
        }
    }
}

impl Default for EstimatorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one fusion step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionOutcome {
    /// Orientation updated normally
    Updated(AttitudeActual),
    /// Accelerometer or predicted gravity too short to give a direction;
    /// orientation and bias left unchanged for this cycle
    DegenerateGeometry,
    /// Integration produced a degenerate quaternion; orientation reset to identity
    QuaternionReset(AttitudeActual),
}

impl FusionOutcome {
    /// Attitude to publish, if this cycle produced one
    pub fn attitude(&self) -> Option<AttitudeActual> {
        match self {
            FusionOutcome::Updated(attitude) | FusionOutcome::QuaternionReset(attitude) => {
                Some(*attitude)
            }
            FusionOutcome::DegenerateGeometry => None,
        }
    }
}

/// Run one fusion step
///
/// # Arguments
/// * `state` - Estimator state (orientation, bias integral, filters)
/// * `sample` - Conditioned sensor sample for this cycle
/// * `gains` - Gains selected for this cycle
/// * `now_ms` - Tick time of this invocation in milliseconds
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use attitude_estimator::{ConditionedSample, EstimatorState, FusionOutcome, Gains};
/// use attitude_estimator::fusion::fuse;
///
/// let mut state = EstimatorState::new();
/// let sample = ConditionedSample {
///     gyro: Vector3::new(0.0, 0.0, 90.0),
///     accel: Vector3::new(0.0, 0.0, -9.81),
///     accel_uncorrected: Vector3::new(0.0, 0.0, -9.81),
///     temperature: 25.0,
/// };
///
/// let outcome = fuse(&mut state, &sample, Gains::ACQUISITION, 4);
/// assert!(matches!(outcome, FusionOutcome::Updated(_)));
/// ```
pub fn fuse(
    state: &mut EstimatorState,
    sample: &ConditionedSample,
    gains: Gains,
    now_ms: u32,
) -> FusionOutcome {
    let delta_time = state.delta_time(now_ms);

    let accel = apply_vector(sample.accel, &mut state.accel_filter, gains.filter_enabled);
    let gravity = apply_vector(
        state.quaternion.predicted_gravity(),
        &mut state.gravity_filter,
        gains.filter_enabled,
    );

    let error = accel.cross(&gravity);

    let accel_magnitude = accel.norm();
    let gravity_magnitude = gravity.norm();

    // A non-finite value would stay in the recursive history for good
    if !accel_magnitude.is_finite() {
        state.accel_filter.iter_mut().for_each(FilterState::reset);
    }
    if !gravity_magnitude.is_finite() {
        state.gravity_filter.iter_mut().for_each(FilterState::reset);
    }

    // NaN magnitudes fail the comparison and skip the cycle too
    let usable = |magnitude: f32| magnitude >= MIN_MAGNITUDE;
    if !usable(accel_magnitude) || !usable(gravity_magnitude) {
        log::trace!(
            "skipping fusion: |accel|={} |gravity|={}",
            accel_magnitude,
            gravity_magnitude
        );
        return FusionOutcome::DegenerateGeometry;
    }

    let error = error / (accel_magnitude * gravity_magnitude);

    // Yaw is not observable from gravity; the conditioner handles its drift
    state.gyro_bias.x += error.x * gains.ki;
    state.gyro_bias.y += error.y * gains.ki;

    let gyro = sample.gyro + error * (gains.kp / delta_time);

    integrate_quaternion(state, gyro, delta_time)
}

/// First-order quaternion integration with renormalisation
fn integrate_quaternion(
    state: &mut EstimatorState,
    gyro: Vector3<f32>,
    delta_time: f32,
) -> FusionOutcome {
    let half_gyro = gyro * (DEG_TO_RAD * 0.5);
    let q = state.quaternion;

    // dq/dt = 0.5 * q ⊗ (0, ω)
    let derivative = q * Quaternion::from_parts(0.0, half_gyro);
    let q = (q + derivative * delta_time).canonical();

    let norm = q.norm();
    if !norm.is_finite() || norm < MIN_MAGNITUDE {
        log::warn!("degenerate attitude quaternion (norm {}), resetting to identity", norm);
        state.quaternion = Quaternion::identity();
        if !state.gyro_bias.iter().all(|b| b.is_finite()) {
            log::warn!("non-finite gyro bias integral, clearing it");
            state.gyro_bias = Vector3::zeros();
        }
        return FusionOutcome::QuaternionReset(state.attitude());
    }

    state.quaternion = q / norm;
    FusionOutcome::Updated(state.attitude())
}
