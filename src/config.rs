//! Application of settings snapshots to the running estimator
//!
//! Settings arrive from the settings-change context. They are validated,
//! turned into an [`EstimatorParams`] value and handed to the periodic task
//! through a signal, so the task only ever sees whole snapshots.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use nalgebra::{Matrix3, Vector3};

use crate::error::{AttitudeError, Result};
use crate::math::board_rotation_matrix;
use crate::trim::TrimCalibrator;
use crate::types::{AttitudeSettings, TrimCommand};

/// Running parameter set derived from [`AttitudeSettings`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorParams {
    pub accel_kp: f32,
    pub accel_ki: f32,
    pub yaw_bias_rate: f32,
    pub gyro_gain: f32,
    pub zero_during_arming: bool,
    pub bias_correct_gyro: bool,
    pub yaw_bias_correct: bool,
    /// Accelerometer bias in counts of [`ACCEL_SCALE`](crate::ACCEL_SCALE)
    pub accel_bias: [i16; 3],
    /// Gyro bias loaded into the integral when the snapshot is taken, deg/s
    pub gyro_bias: Vector3<f32>,
    /// Sensor-to-body rotation, `None` when the board is mounted straight
    pub board_rotation: Option<Matrix3<f32>>,
}

impl EstimatorParams {
    /// Derive the running parameters from a settings snapshot
    pub fn from_settings(settings: &AttitudeSettings) -> Self {
        Self {
            accel_kp: settings.accel_kp,
            accel_ki: settings.accel_ki,
            yaw_bias_rate: settings.yaw_bias_rate,
            gyro_gain: settings.gyro_gain,
            zero_during_arming: settings.zero_during_arming,
            bias_correct_gyro: settings.bias_correct_gyro,
            yaw_bias_correct: settings.yaw_bias_correct,
            accel_bias: settings.accel_bias,
            gyro_bias: Vector3::new(
                settings.gyro_bias[0] as f32,
                settings.gyro_bias[1] as f32,
                settings.gyro_bias[2] as f32,
            ) / 100.0,
            board_rotation: board_rotation_matrix(settings.board_rotation),
        }
    }
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self::from_settings(&AttitudeSettings::default())
    }
}

/// Accepted yaw drift integral rates
const YAW_BIAS_RATE_RANGE: core::ops::Range<f32> = 0.0..1.0;

pub(crate) fn validate(settings: &AttitudeSettings) -> Result<()> {
    if !settings.accel_kp.is_finite() || settings.accel_kp < 0.0 {
        return Err(AttitudeError::InvalidSettings("accel_kp"));
    }
    if !settings.accel_ki.is_finite() || settings.accel_ki < 0.0 {
        return Err(AttitudeError::InvalidSettings("accel_ki"));
    }
    // The yaw drift integral b -= (g + b) * rate only converges for rate < 1
    if !YAW_BIAS_RATE_RANGE.contains(&settings.yaw_bias_rate) {
        return Err(AttitudeError::InvalidSettings("yaw_bias_rate"));
    }
    if !settings.gyro_gain.is_finite() {
        return Err(AttitudeError::InvalidSettings("gyro_gain"));
    }
    Ok(())
}

/// Settings handoff between the settings-change context and the periodic task
///
/// Only the latest snapshot is kept; an unread snapshot is replaced as a
/// whole by a newer one.
///
/// # Example
/// ```
/// use attitude_estimator::{AttitudeSettings, ConfigSync, TrimCalibrator};
///
/// let config = ConfigSync::new();
/// let trim = TrimCalibrator::new();
///
/// let settings = AttitudeSettings { accel_kp: 0.2, ..Default::default() };
/// assert_eq!(config.apply(&settings, &trim), Ok(None));
///
/// let params = config.take().unwrap();
/// assert_eq!(params.accel_kp, 0.2);
/// assert!(config.take().is_none());
/// ```
pub struct ConfigSync {
    pending: Signal<CriticalSectionRawMutex, EstimatorParams>,
}

impl ConfigSync {
    pub const fn new() -> Self {
        Self {
            pending: Signal::new(),
        }
    }

    /// Apply a settings snapshot
    ///
    /// Runs the trim command and publishes the derived parameters for the
    /// periodic task. When a trim `Load` completes, the updated settings
    /// (new accelerometer bias, trim command reset to `Normal`) are returned
    /// so the caller can publish them back to the settings bus.
    ///
    /// # Errors
    /// Returns [`AttitudeError::InvalidSettings`] for negative or non-finite
    /// gains and for a yaw bias rate outside `0.0..1.0`. Nothing is
    /// published and the trim state is left alone.
    pub fn apply(
        &self,
        settings: &AttitudeSettings,
        trim: &TrimCalibrator,
    ) -> Result<Option<AttitudeSettings>> {
        if let Err(err) = validate(settings) {
            log::warn!("rejecting attitude settings: {}", err);
            return Err(err);
        }

        let mut effective = *settings;
        let mut updated = None;

        match settings.trim_flight {
            TrimCommand::Start => trim.start(),
            TrimCommand::Load => {
                match trim.load() {
                    Some(bias) => effective.accel_bias = bias,
                    None => log::warn!("trim load with no samples, accelerometer bias unchanged"),
                }
                effective.trim_flight = TrimCommand::Normal;
                updated = Some(effective);
            }
            TrimCommand::Normal => trim.stop(),
        }

        let params = EstimatorParams::from_settings(&effective);
        log::debug!(
            "attitude settings applied: kp={} ki={} rotate={}",
            params.accel_kp,
            params.accel_ki,
            params.board_rotation.is_some()
        );
        self.pending.signal(params);

        Ok(updated)
    }

    /// Take the newest unread parameter snapshot, if any
    pub fn take(&self) -> Option<EstimatorParams> {
        self.pending.try_take()
    }
}

impl Default for ConfigSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ACCEL_SCALE;

    #[test]
    fn test_gyro_bias_is_scaled() {
        let settings = AttitudeSettings {
            gyro_bias: [150, -25, 0],
            ..Default::default()
        };
        let params = EstimatorParams::from_settings(&settings);
        assert!((params.gyro_bias - Vector3::new(1.5, -0.25, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn test_rotation_only_when_configured() {
        assert!(EstimatorParams::default().board_rotation.is_none());

        let settings = AttitudeSettings {
            board_rotation: [0, 0, 45],
            ..Default::default()
        };
        assert!(EstimatorParams::from_settings(&settings).board_rotation.is_some());
    }

    #[test]
    fn test_negative_gain_rejected() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();
        let settings = AttitudeSettings {
            accel_ki: -0.1,
            ..Default::default()
        };

        assert_eq!(
            config.apply(&settings, &trim),
            Err(AttitudeError::InvalidSettings("accel_ki"))
        );
        assert!(config.take().is_none());
    }

    #[test]
    fn test_nan_gain_rejected() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();
        let settings = AttitudeSettings {
            accel_kp: f32::NAN,
            ..Default::default()
        };
        assert!(config.apply(&settings, &trim).is_err());
    }

    #[test]
    fn test_divergent_yaw_bias_rate_rejected() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();

        for rate in [1.0, 3.0, -0.1, f32::INFINITY, f32::NAN] {
            let settings = AttitudeSettings {
                yaw_bias_rate: rate,
                ..Default::default()
            };
            assert_eq!(
                config.apply(&settings, &trim),
                Err(AttitudeError::InvalidSettings("yaw_bias_rate")),
                "rate {}",
                rate
            );
        }
        assert!(config.take().is_none());

        let settings = AttitudeSettings {
            yaw_bias_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(config.apply(&settings, &trim), Ok(None));
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();

        for kp in [0.1, 0.2, 0.3] {
            let settings = AttitudeSettings {
                accel_kp: kp,
                ..Default::default()
            };
            config.apply(&settings, &trim).unwrap();
        }

        assert_eq!(config.take().unwrap().accel_kp, 0.3);
        assert!(config.take().is_none());
    }

    #[test]
    fn test_trim_start_then_load() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();
        let mut settings = AttitudeSettings {
            trim_flight: TrimCommand::Start,
            ..Default::default()
        };

        assert_eq!(config.apply(&settings, &trim), Ok(None));
        assert!(trim.is_armed());

        for _ in 0..10 {
            trim.accumulate(Vector3::new(6.0, -3.0, -245.0) * ACCEL_SCALE);
        }

        settings.trim_flight = TrimCommand::Load;
        let updated = config.apply(&settings, &trim).unwrap().unwrap();
        assert_eq!(updated.accel_bias, [6, -3, 5]);
        assert_eq!(updated.trim_flight, TrimCommand::Normal);
        assert!(!trim.is_armed());

        // The new bias is already in the published parameters
        assert_eq!(config.take().unwrap().accel_bias, [6, -3, 5]);
    }

    #[test]
    fn test_trim_load_without_samples_keeps_bias() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();
        let settings = AttitudeSettings {
            accel_bias: [1, 2, 3],
            trim_flight: TrimCommand::Load,
            ..Default::default()
        };

        let updated = config.apply(&settings, &trim).unwrap().unwrap();
        assert_eq!(updated.accel_bias, [1, 2, 3]);
        assert_eq!(updated.trim_flight, TrimCommand::Normal);
    }

    #[test]
    fn test_normal_command_disarms_trim() {
        let config = ConfigSync::new();
        let trim = TrimCalibrator::new();
        trim.start();

        config.apply(&AttitudeSettings::default(), &trim).unwrap();
        assert!(!trim.is_armed());
    }
}
