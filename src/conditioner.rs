//! Sensor sample conditioning
//!
//! Turns a raw driver sample into body-frame gyro (deg/s) and accel (m/s²)
//! vectors with mounting rotation, accelerometer bias and learned gyro bias
//! applied, and runs the weak yaw drift integral.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
#[cfg(feature = "time")]
use embassy_time::{Duration, with_timeout};
use nalgebra::Vector3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::EstimatorParams;
use crate::error::{AttitudeError, Result};
use crate::scheduler::Gains;
use crate::types::{ACCEL_SCALE, RawSample, SensorScale};

/// Producer of raw inertial samples for the synchronous cycle
///
/// `read` returns within its own time bound: a source that waits does so
/// inside `read`, a polled source returns at once. Having no sample is a
/// normal outcome reported as [`AttitudeError::SensorTimeout`].
pub trait SampleSource {
    fn read(&mut self) -> Result<RawSample>;
}

/// Zero-wait poll of a data-ready channel filled by the sensor driver
///
/// For a bounded wait on the same channel use [`TimedReceiver`].
impl<M: RawMutex, const N: usize> SampleSource for Receiver<'_, M, RawSample, N> {
    fn read(&mut self) -> Result<RawSample> {
        self.try_receive().map_err(|_| AttitudeError::SensorTimeout)
    }
}

/// Sensor sample period, the default bound on the wait for a sample
#[cfg(feature = "time")]
pub const SAMPLE_WAIT: Duration = Duration::from_millis(4);

/// Data-ready channel read with a bounded wait
///
/// # Example
/// ```
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use embassy_sync::channel::Channel;
/// use attitude_estimator::{RawSample, SAMPLE_WAIT, TimedReceiver};
///
/// let samples: Channel<NoopRawMutex, RawSample, 2> = Channel::new();
/// let mut source = TimedReceiver::new(samples.receiver(), SAMPLE_WAIT);
///
/// samples.try_send(RawSample::default()).unwrap();
/// assert!(embassy_futures::block_on(source.read()).is_ok());
/// ```
#[cfg(feature = "time")]
pub struct TimedReceiver<'a, M: RawMutex, const N: usize> {
    receiver: Receiver<'a, M, RawSample, N>,
    wait: Duration,
}

#[cfg(feature = "time")]
impl<'a, M: RawMutex, const N: usize> TimedReceiver<'a, M, N> {
    pub fn new(receiver: Receiver<'a, M, RawSample, N>, wait: Duration) -> Self {
        Self { receiver, wait }
    }

    /// Wait up to the configured bound for the next sample
    pub async fn read(&mut self) -> Result<RawSample> {
        with_timeout(self.wait, self.receiver.receive())
            .await
            .map_err(|_| AttitudeError::SensorTimeout)
    }
}

/// Conditioned sensor object, published every successful cycle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConditionedSample {
    /// Body rates in deg/s, gyro bias applied when enabled
    pub gyro: Vector3<f32>,
    /// Body acceleration in m/s², accelerometer bias removed
    pub accel: Vector3<f32>,
    /// Body acceleration before bias removal, as used for trim
    pub accel_uncorrected: Vector3<f32>,
    /// Sensor die temperature in °C
    pub temperature: f32,
}

/// Convert raw die temperature counts to °C
pub fn temperature_celsius(raw: i16) -> f32 {
    35.0 + (raw as f32 + 512.0) / 340.0
}

/// Scale raw counts and apply the mounting sign convention (x, -y, -z)
fn to_body(raw: [i16; 3], scale: f32) -> Vector3<f32> {
    Vector3::new(raw[0] as f32, -(raw[1] as f32), -(raw[2] as f32)) * scale
}

/// Acquire one sample and condition it
///
/// On a source error nothing is mutated and the error is returned; the
/// caller must skip fusion for this cycle.
///
/// # Arguments
/// * `source` - Sensor sample source
/// * `scale` - Count-to-unit scale factors
/// * `params` - Running estimator parameters
/// * `gains` - Gains selected for this cycle (yaw drift rate)
/// * `gyro_bias` - Gyro bias integral, deg/s
pub fn acquire<S: SampleSource + ?Sized>(
    source: &mut S,
    scale: &SensorScale,
    params: &EstimatorParams,
    gains: &Gains,
    gyro_bias: &mut Vector3<f32>,
) -> Result<ConditionedSample> {
    let raw = source.read()?;
    Ok(condition(&raw, scale, params, gains, gyro_bias))
}

/// Acquire one sample with a bounded wait and condition it
///
/// Same contract as [`acquire`]; the wait ends at the receiver's bound.
#[cfg(feature = "time")]
pub async fn acquire_within<M: RawMutex, const N: usize>(
    source: &mut TimedReceiver<'_, M, N>,
    scale: &SensorScale,
    params: &EstimatorParams,
    gains: &Gains,
    gyro_bias: &mut Vector3<f32>,
) -> Result<ConditionedSample> {
    let raw = source.read().await?;
    Ok(condition(&raw, scale, params, gains, gyro_bias))
}

/// Condition an already-read raw sample
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use attitude_estimator::{EstimatorParams, Gains, RawSample, SensorScale};
/// use attitude_estimator::conditioner::condition;
///
/// let raw = RawSample { gyro: [0, 0, 0], accel: [0, 0, 4096], temperature: 0 };
/// let mut gyro_bias = Vector3::zeros();
/// let sample = condition(
///     &raw,
///     &SensorScale::default(),
///     &EstimatorParams::default(),
///     &Gains::ACQUISITION,
///     &mut gyro_bias,
/// );
/// assert!((sample.accel.z + 9.81).abs() < 1e-4);
/// ```
pub fn condition(
    raw: &RawSample,
    scale: &SensorScale,
    params: &EstimatorParams,
    gains: &Gains,
    gyro_bias: &mut Vector3<f32>,
) -> ConditionedSample {
    let mut gyro = to_body(raw.gyro, scale.gyro);
    let mut accel = to_body(raw.accel, scale.accel);

    if let Some(rotation) = &params.board_rotation {
        gyro = rotation * gyro;
        accel = rotation * accel;
    }

    let accel_bias = Vector3::new(
        params.accel_bias[0] as f32,
        params.accel_bias[1] as f32,
        params.accel_bias[2] as f32,
    ) * ACCEL_SCALE;
    let accel_uncorrected = accel;
    let accel = accel - accel_bias;

    if params.bias_correct_gyro {
        gyro += *gyro_bias;
    }

    // Gravity carries no yaw information, so weakly drive the yaw rate
    // towards a zero average instead
    if params.yaw_bias_correct {
        gyro_bias.z -= gyro.z * gains.yaw_bias_rate;
    }

    ConditionedSample {
        gyro,
        accel,
        accel_uncorrected,
        temperature: temperature_celsius(raw.temperature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::channel::Channel;

    const UNIT: SensorScale = SensorScale {
        gyro: 1.0,
        accel: 1.0,
    };

    fn gains(yaw_bias_rate: f32) -> Gains {
        Gains {
            yaw_bias_rate,
            ..Gains::ACQUISITION
        }
    }

    #[test]
    fn test_sign_convention() {
        let raw = RawSample {
            gyro: [1, 2, 3],
            accel: [4, 5, 6],
            temperature: 0,
        };
        let mut bias = Vector3::zeros();
        let sample = condition(&raw, &UNIT, &EstimatorParams::default(), &gains(0.0), &mut bias);

        assert_eq!(sample.gyro, Vector3::new(1.0, -2.0, -3.0));
        assert_eq!(sample.accel, Vector3::new(4.0, -5.0, -6.0));
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((temperature_celsius(-512) - 35.0).abs() < 1e-6);
        assert!((temperature_celsius(3228) - 46.0).abs() < 1e-4);
    }

    #[test]
    fn test_accel_bias_removed() {
        let params = EstimatorParams {
            accel_bias: [10, 0, -5],
            ..Default::default()
        };
        let raw = RawSample::default();
        let mut bias = Vector3::zeros();
        let sample = condition(&raw, &UNIT, &params, &gains(0.0), &mut bias);

        assert!((sample.accel - Vector3::new(-10.0, 0.0, 5.0) * ACCEL_SCALE).norm() < 1e-6);
        assert_eq!(sample.accel_uncorrected, Vector3::zeros());
    }

    #[test]
    fn test_gyro_bias_applied_when_enabled() {
        let raw = RawSample {
            gyro: [10, 0, 0],
            ..Default::default()
        };
        let mut bias = Vector3::new(0.5, -0.5, 0.0);

        let sample = condition(&raw, &UNIT, &EstimatorParams::default(), &gains(0.0), &mut bias);
        assert_eq!(sample.gyro, Vector3::new(10.5, -0.5, 0.0));

        let params = EstimatorParams {
            bias_correct_gyro: false,
            ..Default::default()
        };
        let sample = condition(&raw, &UNIT, &params, &gains(0.0), &mut bias);
        assert_eq!(sample.gyro, Vector3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_yaw_drift_integral() {
        let raw = RawSample {
            gyro: [0, 0, -2],
            ..Default::default()
        };
        let mut bias = Vector3::zeros();

        // Published yaw rate is +2 deg/s, the integral pulls it back
        condition(&raw, &UNIT, &EstimatorParams::default(), &gains(0.25), &mut bias);
        assert!((bias.z + 0.5).abs() < 1e-6);
        assert_eq!(bias.x, 0.0);
        assert_eq!(bias.y, 0.0);
    }

    #[test]
    fn test_yaw_drift_runs_without_bias_correction() {
        let params = EstimatorParams {
            bias_correct_gyro: false,
            ..Default::default()
        };
        let raw = RawSample {
            gyro: [0, 0, -4],
            ..Default::default()
        };
        let mut bias = Vector3::zeros();
        condition(&raw, &UNIT, &params, &gains(0.1), &mut bias);
        assert!((bias.z + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_yaw_drift_can_be_disabled() {
        let params = EstimatorParams {
            yaw_bias_correct: false,
            ..Default::default()
        };
        let raw = RawSample {
            gyro: [0, 0, -4],
            ..Default::default()
        };
        let mut bias = Vector3::zeros();
        condition(&raw, &UNIT, &params, &gains(0.1), &mut bias);
        assert_eq!(bias, Vector3::zeros());
    }

    #[test]
    fn test_board_rotation_applied() {
        let params = EstimatorParams::from_settings(&crate::AttitudeSettings {
            board_rotation: [0, 0, 90],
            ..Default::default()
        });
        let raw = RawSample {
            gyro: [1, 0, 0],
            accel: [1, 0, 0],
            temperature: 0,
        };
        let mut bias = Vector3::zeros();
        let sample = condition(&raw, &UNIT, &params, &gains(0.0), &mut bias);

        assert!((sample.gyro - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-5);
        assert!((sample.accel - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_timeout_leaves_bias() {
        let channel: Channel<NoopRawMutex, RawSample, 4> = Channel::new();
        let mut receiver = channel.receiver();
        let mut bias = Vector3::new(0.1, 0.2, 0.3);

        let result = acquire(
            &mut receiver,
            &UNIT,
            &EstimatorParams::default(),
            &gains(0.5),
            &mut bias,
        );
        assert_eq!(result, Err(AttitudeError::SensorTimeout));
        assert_eq!(bias, Vector3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_reads_from_channel() {
        let channel: Channel<NoopRawMutex, RawSample, 4> = Channel::new();
        channel
            .try_send(RawSample {
                gyro: [0, 0, 0],
                accel: [0, 0, 1],
                temperature: -512,
            })
            .unwrap();
        let mut receiver = channel.receiver();
        let mut bias = Vector3::zeros();

        let sample = acquire(
            &mut receiver,
            &UNIT,
            &EstimatorParams::default(),
            &gains(0.0),
            &mut bias,
        )
        .unwrap();
        assert_eq!(sample.accel, Vector3::new(0.0, 0.0, -1.0));
        assert!((sample.temperature - 35.0).abs() < 1e-6);
    }

    #[cfg(feature = "time")]
    #[test]
    fn test_timed_read_waits_for_late_sample() {
        use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

        let channel: Channel<CriticalSectionRawMutex, RawSample, 1> = Channel::new();
        let mut source = TimedReceiver::new(channel.receiver(), Duration::from_millis(500));
        let expected = RawSample {
            gyro: [1, 2, 3],
            accel: [0, 0, 4096],
            temperature: 7,
        };

        let result = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(3));
                channel.try_send(expected).unwrap();
            });
            embassy_futures::block_on(source.read())
        });

        assert_eq!(result, Ok(expected));
    }

    #[cfg(feature = "time")]
    #[test]
    fn test_timed_read_gives_up_after_wait() {
        let channel: Channel<NoopRawMutex, RawSample, 1> = Channel::new();
        let mut source = TimedReceiver::new(channel.receiver(), Duration::from_millis(5));
        let mut bias = Vector3::new(0.1, 0.2, 0.3);

        let started = std::time::Instant::now();
        let result = embassy_futures::block_on(acquire_within(
            &mut source,
            &UNIT,
            &EstimatorParams::default(),
            &gains(0.5),
            &mut bias,
        ));

        assert_eq!(result, Err(AttitudeError::SensorTimeout));
        assert!(started.elapsed() >= std::time::Duration::from_millis(4));
        assert_eq!(bias, Vector3::new(0.1, 0.2, 0.3));
    }
}
