//! Core types exchanged with the sensor driver and the settings/telemetry bus

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Standard gravity used by the accelerometer bias scale, in m/s²
pub const GRAV: f32 = 9.81;

/// Physical size of one accelerometer bias count, in m/s²
///
/// Bias values are stored in counts of 4 mg regardless of the configured
/// accelerometer range.
pub const ACCEL_SCALE: f32 = GRAV * 0.004;

/// One raw inertial sample as delivered by the sensor driver
///
/// Axes are in the sensor's own frame and units (counts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Gyroscope counts (x, y, z)
    pub gyro: [i16; 3],
    /// Accelerometer counts (x, y, z)
    pub accel: [i16; 3],
    /// Die temperature counts
    pub temperature: i16,
}

/// Sensor scale factors used to convert counts to physical units
///
/// # Example
/// ```
/// use attitude_estimator::SensorScale;
///
/// // ±500 deg/s, ±4 g
/// let scale = SensorScale {
///     gyro: 1.0 / 65.5,
///     accel: 9.81 / 8192.0,
/// };
/// assert!(scale.gyro < SensorScale::default().gyro);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorScale {
    /// Degrees per second per gyroscope count
    pub gyro: f32,
    /// m/s² per accelerometer count
    pub accel: f32,
}

impl Default for SensorScale {
    /// MPU6050 configured for ±2000 deg/s and ±8 g
    fn default() -> Self {
        Self {
            gyro: 1.0 / 16.4,
            accel: GRAV / 4096.0,
        }
    }
}

/// Flight-armed status published by the flight controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArmedStatus {
    #[default]
    Disarmed,
    /// Arming sequence in progress, motors not yet live
    Arming,
    Armed,
}

/// Trim-flight command carried in the settings object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrimCommand {
    /// No calibration in progress
    #[default]
    Normal,
    /// Clear the accumulator and start collecting accelerometer samples
    Start,
    /// Convert the collected samples into a new accelerometer bias
    Load,
}

/// Attitude settings snapshot
///
/// Delivered as a whole by the settings bus and applied atomically through
/// [`ConfigSync`](crate::ConfigSync).
///
/// # Example
/// ```
/// use attitude_estimator::{AttitudeSettings, TrimCommand};
///
/// let settings = AttitudeSettings {
///     accel_kp: 0.1,
///     board_rotation: [0, 0, 90], // board mounted yawed right
///     trim_flight: TrimCommand::Start,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttitudeSettings {
    /// Proportional accelerometer correction gain
    pub accel_kp: f32,
    /// Integral accelerometer correction gain (gyro bias learning rate)
    pub accel_ki: f32,
    /// Rate at which the yaw gyro is driven towards a zero average
    pub yaw_bias_rate: f32,
    /// Gyro gain forwarded to stabilization; not used by the estimator
    pub gyro_gain: f32,
    /// Re-acquire gyro bias with aggressive gains while arming
    pub zero_during_arming: bool,
    /// Add the learned gyro bias to published gyro rates
    pub bias_correct_gyro: bool,
    /// Run the yaw drift integral, independent of `bias_correct_gyro`
    pub yaw_bias_correct: bool,
    /// Accelerometer bias in counts of [`ACCEL_SCALE`]
    pub accel_bias: [i16; 3],
    /// Initial gyro bias in hundredths of deg/s
    pub gyro_bias: [i16; 3],
    /// Board mounting rotation in degrees (roll, pitch, yaw)
    pub board_rotation: [i16; 3],
    pub trim_flight: TrimCommand,
}

impl Default for AttitudeSettings {
    fn default() -> Self {
        Self {
            accel_kp: 0.05,
            accel_ki: 0.0001,
            yaw_bias_rate: 0.000001,
            gyro_gain: 0.42,
            zero_during_arming: true,
            bias_correct_gyro: true,
            yaw_bias_correct: true,
            accel_bias: [0; 3],
            gyro_bias: [0; 3],
            board_rotation: [0; 3],
            trim_flight: TrimCommand::Normal,
        }
    }
}

/// Attitude estimate published after every successful fusion
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttitudeActual {
    /// Quaternion scalar component
    pub q1: f32,
    pub q2: f32,
    pub q3: f32,
    pub q4: f32,
    /// Euler angles in degrees
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Default for AttitudeActual {
    fn default() -> Self {
        Self {
            q1: 1.0,
            q2: 0.0,
            q3: 0.0,
            q4: 0.0,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

/// Attitude alarm raised towards the system alarm collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Alarm {
    #[default]
    Clear,
    Error,
}
