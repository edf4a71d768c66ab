#![no_std]

//! Attitude estimator - real-time gyro/accelerometer fusion for flight controllers
//!
//! A periodic task fuses gyroscope and accelerometer samples into a
//! drift-corrected orientation estimate (quaternion and Euler angles).
//!
//! # Features
//!
//! - Complementary filter with proportional correction and integral gyro bias learning
//! - Weak yaw drift integral driving the yaw rate towards a zero average
//! - 4th-order Chebyshev II low-pass filter against vibration noise
//! - Gain scheduling: post-boot warm-up, zero-during-arming and tuned flight gains
//! - Accelerometer trim calibration shared safely with the settings context
//! - Atomic settings application, board mounting rotation
//! - Recovery from free fall and degenerate quaternions without halting
//! - Bounded wait on the sensor data-ready channel (`time` feature)
//! - `#![no_std]` compatible for embedded systems
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use attitude_estimator::{ConditionedSample, EstimatorState, Gains};
//! use attitude_estimator::fusion::fuse;
//!
//! let mut state = EstimatorState::new();
//!
//! // Conditioned readings
//! let sample = ConditionedSample {
//!     gyro: Vector3::new(0.1, 0.2, 0.3),         // deg/s
//!     accel: Vector3::new(0.0, 0.0, -9.81),      // m/s², Z down at rest
//!     accel_uncorrected: Vector3::new(0.0, 0.0, -9.81),
//!     temperature: 25.0,
//! };
//!
//! // One cycle, 4 ms after the previous one
//! let outcome = fuse(&mut state, &sample, Gains::ACQUISITION, 4);
//!
//! if let Some(attitude) = outcome.attitude() {
//!     // Euler angles in degrees
//!     let (_roll, _pitch, _yaw) = (attitude.roll, attitude.pitch, attitude.yaw);
//! }
//! ```
//!
//! For the full periodic cycle see [`AttitudeTask`].

#[cfg(test)]
extern crate std;

pub mod conditioner;
mod config;
mod error;
pub mod filter;
pub mod fusion;
mod math;
mod scheduler;
mod task;
mod trim;
mod types;

// Re-export all public types and functions
pub use conditioner::{ConditionedSample, SampleSource};
#[cfg(feature = "time")]
pub use conditioner::{SAMPLE_WAIT, TimedReceiver};
pub use config::{ConfigSync, EstimatorParams};
pub use error::{AttitudeError, Result};
pub use fusion::{EstimatorState, FusionOutcome};
pub use math::{DEG_TO_RAD, QuaternionExt, RAD_TO_DEG, Vector3Ext, board_rotation_matrix};
pub use scheduler::{Gains, Mode, ModeScheduler, WARM_UP_END_MS, WARM_UP_START_MS};
pub use task::{AttitudeTask, CycleReport};
pub use trim::{MAX_TRIM_SAMPLES, TrimCalibrator};
pub use types::*;
