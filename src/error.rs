//! Error types for the attitude estimator

use core::fmt;

/// Result type for estimator operations
pub type Result<T> = core::result::Result<T, AttitudeError>;

/// Estimator-level errors
///
/// None of these are fatal: every variant leaves the estimator in a state
/// from which the next cycle can run normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttitudeError {
    /// No sensor sample arrived within the bounded wait
    SensorTimeout,
    /// A settings snapshot was rejected; the previous parameters stay active
    InvalidSettings(&'static str),
}

impl fmt::Display for AttitudeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttitudeError::SensorTimeout => write!(f, "no sensor data within the sample period"),
            AttitudeError::InvalidSettings(field) => {
                write!(f, "invalid attitude settings: {field}")
            }
        }
    }
}

impl core::error::Error for AttitudeError {}
