//! Gain scheduling between bias acquisition and tuned flight gains

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::EstimatorParams;
use crate::types::ArmedStatus;

/// Warm-up window after boot, in milliseconds (both bounds exclusive)
///
/// The lower bound leaves time for the sensor clock to stabilise; inside the
/// window the aggressive acquisition gains learn the gyro bias.
pub const WARM_UP_START_MS: u32 = 1000;
pub const WARM_UP_END_MS: u32 = 7000;

/// Scheduler operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// Post-boot bias acquisition
    #[default]
    WarmUp,
    /// Bias re-acquisition while the craft is arming
    ArmZero,
    /// Tuned gains with the vibration filter enabled
    Normal,
}

/// Gain set consumed by the conditioner and the fusion step
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gains {
    /// Proportional accelerometer correction gain
    pub kp: f32,
    /// Integral (bias learning) gain
    pub ki: f32,
    /// Yaw drift integral rate
    pub yaw_bias_rate: f32,
    /// Whether the IIR filter runs on accel and predicted gravity
    pub filter_enabled: bool,
}

impl Gains {
    /// Fast bias acquisition with no filter phase lag
    pub const ACQUISITION: Gains = Gains {
        kp: 1.0,
        ki: 0.9,
        yaw_bias_rate: 0.23,
        filter_enabled: false,
    };

    /// Tuned gains taken from the running parameters
    pub fn tuned(params: &EstimatorParams) -> Self {
        Self {
            kp: params.accel_kp,
            ki: params.accel_ki,
            yaw_bias_rate: params.yaw_bias_rate,
            filter_enabled: true,
        }
    }
}

/// Selects the active gain set once per cycle
///
/// The mode is re-evaluated every cycle; there is no terminal state.
///
/// # Example
/// ```
/// use attitude_estimator::{ArmedStatus, EstimatorParams, Gains, Mode, ModeScheduler};
///
/// let params = EstimatorParams::default();
/// let mut scheduler = ModeScheduler::new();
///
/// let gains = scheduler.select(2_000, ArmedStatus::Disarmed, &params);
/// assert_eq!(scheduler.mode(), Mode::WarmUp);
/// assert_eq!(gains, Gains::ACQUISITION);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeScheduler {
    mode: Mode,
}

impl ModeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode (as of the last `select`)
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Evaluate the mode for this cycle and return its gains
    ///
    /// # Arguments
    /// * `elapsed_ms` - Time since boot in milliseconds
    /// * `armed` - Current flight-armed status
    /// * `params` - Running estimator parameters
    pub fn select(
        &mut self,
        elapsed_ms: u32,
        armed: ArmedStatus,
        params: &EstimatorParams,
    ) -> Gains {
        let mode = Self::evaluate(elapsed_ms, armed, params);

        if mode != self.mode {
            log::info!("attitude mode {:?} -> {:?} at {} ms", self.mode, mode, elapsed_ms);
            self.mode = mode;
        }

        match mode {
            Mode::WarmUp | Mode::ArmZero => Gains::ACQUISITION,
            Mode::Normal => Gains::tuned(params),
        }
    }

    fn evaluate(elapsed_ms: u32, armed: ArmedStatus, params: &EstimatorParams) -> Mode {
        if elapsed_ms > WARM_UP_START_MS && elapsed_ms < WARM_UP_END_MS {
            Mode::WarmUp
        } else if params.zero_during_arming && armed == ArmedStatus::Arming {
            Mode::ArmZero
        } else {
            Mode::Normal
        }
    }
}
