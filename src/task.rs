//! Periodic attitude task
//!
//! Wires the scheduler, conditioner, trim accumulator and fusion step into
//! one synchronous cycle. The caller drives it from its own periodic loop
//! (executor task, RTOS thread or simulation) and publishes the report.
//!
//! # Example
//! ```
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use embassy_sync::channel::Channel;
//! use attitude_estimator::{
//!     Alarm, ArmedStatus, AttitudeSettings, AttitudeTask, ConfigSync, RawSample,
//!     SensorScale, TrimCalibrator,
//! };
//!
//! let samples: Channel<NoopRawMutex, RawSample, 8> = Channel::new();
//! let config = ConfigSync::new();
//! let trim = TrimCalibrator::new();
//! let settings = AttitudeSettings::default();
//! let mut task = AttitudeTask::new(SensorScale::default(), &settings).unwrap();
//!
//! samples.try_send(RawSample { accel: [0, 0, 4096], ..Default::default() }).unwrap();
//!
//! let mut receiver = samples.receiver();
//! // Inside the warm-up window the filter is bypassed
//! let report = task.cycle(2_000, ArmedStatus::Disarmed, &mut receiver, &config, &trim);
//! assert_eq!(report.alarm, Alarm::Clear);
//! assert!(report.attitude.is_some());
//!
//! // Nothing queued: the cycle times out and raises the alarm
//! let report = task.cycle(2_004, ArmedStatus::Disarmed, &mut receiver, &config, &trim);
//! assert_eq!(report.alarm, Alarm::Error);
//! ```
//!
//! With the `time` feature, [`AttitudeTask::cycle_async`] waits a bounded
//! time on the channel instead of polling it, and reads the tick clock
//! itself.

#[cfg(feature = "time")]
use embassy_sync::blocking_mutex::raw::RawMutex;
#[cfg(feature = "time")]
use embassy_time::Instant;
use nalgebra::{Quaternion, Vector3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "time")]
use crate::conditioner::{TimedReceiver, acquire_within};
use crate::conditioner::{ConditionedSample, SampleSource, acquire};
use crate::config::{ConfigSync, EstimatorParams, validate};
use crate::error::Result;
use crate::fusion::{EstimatorState, fuse};
use crate::scheduler::{Gains, Mode, ModeScheduler};
use crate::trim::TrimCalibrator;
use crate::types::{Alarm, ArmedStatus, AttitudeActual, AttitudeSettings, SensorScale};

/// Everything one cycle produced for the telemetry bus
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CycleReport {
    /// Scheduler mode used this cycle
    pub mode: Mode,
    /// Gains used this cycle
    pub gains: Gains,
    /// Attitude alarm state after this cycle
    pub alarm: Alarm,
    /// Conditioned sensor object, `None` on acquisition failure
    pub sensors: Option<ConditionedSample>,
    /// Attitude estimate, `None` when fusion did not run or was skipped
    pub attitude: Option<AttitudeActual>,
}

/// The periodic attitude estimator
pub struct AttitudeTask {
    state: EstimatorState,
    params: EstimatorParams,
    scale: SensorScale,
    scheduler: ModeScheduler,
    alarm: Alarm,
}

impl AttitudeTask {
    /// Create the task with an initial settings snapshot
    ///
    /// The snapshot is applied directly so the board rotation and biases
    /// are in place before the first cycle.
    ///
    /// # Errors
    /// Returns [`AttitudeError::InvalidSettings`](crate::AttitudeError) for
    /// settings that [`ConfigSync::apply`] would reject.
    pub fn new(scale: SensorScale, settings: &AttitudeSettings) -> Result<Self> {
        validate(settings)?;

        let params = EstimatorParams::from_settings(settings);
        let mut state = EstimatorState::new();
        state.gyro_bias = params.gyro_bias;

        Ok(Self {
            state,
            params,
            scale,
            scheduler: ModeScheduler::new(),
            alarm: Alarm::Clear,
        })
    }

    /// Run one estimator cycle
    ///
    /// # Arguments
    /// * `now_ms` - Tick time since boot in milliseconds
    /// * `armed` - Current flight-armed status
    /// * `source` - Sensor sample source, returns within its own time bound
    /// * `config` - Settings handoff from the settings-change context
    /// * `trim` - Shared trim accumulator
    pub fn cycle<S: SampleSource + ?Sized>(
        &mut self,
        now_ms: u32,
        armed: ArmedStatus,
        source: &mut S,
        config: &ConfigSync,
        trim: &TrimCalibrator,
    ) -> CycleReport {
        let gains = self.begin(now_ms, armed, config);
        let sample = acquire(
            source,
            &self.scale,
            &self.params,
            &gains,
            &mut self.state.gyro_bias,
        );
        self.finish(now_ms, gains, sample, trim)
    }

    /// Run one estimator cycle, waiting a bounded time for the sample
    ///
    /// Mode selection uses the tick clock at cycle start; the fusion step
    /// uses the tick clock once the sample has arrived.
    ///
    /// # Arguments
    /// * `armed` - Current flight-armed status
    /// * `source` - Data-ready channel with its wait bound
    /// * `config` - Settings handoff from the settings-change context
    /// * `trim` - Shared trim accumulator
    #[cfg(feature = "time")]
    pub async fn cycle_async<M: RawMutex, const N: usize>(
        &mut self,
        armed: ArmedStatus,
        source: &mut TimedReceiver<'_, M, N>,
        config: &ConfigSync,
        trim: &TrimCalibrator,
    ) -> CycleReport {
        let gains = self.begin(tick_ms(), armed, config);
        let sample = acquire_within(
            source,
            &self.scale,
            &self.params,
            &gains,
            &mut self.state.gyro_bias,
        )
        .await;
        self.finish(tick_ms(), gains, sample, trim)
    }

    /// Take pending settings and select this cycle's gains
    fn begin(&mut self, now_ms: u32, armed: ArmedStatus, config: &ConfigSync) -> Gains {
        if let Some(params) = config.take() {
            self.apply_params(params);
        }
        self.scheduler.select(now_ms, armed, &self.params)
    }

    fn finish(
        &mut self,
        now_ms: u32,
        gains: Gains,
        sample: Result<ConditionedSample>,
        trim: &TrimCalibrator,
    ) -> CycleReport {
        let sample = match sample {
            Ok(sample) => sample,
            Err(err) => {
                if self.alarm != Alarm::Error {
                    log::warn!("attitude sensor read failed: {}", err);
                }
                self.alarm = Alarm::Error;
                return self.report(gains, None, None);
            }
        };

        trim.accumulate(sample.accel_uncorrected);

        let attitude = fuse(&mut self.state, &sample, gains, now_ms).attitude();
        self.alarm = Alarm::Clear;

        self.report(gains, Some(sample), attitude)
    }

    /// Replace the running parameters with a new snapshot
    ///
    /// Reloads the gyro bias integral from the snapshot.
    pub fn apply_params(&mut self, params: EstimatorParams) {
        self.state.gyro_bias = params.gyro_bias;
        self.params = params;
    }

    fn report(
        &self,
        gains: Gains,
        sensors: Option<ConditionedSample>,
        attitude: Option<AttitudeActual>,
    ) -> CycleReport {
        CycleReport {
            mode: self.scheduler.mode(),
            gains,
            alarm: self.alarm,
            sensors,
            attitude,
        }
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        self.state.quaternion
    }

    pub fn gyro_bias(&self) -> Vector3<f32> {
        self.state.gyro_bias
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    pub fn mode(&self) -> Mode {
        self.scheduler.mode()
    }

    pub fn alarm(&self) -> Alarm {
        self.alarm
    }

    /// Current attitude object built from the quaternion
    pub fn attitude(&self) -> AttitudeActual {
        self.state.attitude()
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EstimatorState {
        &mut self.state
    }
}

/// Milliseconds since boot on the wrapping `u32` tick
#[cfg(feature = "time")]
fn tick_ms() -> u32 {
    Instant::now().as_millis() as u32
}
