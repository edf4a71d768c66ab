//! Accelerometer trim calibration
//!
//! A trim flight (or bench run) averages the accelerometer while the craft
//! is level; the mean, with gravity removed from the vertical axis, becomes
//! the new accelerometer bias.
//!
//! The accumulator is filled by the periodic estimator task and consumed by
//! the settings-change context, so it lives behind a critical-section mutex.
//! Every lock is held for three additions and a counter update only.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use nalgebra::{ComplexField, Vector3};

use crate::types::{ACCEL_SCALE, GRAV};

/// Sample cap for one trim run
pub const MAX_TRIM_SAMPLES: u32 = 65535;

/// Per-axis sums are kept in fractional counts so a sub-count offset
/// survives until the final rounding
#[derive(Debug, Default)]
struct Accumulator {
    armed: bool,
    sums: [f64; 3],
    samples: u32,
}

/// Shared trim accumulator
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use attitude_estimator::{ACCEL_SCALE, TrimCalibrator};
///
/// let trim = TrimCalibrator::new();
/// trim.start();
/// for _ in 0..100 {
///     trim.accumulate(Vector3::new(2.0, -1.0, -250.0) * ACCEL_SCALE);
/// }
/// assert_eq!(trim.load(), Some([2, -1, 0]));
/// ```
pub struct TrimCalibrator {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Accumulator>>,
}

impl TrimCalibrator {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Accumulator {
                armed: false,
                sums: [0.0; 3],
                samples: 0,
            })),
        }
    }

    /// Clear the accumulator and start collecting samples
    pub fn start(&self) {
        self.inner.lock(|acc| {
            let mut acc = acc.borrow_mut();
            acc.sums = [0.0; 3];
            acc.samples = 0;
            acc.armed = true;
        });
        log::info!("accelerometer trim started");
    }

    /// Stop collecting without touching what was gathered
    pub fn stop(&self) {
        self.inner.lock(|acc| acc.borrow_mut().armed = false);
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock(|acc| acc.borrow().armed)
    }

    /// Number of samples collected since the last `start`
    pub fn samples(&self) -> u32 {
        self.inner.lock(|acc| acc.borrow().samples)
    }

    /// Add one accelerometer sample while armed
    ///
    /// `accel` is the rotated accelerometer vector in m/s² before bias
    /// removal. Returns `true` if the sample was taken; samples arriving
    /// while disarmed or after [`MAX_TRIM_SAMPLES`] are dropped.
    pub fn accumulate(&self, accel: Vector3<f32>) -> bool {
        let counts = accel.map(|a| {
            let c = (a / ACCEL_SCALE) as f64;
            c.clamp(i16::MIN as f64, i16::MAX as f64)
        });

        self.inner.lock(|acc| {
            let mut acc = acc.borrow_mut();
            if !acc.armed || acc.samples >= MAX_TRIM_SAMPLES {
                return false;
            }
            for (sum, count) in acc.sums.iter_mut().zip(counts.iter()) {
                *sum += *count;
            }
            acc.samples += 1;
            true
        })
    }

    /// Stop collecting and convert the collected samples into a bias
    ///
    /// The bias is the per-axis mean rounded to the nearest count. The
    /// vertical axis should average `-GRAV`; that offset is added back so
    /// a level craft yields a zero Z bias. The accumulator is cleared.
    /// Returns `None` if no samples were collected.
    pub fn load(&self) -> Option<[i16; 3]> {
        let (sums, samples) = self.inner.lock(|acc| {
            let mut acc = acc.borrow_mut();
            let taken = (acc.sums, acc.samples);
            *acc = Accumulator::default();
            taken
        });

        if samples == 0 {
            return None;
        }

        let n = samples as f64;
        let gravity_counts = (GRAV / ACCEL_SCALE).round() as f64;
        let bias = [sums[0] / n, sums[1] / n, sums[2] / n + gravity_counts]
            .map(|b| b.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);

        log::info!("accelerometer trim loaded from {} samples: {:?}", samples, bias);
        Some(bias)
    }
}

impl Default for TrimCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
