//! Fourth-order IIR low-pass filter used to suppress vibration noise
//!
//! Chebyshev type II design, `cheby2(4, 60, 10/200)`: 60 dB stopband
//! attenuation, 10 Hz cutoff at 400 Hz sampling, unity DC gain.
//!
//! The filter keeps its history in double precision. Its poles sit within
//! 1e-3 of the unit circle, and a single-precision history wanders several
//! percent around the DC gain.
//!
//! # Example
//! ```
//! use nalgebra::Vector3;
//! use attitude_estimator::filter::{AxisFilters, apply_vector};
//!
//! let mut state = AxisFilters::default();
//! let noisy = Vector3::new(0.0, 0.0, -9.81);
//! let smoothed = apply_vector(noisy, &mut state, true);
//! assert!(smoothed.z.abs() < noisy.z.abs());
//! ```

use nalgebra::Vector3;

/// Feed-forward coefficients b0..b4
pub const B: [f64; 5] = [
    0.00098778675104,
    -0.00376234890193,
    0.00555374469529,
    -0.00376234890193,
    0.00098778675104,
];

/// Feedback coefficients a1..a4, applied with negation
pub const A: [f64; 4] = [
    -3.87812973499889,
    5.64176257281588,
    -3.64887595541910,
    0.88524773799562,
];

/// History of one filter instance
///
/// Index 0 holds the most recent value, index 3 the oldest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    inputs: [f64; 4],
    outputs: [f64; 4],
}

impl FilterState {
    /// Clear the history back to the start-up state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One filter state per body axis
pub type AxisFilters = [FilterState; 3];

/// Run one sample through the filter, updating its history
pub fn apply(sample: f32, state: &mut FilterState) -> f32 {
    let input = sample as f64;

    let mut output = B[0] * input;
    for k in 0..4 {
        output += B[k + 1] * state.inputs[k] - A[k] * state.outputs[k];
    }

    state.inputs.copy_within(0..3, 1);
    state.inputs[0] = input;
    state.outputs.copy_within(0..3, 1);
    state.outputs[0] = output;

    output as f32
}

/// Filter a vector axis by axis
///
/// With `enabled == false` the vector is returned unchanged and the filter
/// history is left untouched, so a later enable starts from the old state.
pub fn apply_vector(vector: Vector3<f32>, state: &mut AxisFilters, enabled: bool) -> Vector3<f32> {
    if !enabled {
        return vector;
    }

    Vector3::new(
        apply(vector.x, &mut state[0]),
        apply(vector.y, &mut state[1]),
        apply(vector.z, &mut state[2]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_output_is_b0() {
        let mut state = FilterState::default();
        let out = apply(1.0, &mut state);
        assert!((out as f64 - B[0]).abs() < 1e-9);
    }

    #[test]
    fn test_history_shifts() {
        let mut state = FilterState::default();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            apply(x, &mut state);
        }
        assert_eq!(state.inputs, [5.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_bypass_leaves_state() {
        let mut state = AxisFilters::default();
        apply_vector(Vector3::new(1.0, 2.0, 3.0), &mut state, true);
        let before = state;

        let v = Vector3::new(7.0, -8.0, 9.0);
        assert_eq!(apply_vector(v, &mut state, false), v);
        assert_eq!(state, before);
    }

    #[test]
    fn test_axes_are_independent() {
        let mut state = AxisFilters::default();
        let out = apply_vector(Vector3::new(1.0, 0.0, 0.0), &mut state, true);
        assert!(out.x > 0.0);
        assert_eq!(out.y, 0.0);
        assert_eq!(out.z, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut state = FilterState::default();
        apply(3.0, &mut state);
        state.reset();
        assert_eq!(state, FilterState::default());
    }
}
