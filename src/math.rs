//! Mathematical utilities and nalgebra extensions for the attitude estimator

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Convert degrees to radians
    fn deg_to_rad(&self) -> Vector3<f32>;

    /// Convert radians to degrees
    fn rad_to_deg(&self) -> Vector3<f32>;
}

impl Vector3Ext for Vector3<f32> {
    fn deg_to_rad(&self) -> Vector3<f32> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f32> {
        *self * RAD_TO_DEG
    }
}

/// Extension trait for the raw (not necessarily unit) orientation quaternion
pub trait QuaternionExt {
    /// Body-frame direction of gravity predicted from this orientation
    ///
    /// Points along -Z for the identity orientation, matching the sign
    /// convention of conditioned accelerometer samples at rest.
    fn predicted_gravity(&self) -> Vector3<f32>;

    /// Return the quaternion with a non-negative scalar component
    fn canonical(&self) -> Quaternion<f32>;

    /// Convert to Euler angles (roll, pitch, yaw) in degrees, ZYX order
    fn to_euler_degrees(&self) -> Vector3<f32>;
}

impl QuaternionExt for Quaternion<f32> {
    fn predicted_gravity(&self) -> Vector3<f32> {
        let (q0, q1, q2, q3) = (self.w, self.i, self.j, self.k);
        Vector3::new(
            -(2.0 * (q1 * q3 - q0 * q2)),
            -(2.0 * (q2 * q3 + q0 * q1)),
            -(q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3),
        )
    }

    fn canonical(&self) -> Quaternion<f32> {
        if self.w < 0.0 { -*self } else { *self }
    }

    fn to_euler_degrees(&self) -> Vector3<f32> {
        let (roll, pitch, yaw) = UnitQuaternion::new_unchecked(*self).euler_angles();
        Vector3::new(roll, pitch, yaw).rad_to_deg()
    }
}

/// Build the sensor-to-body rotation matrix for a board mounting rotation
///
/// Returns `None` when all three angles are zero so callers can skip the
/// multiplication entirely.
///
/// # Arguments
/// * `rpy` - Mounting rotation in degrees (roll, pitch, yaw)
pub fn board_rotation_matrix(rpy: [i16; 3]) -> Option<Matrix3<f32>> {
    if rpy == [0, 0, 0] {
        return None;
    }

    let euler = Vector3::new(rpy[0] as f32, rpy[1] as f32, rpy[2] as f32).deg_to_rad();
    let rotation = UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z);

    // Earth-to-body direction cosine matrix of the mounting rotation
    Some(rotation.inverse().to_rotation_matrix().into_inner())
}
