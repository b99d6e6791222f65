//! Rigid-body transforms.
//!
//! [`RigidTransform`] is an immutable 4×4 homogeneous matrix combining a
//! rotation and a translation.  It is built once (from Euler angles, a
//! quaternion, or a raw matrix) and then shared read-only, typically behind an
//! [`Arc`](std::sync::Arc), by every buffered radar frame received while it
//! was the current ego pose.  The inverse is computed on first use and cached.
//!
//! # Example
//!
//! ```rust
//! use radfuse_perception::transform::RigidTransform;
//! use nalgebra::Vector3;
//!
//! // Radar mounted 10 m to the left, 2 m up, yawed 90°.
//! let extrinsics = RigidTransform::from_euler(
//!     [0.0, 10.0, 2.0],
//!     [0.0, 0.0, std::f64::consts::FRAC_PI_2],
//! );
//!
//! let p = extrinsics.transform_point(&Vector3::new(-8.0, -1.0, 1.0));
//! assert!((p.x - 1.0).abs() < 1e-9);
//! assert!((p.y - 2.0).abs() < 1e-9);
//! assert!((p.z - 3.0).abs() < 1e-9);
//! ```

use std::sync::OnceLock;

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3,
    Vector4,
};
use radfuse_types::{FusionError, Result};

// ────────────────────────────────────────────────────────────────────────────
// RigidTransform
// ────────────────────────────────────────────────────────────────────────────

/// A combination of rotation and translation in Euclidean space, stored as a
/// 4×4 homogeneous matrix.
///
/// Euler angles follow the static x-y-z convention (`roll, pitch, yaw`, so
/// `R = Rz(yaw) · Ry(pitch) · Rx(roll)`); quaternions are given as
/// `w, x, y, z`.
#[derive(Debug, Clone)]
pub struct RigidTransform {
    matrix: Matrix4<f64>,
    inverse: OnceLock<Matrix4<f64>>,
}

impl RigidTransform {
    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: OnceLock::from(Matrix4::identity()),
        }
    }

    /// Validating constructor accepting loosely-typed inputs.
    ///
    /// Either give both `position` (3 components) and `rotation` (3 Euler
    /// angles or a 4-component quaternion), or only `matrix`, or nothing at
    /// all for the identity.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::Configuration`] on wrong vector lengths or
    /// conflicting arguments.
    pub fn new(
        position: Option<&[f64]>,
        rotation: Option<&[f64]>,
        matrix: Option<Matrix4<f64>>,
    ) -> Result<Self> {
        match (position, rotation, matrix) {
            (None, None, None) => Ok(Self::identity()),
            (None, None, Some(matrix)) => Ok(Self::from_matrix(matrix)),
            (Some(position), Some(rotation), None) => {
                let position = <[f64; 3]>::try_from(position).map_err(|_| {
                    FusionError::configuration(format!(
                        "position must have 3 components (x, y, z), got {}",
                        position.len()
                    ))
                })?;
                match *rotation {
                    [roll, pitch, yaw] => Ok(Self::from_euler(position, [roll, pitch, yaw])),
                    [w, x, y, z] => Ok(Self::from_quaternion(position, [w, x, y, z])),
                    _ => Err(FusionError::configuration(format!(
                        "rotation must be 3 Euler angles (roll, pitch, yaw) or a quaternion \
                         (w, x, y, z), got {} components",
                        rotation.len()
                    ))),
                }
            }
            _ => Err(FusionError::configuration(
                "either both position and rotation are given and no matrix, or neither of them",
            )),
        }
    }

    /// Build from a translation and Euler angles `[roll, pitch, yaw]` in
    /// radians.
    pub fn from_euler(position: [f64; 3], rotation: [f64; 3]) -> Self {
        let [roll, pitch, yaw] = rotation;
        Self::from_parts(position, UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Build from a translation and a quaternion `[w, x, y, z]`.
    ///
    /// The quaternion is normalised; a (near) zero quaternion is read as no
    /// rotation.
    pub fn from_quaternion(position: [f64; 3], rotation: [f64; 4]) -> Self {
        let [w, x, y, z] = rotation;
        let q = Quaternion::new(w, x, y, z);
        let rotation = if q.norm() < f64::EPSILON {
            UnitQuaternion::identity()
        } else {
            UnitQuaternion::from_quaternion(q)
        };
        Self::from_parts(position, rotation)
    }

    /// Wrap an existing homogeneous matrix.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Self {
        Self {
            matrix,
            inverse: OnceLock::new(),
        }
    }

    fn from_parts(position: [f64; 3], rotation: UnitQuaternion<f64>) -> Self {
        let [x, y, z] = position;
        Self::from_matrix(
            Isometry3::from_parts(Translation3::new(x, y, z), rotation).to_homogeneous(),
        )
    }

    /// The 4×4 transformation matrix.
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// The inverse matrix, computed on first call and cached afterwards.
    pub fn inverse_matrix(&self) -> &Matrix4<f64> {
        self.inverse.get_or_init(|| {
            self.matrix
                .try_inverse()
                .unwrap_or_else(|| rigid_inverse(&self.matrix))
        })
    }

    /// The inverse as a transform of its own, whose inverse is `self`.
    pub fn inverse(&self) -> Self {
        Self {
            matrix: *self.inverse_matrix(),
            inverse: OnceLock::from(self.matrix),
        }
    }

    /// Translation component `(x, y, z)`.
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)])
    }

    /// Rotation component as a quaternion `[w, x, y, z]` with `w >= 0`.
    pub fn rotation(&self) -> [f64; 4] {
        let linear: Matrix3<f64> = self.matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&linear));
        let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
        [sign * q.w, sign * q.i, sign * q.j, sign * q.k]
    }

    /// Matrix product `self · other`: `other` is applied to a point first.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(&self, other: &Self) -> Self {
        Self::from_matrix(self.matrix * other.matrix)
    }

    /// Apply the transform to a 3-D point.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        (self.matrix * Vector4::new(point.x, point.y, point.z, 1.0)).xyz()
    }

    /// Convert the pose of a localization sensor ("where the sensor is") into
    /// the pose of the vehicle origin, given the sensor's mounting
    /// extrinsics: `sensor_pose · inverse(sensor_extrinsics)`.
    pub fn localization_from_sensor_to_ego(
        sensor_pose: &RigidTransform,
        sensor_extrinsics: &RigidTransform,
    ) -> RigidTransform {
        Self::from_matrix(sensor_pose.matrix * sensor_extrinsics.inverse_matrix())
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl PartialEq for RigidTransform {
    fn eq(&self, other: &Self) -> bool {
        self.matrix == other.matrix
    }
}

/// Closed-form inverse `[Rᵀ | -Rᵀt]`, used only when the general inverse
/// does not exist.
fn rigid_inverse(matrix: &Matrix4<f64>) -> Matrix4<f64> {
    let r_t: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).transpose();
    let t = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    let mut inverse = r_t.to_homogeneous();
    inverse
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&(-(r_t * t)));
    inverse
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

    // ── Construction ────────────────────────────────────────────────────────

    #[test]
    fn identity_leaves_points_alone() {
        let t = RigidTransform::identity();
        let p = t.transform_point(&Vector3::new(1.0, 2.0, 3.0));
        assert_abs_diff_eq!(p, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_eq!(*t.inverse_matrix(), Matrix4::identity());
    }

    #[test]
    fn new_without_arguments_is_identity() -> Result<()> {
        assert_eq!(RigidTransform::new(None, None, None)?, RigidTransform::identity());
        Ok(())
    }

    #[test]
    fn euler_and_quaternion_agree() -> Result<()> {
        let euler = RigidTransform::new(Some(&[1.0, 2.0, 3.0]), Some(&[0.0, 0.0, FRAC_PI_2]), None)?;
        let quat = RigidTransform::new(
            Some(&[1.0, 2.0, 3.0]),
            Some(&[FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2]),
            None,
        )?;
        assert_abs_diff_eq!(euler.matrix(), quat.matrix(), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn euler_order_is_roll_then_pitch_then_yaw() {
        // Roll 90° maps +Y to +Z, then yaw 90° leaves +Z alone.
        let t = RigidTransform::from_euler([0.0; 3], [FRAC_PI_2, 0.0, FRAC_PI_2]);
        let p = t.transform_point(&Vector3::new(0.0, 1.0, 0.0));
        assert_abs_diff_eq!(p, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        // +X: roll leaves it, yaw turns it into +Y.
        let p = t.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(p, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn zero_quaternion_means_no_rotation() {
        let t = RigidTransform::from_quaternion([1.0, 0.0, 0.0], [0.0; 4]);
        let p = t.transform_point(&Vector3::new(1.0, 1.0, 1.0));
        assert_abs_diff_eq!(p, Vector3::new(2.0, 1.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn wrong_position_length_is_rejected() {
        let err = RigidTransform::new(Some(&[1.0, 2.0]), Some(&[0.0, 0.0, 0.0]), None).unwrap_err();
        assert!(matches!(err, FusionError::Configuration(_)));
    }

    #[test]
    fn wrong_rotation_length_is_rejected() {
        let err = RigidTransform::new(Some(&[1.0, 2.0, 3.0]), Some(&[0.0, 0.0]), None).unwrap_err();
        assert!(matches!(err, FusionError::Configuration(_)));
        let err =
            RigidTransform::new(Some(&[1.0, 2.0, 3.0]), Some(&[0.0; 5]), None).unwrap_err();
        assert!(matches!(err, FusionError::Configuration(_)));
    }

    #[test]
    fn conflicting_arguments_are_rejected() {
        let with_matrix =
            RigidTransform::new(Some(&[0.0; 3]), Some(&[0.0; 3]), Some(Matrix4::identity()));
        assert!(matches!(with_matrix, Err(FusionError::Configuration(_))));

        let position_only = RigidTransform::new(Some(&[0.0; 3]), None, None);
        assert!(matches!(position_only, Err(FusionError::Configuration(_))));

        let rotation_only = RigidTransform::new(None, Some(&[0.0; 3]), None);
        assert!(matches!(rotation_only, Err(FusionError::Configuration(_))));
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    #[test]
    fn translation_and_rotation_are_extracted() {
        let t = RigidTransform::from_quaternion([4.0, 5.0, 6.0], [FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2]);
        assert_abs_diff_eq!(t.translation(), Vector3::new(4.0, 5.0, 6.0), epsilon = 1e-12);
        let [w, x, y, z] = t.rotation();
        assert_abs_diff_eq!(w, FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z, FRAC_1_SQRT_2, epsilon = 1e-9);
    }

    #[test]
    fn rotation_is_reported_with_non_negative_w() {
        let t = RigidTransform::from_quaternion([0.0; 3], [-FRAC_1_SQRT_2, 0.0, 0.0, -FRAC_1_SQRT_2]);
        let [w, _, _, z] = t.rotation();
        assert!(w >= 0.0);
        assert_abs_diff_eq!(z, FRAC_1_SQRT_2, epsilon = 1e-9);
    }

    // ── Inverse & composition ───────────────────────────────────────────────

    #[test]
    fn inverse_undoes_the_transform() {
        let t = RigidTransform::from_euler([1.0, -2.0, 0.5], [0.1, 0.2, FRAC_PI_4]);
        let p = Vector3::new(3.0, 4.0, 5.0);
        let back = t.inverse().transform_point(&t.transform_point(&p));
        assert_abs_diff_eq!(back, p, epsilon = 1e-9);
        assert_abs_diff_eq!(t.matrix() * t.inverse_matrix(), Matrix4::identity(), epsilon = 1e-9);
        // The inverse of the inverse is the original matrix, exactly.
        assert_eq!(t.inverse().inverse_matrix(), t.matrix());
    }

    #[test]
    fn inverse_is_cached() {
        let t = RigidTransform::from_euler([1.0, 0.0, 0.0], [0.0, 0.0, FRAC_PI_2]);
        let first: *const Matrix4<f64> = t.inverse_matrix();
        let second: *const Matrix4<f64> = t.inverse_matrix();
        assert_eq!(first, second);
    }

    #[test]
    fn rigid_inverse_matches_general_inverse() {
        let t = RigidTransform::from_euler([7.0, 8.0, 9.0], [0.3, -0.2, 1.1]);
        let general = t.matrix().try_inverse().unwrap();
        assert_abs_diff_eq!(rigid_inverse(t.matrix()), general, epsilon = 1e-9);
    }

    #[test]
    fn compose_applies_right_operand_first() {
        // Vehicle yawed 90° at the origin, radar 1 m ahead on the vehicle.
        let vehicle = RigidTransform::from_euler([0.0; 3], [0.0, 0.0, FRAC_PI_2]);
        let radar = RigidTransform::from_euler([1.0, 0.0, 0.0], [0.0; 3]);
        let composed = vehicle.compose(&radar);
        assert_abs_diff_eq!(composed.translation(), Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn sensor_pose_is_converted_to_ego_pose() {
        // GPS antenna mounted 2 m ahead of the vehicle origin.
        let extrinsics = RigidTransform::from_euler([2.0, 0.0, 0.0], [0.0; 3]);
        // Antenna observed at (12, 5, 0) while the vehicle faces +Y.
        let antenna = RigidTransform::from_euler([12.0, 5.0, 0.0], [0.0, 0.0, FRAC_PI_2]);
        let ego = RigidTransform::localization_from_sensor_to_ego(&antenna, &extrinsics);
        assert_abs_diff_eq!(ego.translation(), Vector3::new(12.0, 3.0, 0.0), epsilon = 1e-12);
    }
}
