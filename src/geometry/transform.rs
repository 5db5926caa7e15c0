// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Affine transformations passed to the geometry backend

use nalgebra::{Matrix3, Matrix4, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Transformation operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformOp {
    Translate(Vector3<f64>),
    /// Euler angles in degrees, applied X then Y then Z
    Rotate(Vector3<f64>),
    /// Rotation in degrees about an arbitrary axis
    RotateAxis { angle: f64, axis: Vector3<f64> },
    Scale(Vector3<f64>),
    /// Reflection through the plane with this normal
    Mirror(Vector3<f64>),
    Multmatrix(Matrix4<f64>),
}

impl TransformOp {
    /// Convert transformation to a 4x4 matrix
    pub fn to_matrix(&self) -> Matrix4<f64> {
        match self {
            TransformOp::Translate(v) => Matrix4::new_translation(v),
            TransformOp::Rotate(angles) => {
                let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angles.x.to_radians());
                let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angles.y.to_radians());
                let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles.z.to_radians());
                (rz * ry * rx).to_homogeneous()
            }
            TransformOp::RotateAxis { angle, axis } => {
                if axis.norm() == 0.0 {
                    return Matrix4::identity();
                }
                let axis = Unit::new_normalize(*axis);
                UnitQuaternion::from_axis_angle(&axis, angle.to_radians()).to_homogeneous()
            }
            TransformOp::Scale(s) => Matrix4::new_nonuniform_scaling(s),
            TransformOp::Mirror(normal) => {
                let len = normal.norm();
                if len == 0.0 {
                    return Matrix4::identity();
                }
                let n = normal / len;
                let reflect = Matrix3::identity() - 2.0 * n * n.transpose();
                reflect.to_homogeneous()
            }
            TransformOp::Multmatrix(m) => *m,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Translate(_) => "translate",
            TransformOp::Rotate(_) | TransformOp::RotateAxis { .. } => "rotate",
            TransformOp::Scale(_) => "scale",
            TransformOp::Mirror(_) => "mirror",
            TransformOp::Multmatrix(_) => "multmatrix",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_translate_matrix() {
        let m = TransformOp::Translate(Vector3::new(1.0, 2.0, 3.0)).to_matrix();
        let p = m.transform_point(&Point3::origin());
        assert_relative_eq!(p, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rotate_z() {
        let m = TransformOp::Rotate(Vector3::new(0.0, 0.0, 90.0)).to_matrix();
        let p = m.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_mirror_diagonal_plane() {
        let m = TransformOp::Mirror(Vector3::new(1.0, 1.0, 0.0)).to_matrix();
        let p = m.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }
}
