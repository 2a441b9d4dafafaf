use crate::error::{PhotonError, Result};
use crate::vector::{normalized, Vector};
use glam::{DMat4, DVec4};

/// Orthonormal tangent frame around a surface normal.
///
/// The frame's y axis is the normal and its x axis is perpendicular to both
/// the normal and the incident direction, so `wi` fixes the origin of phi.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: DMat4,
}

impl Transform {
    pub fn new(matrix: DMat4) -> Self {
        Self { matrix }
    }

    /// Tangent space to world space. Columns are `(x_axis, normal, z_axis)`.
    pub fn to_world(normal: Vector, wi: Vector) -> Result<Self> {
        let x_axis = normalized(normal.cross(wi)).map_err(|_| {
            PhotonError::DegenerateGeometry(format!(
                "normal ({}, {}, {}) and wi ({}, {}, {}) do not span a plane",
                normal.x, normal.y, normal.z, wi.x, wi.y, wi.z
            ))
        })?;
        let z_axis = normalized(normal.cross(x_axis))?;

        Ok(Self::new(DMat4::from_cols(
            x_axis.extend(0.0),
            normal.extend(0.0),
            z_axis.extend(0.0),
            DVec4::W,
        )))
    }

    /// World space to tangent space. The transpose is the inverse because the
    /// basis is orthonormal.
    pub fn to_tangent(normal: Vector, wi: Vector) -> Result<Self> {
        Ok(Self::to_world(normal, wi)?.transposed())
    }

    /// Like [`Transform::to_tangent`], but when `wi` is parallel to the normal
    /// a fixed world axis takes its place. The azimuth origin is arbitrary in
    /// that case. A zero normal is still an error.
    pub fn tangent_frame(normal: Vector, wi: Vector) -> Result<Self> {
        match Self::to_tangent(normal, wi) {
            Ok(frame) => Ok(frame),
            Err(_) => {
                normalized(normal)?;
                let reference = if normal.x.abs() < 0.9 {
                    Vector::X
                } else {
                    Vector::Z
                };
                log::debug!(
                    "wi ({}, {}, {}) is parallel to the normal, using ({}, {}, {}) as reference",
                    wi.x,
                    wi.y,
                    wi.z,
                    reference.x,
                    reference.y,
                    reference.z
                );
                Self::to_tangent(normal, reference)
            }
        }
    }

    pub fn transposed(&self) -> Self {
        Self::new(self.matrix.transpose())
    }

    /// Rotates a direction. The homogeneous component is 0 so translation
    /// never applies.
    #[inline]
    pub fn transform_direction(&self, direction: Vector) -> Vector {
        self.matrix.transform_vector3(direction)
    }

    pub fn matrix(&self) -> &DMat4 {
        &self.matrix
    }
}
