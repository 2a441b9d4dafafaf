use crate::error::{PhotonError, Result};

/// Double precision 3D vector. y is up.
pub type Vector = glam::DVec3;

/// Unit vector in the direction of `v`.
///
/// A zero-length (or non-finite) input has no direction and is reported as
/// degenerate geometry instead of producing NaNs.
#[inline]
pub fn normalized(v: Vector) -> Result<Vector> {
    v.try_normalize().ok_or_else(|| {
        PhotonError::DegenerateGeometry(format!(
            "cannot normalize ({}, {}, {})",
            v.x, v.y, v.z
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_unit_length() {
        let v = normalized(Vector::new(3.0, 0.0, 4.0)).unwrap();
        assert!((v.length() - 1.0).abs() < 1e-12);
        assert!((v.x - 0.6).abs() < 1e-12);
        assert!((v.z - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_zero_vector_fails() {
        let result = normalized(Vector::ZERO);
        assert!(matches!(result, Err(PhotonError::DegenerateGeometry(_))));
    }

    #[test]
    fn test_normalized_nan_fails() {
        assert!(normalized(Vector::new(f64::NAN, 1.0, 0.0)).is_err());
    }

    #[test]
    fn test_cross_and_dot() {
        let x = Vector::X;
        let y = Vector::Y;
        assert_eq!(x.cross(y), Vector::Z);
        assert_eq!(x.dot(y), 0.0);
        assert_eq!((Vector::new(2.0, 4.0, 6.0) - x) / 2.0, Vector::new(0.5, 2.0, 3.0));
    }
}
