use crate::vector::Vector;
use std::f64::consts::TAU;

/// Returns `(phi, theta)` for a unit vector, with `phi` in `[0, 2π)`.
/// Theta is measured from +y and phi runs from +x towards +z.
///
/// `v.y` is clamped to `[-1, 1]` so a vector that is only approximately unit
/// length does not turn into a NaN theta.
pub fn cartesian_to_spherical(v: Vector) -> (f64, f64) {
    let mut phi = v.z.atan2(v.x);
    if phi < 0.0 {
        phi += TAU;
    }
    if phi >= TAU {
        phi = 0.0;
    }

    let theta = v.y.clamp(-1.0, 1.0).acos();

    (phi, theta)
}

pub fn spherical_to_cartesian(phi: f64, theta: f64) -> Vector {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();

    Vector::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_round_trip_over_sphere() {
        let steps = 64;
        for i in 0..=steps {
            let theta = PI * i as f64 / steps as f64;
            for j in 0..steps {
                let phi = TAU * j as f64 / steps as f64;
                let v = spherical_to_cartesian(phi, theta);
                let (p, t) = cartesian_to_spherical(v);
                let back = spherical_to_cartesian(p, t);
                assert!(
                    (back - v).abs().max_element() < 1e-9,
                    "round trip failed for phi={} theta={}",
                    phi,
                    theta
                );
            }
        }
    }

    #[test]
    fn test_phi_is_wrapped() {
        let steps = 720;
        for i in 0..steps {
            let angle = TAU * i as f64 / steps as f64;
            let v = Vector::new(angle.cos(), 0.3, angle.sin());
            let (phi, _) = cartesian_to_spherical(v);
            assert!((0.0..TAU).contains(&phi), "phi {} out of range", phi);
        }

        // atan2(-0.0, -1) is -π, which must come back as +π.
        let (phi, _) = cartesian_to_spherical(Vector::new(-1.0, 0.0, -0.0));
        assert_eq!(phi, PI);

        // Just below the +x axis on the negative z side rounds up to 2π.
        let (phi, _) = cartesian_to_spherical(Vector::new(1.0, 0.0, -1e-17));
        assert!(phi < TAU);
    }

    #[test]
    fn test_axes() {
        assert_eq!(cartesian_to_spherical(Vector::Y), (0.0, 0.0));
        let (phi, theta) = cartesian_to_spherical(Vector::Z);
        assert!((phi - FRAC_PI_2).abs() < 1e-12);
        assert!((theta - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_y_is_clamped() {
        let (_, theta) = cartesian_to_spherical(Vector::new(0.0, 1.0 + 1e-12, 0.0));
        assert_eq!(theta, 0.0);
        let (_, theta) = cartesian_to_spherical(Vector::new(0.0, -1.0 - 1e-12, 0.0));
        assert_eq!(theta, PI);
    }
}
