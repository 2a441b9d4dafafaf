use std::f64::consts::{FRAC_PI_2, TAU};

pub const FLOAT_SIZE: usize = 4;

pub const DEFAULT_PHI_STEPS: usize = 64;
pub const DEFAULT_THETA_STEPS: usize = 16;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_MIN_SPLAT_RATIO: f64 = 0.9;

#[inline]
pub(crate) fn mean_rgb(power: [f32; 3]) -> f64 {
    (power[0] as f64 + power[1] as f64 + power[2] as f64) / 3.0
}

/// Maps `phi` from `[0, 2π)` onto `[-0.5, 0.5)`.
#[inline]
pub(crate) fn normalize_phi(phi: f64) -> f64 {
    phi / TAU - 0.5
}

/// Maps `theta` from `[0, π/2]` onto `[-0.5, 0.5]`.
#[inline]
pub(crate) fn normalize_theta(theta: f64) -> f64 {
    theta / FRAC_PI_2 - 0.5
}

/// Divides every value by the total. A zero total yields zeros.
pub(crate) fn normalized_by_sum<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let sum: f64 = iter.clone().sum();
    if sum == 0.0 {
        iter.map(|_| 0.0).collect()
    } else {
        iter.map(|v| v / sum).collect()
    }
}

#[inline]
pub(crate) fn push_f32_le(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}
