use crate::common::{
    mean_rgb, normalize_phi, normalize_theta, normalized_by_sum, push_f32_le, DEFAULT_PHI_STEPS,
    DEFAULT_THETA_STEPS, FLOAT_SIZE,
};
use crate::coordinates::cartesian_to_spherical;
use crate::error::{PhotonError, Result};
use crate::structures::{PhotonBundle, PhotonRecord};
use crate::transform::Transform;
use crate::vector::{normalized, Vector};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::fs;
use std::path::Path;

/// One photon expressed in the tangent frame of its query site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatParams {
    pub phi: f64,
    pub theta: f64,
    pub power: f64,
    pub depth: Option<f32>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplatStats {
    pub splatted: usize,
    /// Rejected by the representation, e.g. below the horizon.
    pub dropped: usize,
    /// Photons whose direction could not be computed.
    pub degenerate: usize,
}

impl SplatStats {
    #[inline]
    pub fn attempted(&self) -> usize {
        self.splatted + self.dropped + self.degenerate
    }

    /// Fraction of photons that made it into the representation. An empty
    /// bundle counts as fully splatted.
    pub fn ratio(&self) -> f64 {
        match self.attempted() {
            0 => 1.0,
            n => self.splatted as f64 / n as f64,
        }
    }

    pub fn merge(&mut self, other: &SplatStats) {
        self.splatted += other.splatted;
        self.dropped += other.dropped;
        self.degenerate += other.degenerate;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub phi_steps: usize,
    pub theta_steps: usize,
}

impl GridShape {
    pub fn new(phi_steps: usize, theta_steps: usize) -> Result<Self> {
        if phi_steps == 0 || theta_steps == 0 {
            return Err(PhotonError::InvalidGridShape {
                phi_steps,
                theta_steps,
            });
        }
        Ok(Self {
            phi_steps,
            theta_steps,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.phi_steps * self.theta_steps
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self {
            phi_steps: DEFAULT_PHI_STEPS,
            theta_steps: DEFAULT_THETA_STEPS,
        }
    }
}

/// Computes splat parameters for the photons of one bundle.
#[derive(Debug, Clone)]
pub struct PhotonGridAdapter {
    position: Vector,
    to_tangent: Transform,
}

impl PhotonGridAdapter {
    pub fn new(bundle: &PhotonBundle) -> Result<Self> {
        Ok(Self {
            position: bundle.position,
            to_tangent: Transform::tangent_frame(bundle.normal, bundle.wi)?,
        })
    }

    /// Direction from the query point towards the photon's source, in
    /// spherical tangent coordinates, with the RGB power averaged.
    ///
    /// Fails when the source coincides with the query position.
    pub fn splat_params(&self, photon: &PhotonRecord) -> Result<SplatParams> {
        let direction_world = normalized(photon.source - self.position)?;
        let direction = self.to_tangent.transform_direction(direction_world);
        let (phi, theta) = cartesian_to_spherical(direction);

        Ok(SplatParams {
            phi,
            theta,
            power: mean_rgb(photon.power),
            depth: photon.depth,
        })
    }
}

pub trait PhotonRepresentation {
    /// Adds one photon. Returns `false` if the representation rejected it.
    fn splat(&mut self, params: &SplatParams) -> bool;

    /// Normalized binary form of the representation.
    fn to_dat_bytes(&self) -> Vec<u8>;

    fn export_dat(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_dat_bytes()).map_err(|e| PhotonError::io(path, e))
    }
}

/// Histogram over the upper hemisphere, `phi` in `[0, 2π)` and `theta` in
/// `[0, π/2]`. Cells are stored theta-major: `phi_steps * theta_step + phi_step`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiThetaGrid {
    shape: GridShape,
    cells: Vec<f64>,
}

impl PhiThetaGrid {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            cells: vec![0.0; shape.len()],
        }
    }

    pub fn with_steps(phi_steps: usize, theta_steps: usize) -> Result<Self> {
        Ok(Self::new(GridShape::new(phi_steps, theta_steps)?))
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Unnormalized mass per cell.
    #[inline]
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn total_mass(&self) -> f64 {
        self.cells.iter().sum()
    }

    /// Cell for `(phi, theta)`, or `None` when it falls outside the grid.
    ///
    /// A direction exactly on the horizon (`theta == π/2`) belongs to the last
    /// theta row. Anything further below is outside the sampled hemisphere.
    pub fn index(&self, phi: f64, theta: f64) -> Option<usize> {
        if !phi.is_finite() || !theta.is_finite() {
            return None;
        }
        let phi_steps = self.shape.phi_steps as i64;
        let theta_steps = self.shape.theta_steps as i64;

        let phi_step = (phi / TAU * phi_steps as f64).floor() as i64;
        let theta_step = if theta == FRAC_PI_2 {
            theta_steps - 1
        } else {
            (theta / FRAC_PI_2 * theta_steps as f64).floor() as i64
        };

        // Far out-of-range angles saturate the casts above.
        let index = phi_steps
            .checked_mul(theta_step)
            .and_then(|row| row.checked_add(phi_step))?;
        if (0..phi_steps * theta_steps).contains(&index) {
            Some(index as usize)
        } else {
            None
        }
    }

    /// `(phi_step, theta_step)` of a flat cell index.
    #[inline]
    pub fn steps_from_index(&self, index: usize) -> (usize, usize) {
        (index % self.shape.phi_steps, index / self.shape.phi_steps)
    }

    /// Direction at the middle of a cell.
    pub fn cell_center(&self, index: usize) -> Option<(f64, f64)> {
        if index >= self.cells.len() {
            return None;
        }
        let (phi_step, theta_step) = self.steps_from_index(index);
        let phi = TAU * (phi_step as f64 + 0.5) / self.shape.phi_steps as f64;
        let theta = FRAC_PI_2 * (theta_step as f64 + 0.5) / self.shape.theta_steps as f64;
        Some((phi, theta))
    }

    /// Cells divided by the total mass; all zero when nothing was splatted.
    pub fn pdf(&self) -> Vec<f64> {
        normalized_by_sum(self.cells.iter().copied())
    }

    /// [`PhiThetaGrid::pdf`] split into one row per theta step.
    pub fn pdf_rows(&self) -> Vec<Vec<f64>> {
        self.pdf()
            .chunks_exact(self.shape.phi_steps)
            .map(<[f64]>::to_vec)
            .collect()
    }
}

impl PhotonRepresentation for PhiThetaGrid {
    fn splat(&mut self, params: &SplatParams) -> bool {
        match self.index(params.phi, params.theta) {
            Some(index) => {
                self.cells[index] += params.power;
                true
            }
            None => false,
        }
    }

    fn to_dat_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.cells.len() * FLOAT_SIZE);
        for p in self.pdf() {
            push_f32_le(&mut out, p as f32);
        }
        out
    }
}

/// Unbinned per-photon dataset. Coordinates are remapped into `[-0.5, 0.5]`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FatPhotonDataset {
    include_depth: bool,
    horizon_filter: bool,
    coordinates: Vec<(f64, f64)>,
    values: Vec<f64>,
    depths: Vec<Option<f32>>,
}

impl FatPhotonDataset {
    /// With `include_depth` every exported tuple carries a fourth float; photons
    /// without a depth write 0.
    pub fn new(include_depth: bool) -> Self {
        Self {
            include_depth,
            ..Default::default()
        }
    }

    /// Rejects photons with `theta > π/2` instead of keeping them.
    pub fn with_horizon_filter(mut self) -> Self {
        self.horizon_filter = true;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn floats_per_photon(&self) -> usize {
        if self.include_depth {
            4
        } else {
            3
        }
    }

    pub fn coordinates(&self) -> &[(f64, f64)] {
        &self.coordinates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl PhotonRepresentation for FatPhotonDataset {
    fn splat(&mut self, params: &SplatParams) -> bool {
        if self.horizon_filter && params.theta > FRAC_PI_2 {
            return false;
        }

        self.coordinates
            .push((normalize_phi(params.phi), normalize_theta(params.theta)));
        self.values.push(params.power);
        self.depths.push(params.depth);
        true
    }

    fn to_dat_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.floats_per_photon() * FLOAT_SIZE);
        let values = normalized_by_sum(self.values.iter().copied());

        for ((&(phi, theta), value), depth) in
            self.coordinates.iter().zip(values).zip(&self.depths)
        {
            push_f32_le(&mut out, phi as f32);
            push_f32_le(&mut out, theta as f32);
            push_f32_le(&mut out, value as f32);
            if self.include_depth {
                push_f32_le(&mut out, depth.unwrap_or(0.0));
            }
        }
        out
    }
}

/// Splats every photon of `bundle` into `representation`.
///
/// A photon with no usable direction is skipped and counted rather than
/// failing the bundle. Only a bundle whose normal is zero fails as a whole.
pub fn build_grid<R>(bundle: &PhotonBundle, representation: &mut R) -> Result<SplatStats>
where
    R: PhotonRepresentation + ?Sized,
{
    let adapter = PhotonGridAdapter::new(bundle)?;
    let mut stats = SplatStats::default();

    for (i, photon) in bundle.photons.iter().enumerate() {
        match adapter.splat_params(photon) {
            Ok(params) => {
                if representation.splat(&params) {
                    stats.splatted += 1;
                } else {
                    stats.dropped += 1;
                }
            }
            Err(e) => {
                log::trace!("Skipping photon {}: {}", i, e);
                stats.degenerate += 1;
            }
        }
    }

    log::debug!(
        "Splatted {}/{} photons ({:.1}%), {} degenerate",
        stats.splatted,
        stats.attempted(),
        stats.ratio() * 100.0,
        stats.degenerate
    );

    Ok(stats)
}
