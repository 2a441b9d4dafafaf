use crate::common::{normalized_by_sum, FLOAT_SIZE};
use crate::error::{PhotonError, Result};
use std::fs;
use std::path::Path;

/// Divides by the total; a zero total yields zeros.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    normalized_by_sum(values.iter().copied())
}

fn check_lengths(p: &[f64], q: &[f64]) -> Result<()> {
    if p.len() != q.len() {
        return Err(PhotonError::LengthMismatch {
            left: p.len(),
            right: q.len(),
        });
    }
    Ok(())
}

fn normalized_pair(p: &[f64], q: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    check_lengths(p, q)?;
    Ok((normalize(p), normalize(q)))
}

/// `Σ p ln(p / q)` over cells where both are non-zero.
pub fn kl_divergence(p: &[f64], q: &[f64]) -> Result<f64> {
    let (p, q) = normalized_pair(p, q)?;
    Ok(p.iter()
        .zip(&q)
        .filter(|(&p, &q)| p != 0.0 && q != 0.0)
        .map(|(&p, &q)| p * (p / q).ln())
        .sum())
}

/// Pearson chi-squared, `Σ (p - q)² / q` over cells where `q` is non-zero.
pub fn chi_squared(p: &[f64], q: &[f64]) -> Result<f64> {
    let (p, q) = normalized_pair(p, q)?;
    Ok(p.iter()
        .zip(&q)
        .filter(|(_, &q)| q != 0.0)
        .map(|(&p, &q)| (p - q) * (p - q) / q)
        .sum())
}

pub fn l1_distance(p: &[f64], q: &[f64]) -> Result<f64> {
    let (p, q) = normalized_pair(p, q)?;
    Ok(p.iter().zip(&q).map(|(p, q)| (p - q).abs()).sum())
}

pub fn l2_distance(p: &[f64], q: &[f64]) -> Result<f64> {
    let (p, q) = normalized_pair(p, q)?;
    Ok(p.iter()
        .zip(&q)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divergence {
    pub kl: f64,
    pub chi_squared: f64,
    pub l1: f64,
    pub l2: f64,
}

impl Divergence {
    pub fn between(p: &[f64], q: &[f64]) -> Result<Self> {
        Ok(Self {
            kl: kl_divergence(p, q)?,
            chi_squared: chi_squared(p, q)?,
            l1: l1_distance(p, q)?,
            l2: l2_distance(p, q)?,
        })
    }
}

pub fn sample_mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Unbiased sample variance. Needs at least two samples.
pub fn sample_variance(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let mean = sample_mean(samples)?;
    let squares: f64 = samples.iter().map(|s| (s - mean) * (s - mean)).sum();
    Some(squares / (samples.len() - 1) as f64)
}

/// Reads a flat little-endian f32 export back into memory.
pub fn read_dat(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).map_err(|e| PhotonError::io(path, e))?;
    if bytes.len() % FLOAT_SIZE != 0 {
        return Err(PhotonError::MalformedDat {
            path: path.to_path_buf(),
            reason: format!("{} bytes is not a whole number of floats", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(FLOAT_SIZE)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Reads the red channel of an EXR's first layer, flattened row by row.
pub fn read_exr(path: &Path) -> Result<Vec<f32>> {
    let image = exr::prelude::read_first_rgba_layer_from_file(
        path,
        |resolution, _| {
            let width = resolution.width();
            (width, vec![0.0f32; width * resolution.height()])
        },
        |(width, values): &mut (usize, Vec<f32>), position, (r, _, _, _): (f32, f32, f32, f32)| {
            values[position.y() * *width + position.x()] = r;
        },
    )
    .map_err(|e| PhotonError::image(path, e))?;

    Ok(image.layer_data.channel_data.pixels.1)
}

/// Reads a distribution from an `.exr` image or a `.dat` export.
pub fn read_distribution(path: &Path) -> Result<Vec<f32>> {
    let is_exr = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exr"));
    if is_exr {
        read_exr(path)
    } else {
        read_dat(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PdfImage;

    #[test]
    fn test_identical_histograms() {
        let p = [1.0, 2.0, 0.0, 5.0];
        let d = Divergence::between(&p, &p).unwrap();
        assert_eq!(d.kl, 0.0);
        assert_eq!(d.chi_squared, 0.0);
        assert_eq!(d.l1, 0.0);
        assert_eq!(d.l2, 0.0);
    }

    #[test]
    fn test_scale_invariance() {
        let p = [1.0, 3.0];
        let q = [10.0, 30.0];
        assert!(kl_divergence(&p, &q).unwrap().abs() < 1e-15);
        assert!(l1_distance(&p, &q).unwrap() < 1e-15);
    }

    #[test]
    fn test_known_values() {
        let p = [1.0, 0.0];
        let q = [0.5, 0.5];
        assert!((kl_divergence(&p, &q).unwrap() - 2f64.ln()).abs() < 1e-12);
        assert!((chi_squared(&p, &q).unwrap() - 1.0).abs() < 1e-12);
        assert!((l1_distance(&p, &q).unwrap() - 1.0).abs() < 1e-12);
        assert!((l2_distance(&p, &q).unwrap() - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_histograms() {
        let zero = [0.0; 3];
        assert_eq!(normalize(&zero), vec![0.0; 3]);
        assert_eq!(kl_divergence(&zero, &[1.0, 1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = kl_divergence(&[1.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            PhotonError::LengthMismatch { left: 1, right: 2 }
        ));
    }

    #[test]
    fn test_sample_statistics() {
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(sample_mean(&samples), Some(5.0));
        assert!((sample_variance(&samples).unwrap() - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[1.0]), None);
        assert_eq!(sample_mean(&[]), None);
    }

    #[test]
    fn test_read_dat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.dat");
        let mut bytes = Vec::new();
        for f in [0.25f32, 0.75] {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        fs::write(&path, &bytes).unwrap();
        assert_eq!(read_dat(&path).unwrap(), vec![0.25, 0.75]);

        fs::write(&path, [0u8; 5]).unwrap();
        assert!(matches!(
            read_dat(&path),
            Err(PhotonError::MalformedDat { .. })
        ));
    }

    #[test]
    fn test_compare_exr_images() {
        let dir = tempfile::tempdir().unwrap();
        let reference = PdfImage {
            width: 2,
            height: 2,
            values: vec![0.1, 0.2, 0.3, 0.4],
        };
        let other = PdfImage {
            width: 2,
            height: 2,
            values: vec![0.4, 0.3, 0.2, 0.1],
        };
        let reference_path = dir.path().join("pdf_0001-block_0x0.exr");
        let other_path = dir.path().join("pdf_0002-block_0x0.exr");
        reference.write(&reference_path).unwrap();
        other.write(&other_path).unwrap();

        let to_f64 = |v: Vec<f32>| v.into_iter().map(f64::from).collect::<Vec<_>>();
        let p = to_f64(read_distribution(&reference_path).unwrap());
        let q = to_f64(read_distribution(&other_path).unwrap());
        assert_eq!(p.len(), 4);
        assert!((p[1] - 0.2).abs() < 1e-6);

        let same = Divergence::between(&p, &p).unwrap();
        assert_eq!(same.kl, 0.0);
        assert_eq!(same.l1, 0.0);

        let different = Divergence::between(&p, &q).unwrap();
        assert!(different.kl > 0.0);
        assert!(different.l1 > 0.0);
    }

    #[test]
    fn test_read_distribution_falls_back_to_dat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photon-bundle_00000.dat");
        let bytes: Vec<u8> = [0.25f32, 0.75].iter().flat_map(|f| f.to_le_bytes()).collect();
        fs::write(&path, bytes).unwrap();
        assert_eq!(read_distribution(&path).unwrap(), vec![0.25, 0.75]);

        let missing = dir.path().join("missing.exr");
        assert!(matches!(
            read_distribution(&missing),
            Err(PhotonError::Image { .. })
        ));
    }
}
