pub mod batch;
pub mod common;
pub mod coordinates;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod structures;
pub mod transform;
pub mod vector;

use error::{PhotonError, Result};
use std::fs;
use std::path::Path;
use structures::vector_from_raw;
use structures::vector_to_raw;
use structures::RawBundleHeader;
use structures::RawDepthPhoton;
use structures::RawPhoton;
use structures::HEADER_SIZE;
use zerocopy::byteorder::little_endian::{F32, I32};
use zerocopy::{FromBytes, IntoBytes};

pub use grid::{
    build_grid, FatPhotonDataset, GridShape, PhiThetaGrid, PhotonGridAdapter,
    PhotonRepresentation, SplatParams, SplatStats,
};
pub use structures::{PhotonBundle, PhotonFormat, PhotonRecord};
pub use transform::Transform;
pub use vector::Vector;

fn decode_records<T>(body: &[u8], count: usize) -> Result<&[T]>
where
    T: FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
{
    <[T]>::ref_from_prefix_with_elems(body, count)
        .map(|(records, _)| records)
        .map_err(|_| PhotonError::Decode("Photon records are malformed".to_string()))
}

/// Decodes one photon bundle as written by the renderer.
///
/// The buffer must hold exactly the header plus `photon_count` records of the
/// given format. Photon values are not validated.
pub fn parse_bundle(raw_data: &[u8], format: PhotonFormat) -> Result<PhotonBundle> {
    let (header, body) = RawBundleHeader::ref_from_prefix(raw_data).map_err(|_| {
        PhotonError::Decode(format!(
            "Header is too short, need {} bytes, have {}",
            HEADER_SIZE,
            raw_data.len()
        ))
    })?;

    let count = header.photon_count.get();
    if count < 0 {
        return Err(PhotonError::Decode(format!(
            "Negative photon count: {}",
            count
        )));
    }
    let count = count as usize;

    let expected_bytes = count
        .checked_mul(format.record_size())
        .ok_or_else(|| PhotonError::Decode("Overflow in byte calculation".to_string()))?;
    if body.len() < expected_bytes {
        return Err(PhotonError::Decode(format!(
            "Photon data is too short, need {} bytes for {} photons, have {}",
            expected_bytes,
            count,
            body.len()
        )));
    }
    if body.len() > expected_bytes {
        return Err(PhotonError::Decode(format!(
            "{} trailing bytes after {} photons (wrong format {:?}?)",
            body.len() - expected_bytes,
            count,
            format
        )));
    }

    let photons = match format {
        PhotonFormat::V1 => decode_records::<RawPhoton>(body, count)?
            .iter()
            .map(|raw| PhotonRecord::from_raw(raw, None))
            .collect(),
        PhotonFormat::WithDepth => decode_records::<RawDepthPhoton>(body, count)?
            .iter()
            .map(|raw| PhotonRecord::from_raw(&raw.photon, Some(raw.depth.get())))
            .collect(),
    };

    Ok(PhotonBundle {
        position: vector_from_raw(&header.position),
        normal: vector_from_raw(&header.normal),
        wi: vector_from_raw(&header.wi),
        format,
        photons,
    })
}

/// Encodes a bundle in the renderer's layout. Inverse of [`parse_bundle`] for
/// any bundle whose values are representable as f32.
pub fn serialize_bundle(bundle: &PhotonBundle) -> Result<Vec<u8>> {
    let count = i32::try_from(bundle.photons.len()).map_err(|_| {
        PhotonError::Decode(format!(
            "Too many photons for one bundle: {}",
            bundle.photons.len()
        ))
    })?;

    let header = RawBundleHeader {
        position: vector_to_raw(bundle.position),
        normal: vector_to_raw(bundle.normal),
        wi: vector_to_raw(bundle.wi),
        photon_count: I32::new(count),
    };

    let mut out =
        Vec::with_capacity(HEADER_SIZE + bundle.photons.len() * bundle.format.record_size());
    out.extend_from_slice(header.as_bytes());

    for photon in &bundle.photons {
        let raw = photon.to_raw();
        match bundle.format {
            PhotonFormat::V1 => out.extend_from_slice(raw.as_bytes()),
            PhotonFormat::WithDepth => {
                let raw = RawDepthPhoton {
                    photon: raw,
                    depth: F32::new(photon.depth.unwrap_or(0.0)),
                };
                out.extend_from_slice(raw.as_bytes());
            }
        }
    }
    Ok(out)
}

pub fn read_bundle(path: &Path, format: PhotonFormat) -> Result<PhotonBundle> {
    let raw_data = fs::read(path).map_err(|e| PhotonError::io(path, e))?;
    let bundle = parse_bundle(&raw_data, format)?;
    log::debug!("Decoded {} photons from {:?}", bundle.len(), path);
    Ok(bundle)
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    #[inline(never)]
    pub async fn read_bundle_async(path: &Path, format: PhotonFormat) -> Result<PhotonBundle> {
        let raw_data = tokio::fs::read(path)
            .await
            .map_err(|e| PhotonError::io(path, e))?;
        let bundle = parse_bundle(&raw_data, format)?;
        log::debug!("Decoded {} photons from {:?}", bundle.len(), path);
        Ok(bundle)
    }
}
}
