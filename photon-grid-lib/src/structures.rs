use crate::vector::Vector;
use std::fmt;
use zerocopy::byteorder::little_endian::{F32, I32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const HEADER_SIZE: usize = size_of::<RawBundleHeader>();

/// Record layout of a photon bundle. The renderer does not tag its files, so
/// the caller has to say which revision it is reading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotonFormat {
    /// position, source, power: 9 floats per photon.
    #[default]
    V1,
    /// V1 followed by the bounce depth stored as a float: 10 floats per photon.
    WithDepth,
}

impl PhotonFormat {
    #[inline]
    pub const fn has_depth(self) -> bool {
        matches!(self, PhotonFormat::WithDepth)
    }

    #[inline]
    pub const fn record_size(self) -> usize {
        match self {
            PhotonFormat::V1 => size_of::<RawPhoton>(),
            PhotonFormat::WithDepth => size_of::<RawDepthPhoton>(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub(crate) struct RawBundleHeader {
    pub position: [F32; 3],
    pub normal: [F32; 3],
    pub wi: [F32; 3],
    pub photon_count: I32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub(crate) struct RawPhoton {
    pub position: [F32; 3],
    pub source: [F32; 3],
    pub power: [F32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub(crate) struct RawDepthPhoton {
    pub photon: RawPhoton,
    pub depth: F32,
}

#[inline]
pub(crate) fn vector_from_raw(raw: &[F32; 3]) -> Vector {
    Vector::new(raw[0].get() as f64, raw[1].get() as f64, raw[2].get() as f64)
}

#[inline]
pub(crate) fn vector_to_raw(v: Vector) -> [F32; 3] {
    [
        F32::new(v.x as f32),
        F32::new(v.y as f32),
        F32::new(v.z as f32),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotonRecord {
    pub position: Vector,
    pub source: Vector,
    pub power: [f32; 3],
    pub depth: Option<f32>,
}

impl PhotonRecord {
    pub(crate) fn from_raw(raw: &RawPhoton, depth: Option<f32>) -> Self {
        Self {
            position: vector_from_raw(&raw.position),
            source: vector_from_raw(&raw.source),
            power: raw.power.map(|p| p.get()),
            depth,
        }
    }

    pub(crate) fn to_raw(&self) -> RawPhoton {
        RawPhoton {
            position: vector_to_raw(self.position),
            source: vector_to_raw(self.source),
            power: self.power.map(F32::new),
        }
    }
}

impl fmt::Display for PhotonRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}, {:.6}) - ({:.6}, {:.6}, {:.6}) - ({:.6}, {:.6}, {:.6})",
            self.position.x,
            self.position.y,
            self.position.z,
            self.source.x,
            self.source.y,
            self.source.z,
            self.power[0],
            self.power[1],
            self.power[2],
        )?;
        if let Some(depth) = self.depth {
            write!(f, " - depth {}", depth)?;
        }
        Ok(())
    }
}

/// All photons recorded for one query site.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotonBundle {
    pub position: Vector,
    pub normal: Vector,
    pub wi: Vector,
    pub format: PhotonFormat,
    pub photons: Vec<PhotonRecord>,
}

impl PhotonBundle {
    #[inline]
    pub fn len(&self) -> usize {
        self.photons.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }
}
