use std::{io, path::PathBuf};

pub type Result<T> = std::result::Result<T, PhotonError>;

#[derive(Debug, thiserror::Error)]
pub enum PhotonError {
    #[error("Failed to decode photon bundle: {0}")]
    Decode(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Invalid grid shape {phi_steps}x{theta_steps}, both dimensions must be non-zero")]
    InvalidGridShape { phi_steps: usize, theta_steps: usize },

    #[error("Length mismatch: {left} values vs {right} values")]
    LengthMismatch { left: usize, right: usize },

    #[error("Malformed dat file {path:?}: {reason}")]
    MalformedDat { path: PathBuf, reason: String },

    #[error("EXR error for {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: exr::error::Error,
    },

    #[error("I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build the worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl PhotonError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PhotonError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: exr::error::Error) -> Self {
        PhotonError::Image {
            path: path.into(),
            source,
        }
    }
}
