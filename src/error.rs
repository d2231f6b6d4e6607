use std::{io, path::Path, path::PathBuf, process::ExitStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open raster {}: {reason}", path.display())]
    RasterOpen { path: PathBuf, reason: String },

    #[error("raster {} has no valid spatial reference: {reason}", path.display())]
    SpatialReference { path: PathBuf, reason: String },

    #[error("cannot reproject raster extent to EPSG:4326: {0}")]
    Reprojection(String),

    #[error("rendering engine component not found: {0}")]
    EngineMissing(String),

    #[error("rendering engine failed ({status}): {stderr}")]
    EngineFailed { status: ExitStatus, stderr: String },

    #[error("image error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches the path an I/O operation was working on.
pub trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
