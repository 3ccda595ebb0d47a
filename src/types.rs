use std::path::{Path, PathBuf};

use anyhow::Result;
use ndarray::Array2;

use crate::fits;
use crate::wcs::Wcs;

/// An in-memory primary header-data-unit: the pixel grid and its WCS.
#[derive(Debug, Clone)]
pub struct ImageHdu {
    /// Row-major image plane, `data[[y, x]]` with y along NAXIS2.
    pub data: Array2<f64>,
    pub wcs: Wcs,
}

/// The three accepted image representations.
///
/// Callers never branch on type: anything convertible into this enum is a
/// valid argument to [`sanitize_image`](crate::sanitize_image).
#[derive(Debug)]
pub enum ImageInput {
    /// Path to a FITS file on disk.
    Path(PathBuf),
    /// An already-loaded HDU.
    Hdu(ImageHdu),
    /// A bare pixel array paired with its coordinate system.
    Array(Array2<f64>, Wcs),
}

impl ImageInput {
    /// Load or repackage the input into an [`ImageHdu`].
    pub fn resolve(self) -> Result<ImageHdu> {
        match self {
            ImageInput::Path(path) => fits::read_image(&path),
            ImageInput::Hdu(hdu) => Ok(hdu),
            ImageInput::Array(data, wcs) => Ok(ImageHdu { data, wcs }),
        }
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<&str> for ImageInput {
    fn from(path: &str) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

impl From<ImageHdu> for ImageInput {
    fn from(hdu: ImageHdu) -> Self {
        ImageInput::Hdu(hdu)
    }
}

impl From<(Array2<f64>, Wcs)> for ImageInput {
    fn from((data, wcs): (Array2<f64>, Wcs)) -> Self {
        ImageInput::Array(data, wcs)
    }
}
