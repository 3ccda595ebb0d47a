use std::path::Path;

use anyhow::Result;

use crate::fits;
use crate::mosaic;
use crate::reproject;
use crate::types::ImageInput;

/// Transform a FITS image so that it is in equatorial (ICRS) coordinates
/// with a TAN projection and 32-bit floating-point values, the format
/// visualization clients such as WWT require.
///
/// `image` can be a file path, an [`ImageHdu`](crate::ImageHdu), or an
/// `(array, WCS)` pair. The result is written to `output_file`; with
/// `overwrite=false` an existing file at that path is an error and is left
/// untouched.
///
/// The pipeline is linear: determine the optimal ICRS/TAN output grid,
/// resample the input onto it, cast to f32 and write. Failures at any step
/// propagate unchanged and no output file is produced.
pub fn sanitize_image<I, P>(image: I, output_file: P, overwrite: bool) -> Result<()>
where
    I: Into<ImageInput>,
    P: AsRef<Path>,
{
    let hdu = image.into().resolve()?;

    let (wcs, shape_out) = mosaic::optimal_celestial_wcs(&[&hdu])?;
    let (array, _footprint) = reproject::reproject_interp(&hdu, &wcs, shape_out)?;

    let array32 = array.mapv(|v| v as f32);
    fits::write_image_f32(output_file.as_ref(), &array32, &wcs, overwrite)
}
