use anyhow::{bail, Context, Result};
use ndarray::Array2;
use rayon::prelude::*;

use crate::types::ImageHdu;
use crate::wcs::Wcs;

/// Resample an image onto a new coordinate system by bilinear interpolation.
///
/// Every output pixel center is mapped through `wcs_out` to the sky and back
/// through the input's WCS; the four surrounding input pixels are blended.
/// Output pixels with no input correspondence are NaN. The second array is
/// the footprint: 1.0 where the output pixel falls on the input grid, 0.0
/// elsewhere (NaN input values still count as covered).
///
/// Returns `(data, footprint)`, both of shape `shape_out` = (height, width).
pub fn reproject_interp(
    input: &ImageHdu,
    wcs_out: &Wcs,
    shape_out: (usize, usize),
) -> Result<(Array2<f64>, Array2<f64>)> {
    let (in_height, in_width) = input.data.dim();
    if in_height == 0 || in_width == 0 {
        bail!("Input image has no pixels");
    }
    let (out_height, out_width) = shape_out;
    if out_height == 0 || out_width == 0 {
        bail!("Output grid has no pixels");
    }
    input.wcs.check_finite()?;
    wcs_out.check_finite()?;

    let in_data: Vec<f64> = match input.data.as_slice() {
        Some(s) => s.to_vec(),
        None => input.data.iter().copied().collect(),
    };
    let in_wcs = &input.wcs;

    let mut out = vec![f64::NAN; out_height * out_width];
    let mut footprint = vec![0.0f64; out_height * out_width];

    out.par_chunks_mut(out_width)
        .zip(footprint.par_chunks_mut(out_width))
        .enumerate()
        .for_each(|(y, (row, fp_row))| {
            for x in 0..out_width {
                let (ra, dec) = wcs_out.pixel_to_sky(x as f64, y as f64);
                let Some((px, py)) = in_wcs.sky_to_pixel(ra, dec) else {
                    continue;
                };
                // Bilinear interpolation is defined on [0, n-1] only.
                if px < 0.0 || py < 0.0 || px > (in_width - 1) as f64 || py > (in_height - 1) as f64
                {
                    continue;
                }

                let x0 = px.floor() as usize;
                let y0 = py.floor() as usize;
                let x1 = (x0 + 1).min(in_width - 1);
                let y1 = (y0 + 1).min(in_height - 1);
                let tx = px - x0 as f64;
                let ty = py - y0 as f64;

                let v00 = in_data[y0 * in_width + x0];
                let v01 = in_data[y0 * in_width + x1];
                let v10 = in_data[y1 * in_width + x0];
                let v11 = in_data[y1 * in_width + x1];

                row[x] = v00 * (1.0 - tx) * (1.0 - ty)
                    + v01 * tx * (1.0 - ty)
                    + v10 * (1.0 - tx) * ty
                    + v11 * tx * ty;
                fp_row[x] = 1.0;
            }
        });

    let data = Array2::from_shape_vec(shape_out, out).context("Failed to shape output array")?;
    let footprint =
        Array2::from_shape_vec(shape_out, footprint).context("Failed to shape footprint")?;
    Ok((data, footprint))
}
