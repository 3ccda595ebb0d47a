use anyhow::{bail, Result};

use crate::types::ImageHdu;
use crate::wcs::{self, Frame, Projection, Wcs};

/// Boundary samples per image edge. TAN curvature makes corner-only
/// bounding boxes undershoot for wide fields.
const EDGE_SAMPLES: usize = 16;

/// Compute an output WCS and grid shape that optimally cover the footprints
/// of the given images in an equatorial (ICRS) frame with a TAN projection.
///
/// The reference point is the spherical mean of the boundary samples, the
/// pixel scale is the finest input scale, and the orientation is north-up
/// with RA increasing to the left. Returns the WCS and `(height, width)`.
pub fn optimal_celestial_wcs(inputs: &[&ImageHdu]) -> Result<(Wcs, (usize, usize))> {
    if inputs.is_empty() {
        bail!("No input images given");
    }

    let mut boundary = Vec::new();
    let mut sum = [0.0f64; 3];
    let mut scale = f64::INFINITY;

    for hdu in inputs {
        let (height, width) = hdu.data.dim();
        if height == 0 || width == 0 {
            bail!("Input image has no pixels");
        }
        hdu.wcs.check_finite()?;
        scale = scale.min(hdu.wcs.pixel_scale());

        for (x, y) in boundary_pixels(width, height) {
            let (ra, dec) = hdu.wcs.pixel_to_sky(x, y);
            if !ra.is_finite() || !dec.is_finite() {
                bail!("Input image footprint maps to non-finite sky coordinates");
            }
            let v = wcs::sky_to_vec(ra, dec);
            sum[0] += v[0];
            sum[1] += v[1];
            sum[2] += v[2];
            boundary.push((ra, dec));
        }
    }

    if !scale.is_finite() || scale <= 0.0 {
        bail!("Could not determine a pixel scale from the input images");
    }

    let norm = (sum[0] * sum[0] + sum[1] * sum[1] + sum[2] * sum[2]).sqrt();
    if norm < 1e-9 * boundary.len() as f64 {
        bail!("Input footprint is degenerate: no well-defined center on the sky");
    }
    let (ra0, dec0) = wcs::vec_to_sky(sum);

    // Provisional output WCS with the reference point at pixel (0, 0);
    // CRPIX and the grid shape come from the projected bounding box.
    let mut out = Wcs {
        crval: [ra0.to_degrees(), dec0.to_degrees()],
        crpix: [1.0, 1.0],
        cd: [[-scale, 0.0], [0.0, scale]],
        frame: Frame::Icrs,
        projection: Projection::Tan,
    };

    let mut xmin = f64::INFINITY;
    let mut xmax = f64::NEG_INFINITY;
    let mut ymin = f64::INFINITY;
    let mut ymax = f64::NEG_INFINITY;
    for &(ra, dec) in &boundary {
        let Some((x, y)) = out.sky_to_pixel(ra, dec) else {
            bail!("Input footprint is too wide to represent in a TAN projection");
        };
        xmin = xmin.min(x);
        xmax = xmax.max(x);
        ymin = ymin.min(y);
        ymax = ymax.max(y);
    }

    let width = (xmax - xmin).ceil() as usize + 1;
    let height = (ymax - ymin).ceil() as usize + 1;
    out.crpix = [1.0 - xmin, 1.0 - ymin];

    Ok((out, (height, width)))
}

/// Pixel-center coordinates along the outer boundary of a `width`×`height`
/// grid: the four corners plus evenly spaced samples on every edge.
fn boundary_pixels(width: usize, height: usize) -> Vec<(f64, f64)> {
    let w = (width - 1) as f64;
    let h = (height - 1) as f64;
    let mut pts = Vec::with_capacity(4 * EDGE_SAMPLES);
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        pts.push((t * w, 0.0));
        pts.push((t * w, h));
        pts.push((0.0, t * h));
        pts.push((w, t * h));
    }
    pts
}
