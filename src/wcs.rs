use anyhow::{bail, Result};

/// Sky reference frame of a WCS, from CTYPE axis names and RADESYS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Icrs,
    /// FK5 at J2000; within this crate's accuracy needs it is treated as ICRS.
    Fk5,
    Galactic,
}

/// Zenithal projection family. The three codes share one deprojection form
/// parameterized by the native angular radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Gnomonic (tangent plane).
    Tan,
    /// Orthographic.
    Sin,
    /// Zenithal equidistant.
    Arc,
}

impl Projection {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "TAN" => Some(Projection::Tan),
            "SIN" => Some(Projection::Sin),
            "ARC" => Some(Projection::Arc),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Projection::Tan => "TAN",
            Projection::Sin => "SIN",
            Projection::Arc => "ARC",
        }
    }
}

/// World coordinate system of a 2D celestial image.
///
/// Maps between 0-based pixel coordinates (x along NAXIS1, y along NAXIS2)
/// and ICRS sky positions in radians. The linear part is stored as a CD
/// matrix in degrees/pixel; CRPIX keeps the 1-based FITS convention.
#[derive(Debug, Clone)]
pub struct Wcs {
    /// Reference sky position (lon, lat) in degrees, in `frame`.
    pub crval: [f64; 2],
    /// Reference pixel, 1-based as in the FITS header.
    pub crpix: [f64; 2],
    /// CD matrix in degrees/pixel: `cd[0] = [cd1_1, cd1_2]`, `cd[1] = [cd2_1, cd2_2]`.
    pub cd: [[f64; 2]; 2],
    pub frame: Frame,
    pub projection: Projection,
}

impl Wcs {
    /// Convert 0-based pixel coordinates to ICRS (ra, dec) in radians.
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x - (self.crpix[0] - 1.0);
        let v = y - (self.crpix[1] - 1.0);
        let xi = (self.cd[0][0] * u + self.cd[0][1] * v).to_radians();
        let eta = (self.cd[1][0] * u + self.cd[1][1] * v).to_radians();
        let (lon, lat) = self.deproject(xi, eta);
        match self.frame {
            Frame::Icrs | Frame::Fk5 => (lon, lat),
            Frame::Galactic => galactic_to_icrs(lon, lat),
        }
    }

    /// Convert ICRS (ra, dec) in radians to 0-based pixel coordinates.
    ///
    /// Returns `None` when the position is outside the projection's domain
    /// (e.g. behind the tangent plane for TAN).
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (lon, lat) = match self.frame {
            Frame::Icrs | Frame::Fk5 => (ra, dec),
            Frame::Galactic => icrs_to_galactic(ra, dec),
        };
        let (xi, eta) = self.project(lon, lat)?;
        let xi_deg = xi.to_degrees();
        let eta_deg = eta.to_degrees();

        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        if det == 0.0 {
            return None;
        }
        let inv_det = 1.0 / det;
        let u = inv_det * (self.cd[1][1] * xi_deg - self.cd[0][1] * eta_deg);
        let v = inv_det * (-self.cd[1][0] * xi_deg + self.cd[0][0] * eta_deg);

        Some((u + self.crpix[0] - 1.0, v + self.crpix[1] - 1.0))
    }

    /// Approximate pixel scale in degrees/pixel from the CD matrix determinant.
    pub fn pixel_scale(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt()
    }

    /// Validate that the WCS can be used for reprojection.
    pub fn check_finite(&self) -> Result<()> {
        let finite = self.crval.iter().all(|v| v.is_finite())
            && self.crpix.iter().all(|v| v.is_finite())
            && self.cd.iter().flatten().all(|v| v.is_finite());
        if !finite {
            bail!("WCS contains non-finite values");
        }
        if self.pixel_scale() == 0.0 {
            bail!("WCS has a singular CD matrix");
        }
        Ok(())
    }

    /// Deproject standard coordinates (radians, east/north positive) about
    /// the reference point into (lon, lat) in the WCS's own frame.
    fn deproject(&self, xi: f64, eta: f64) -> (f64, f64) {
        let lon0 = self.crval[0].to_radians();
        let lat0 = self.crval[1].to_radians();

        let rho = xi.hypot(eta);
        if rho < 1e-12 {
            return (lon0, lat0);
        }

        // Native angular radius c for each zenithal code.
        let c = match self.projection {
            Projection::Tan => rho.atan(),
            Projection::Sin => rho.clamp(-1.0, 1.0).asin(),
            Projection::Arc => rho,
        };
        let (sin_c, cos_c) = c.sin_cos();

        let lat = (cos_c * lat0.sin() + eta * sin_c * lat0.cos() / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = lon0
            + (xi * sin_c).atan2(rho * lat0.cos() * cos_c - eta * lat0.sin() * sin_c);
        (lon, lat)
    }

    /// Project (lon, lat) radians in the WCS's own frame to standard
    /// coordinates about the reference point. `None` outside the domain.
    fn project(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let lon0 = self.crval[0].to_radians();
        let lat0 = self.crval[1].to_radians();
        let dl = lon - lon0;

        let cos_c = lat0.sin() * lat.sin() + lat0.cos() * lat.cos() * dl.cos();
        let xi0 = lat.cos() * dl.sin();
        let eta0 = lat0.cos() * lat.sin() - lat0.sin() * lat.cos() * dl.cos();

        match self.projection {
            Projection::Tan => {
                if cos_c <= 1e-12 {
                    return None;
                }
                Some((xi0 / cos_c, eta0 / cos_c))
            }
            Projection::Sin => {
                if cos_c <= 0.0 {
                    return None;
                }
                Some((xi0, eta0))
            }
            Projection::Arc => {
                let c = cos_c.clamp(-1.0, 1.0).acos();
                let sin_c = c.sin();
                if sin_c < 1e-12 {
                    // c ~ 0: scale factor -> 1; c ~ pi: antipodal, undefined
                    return if c < 1.0 { Some((xi0, eta0)) } else { None };
                }
                let k = c / sin_c;
                Some((k * xi0, k * eta0))
            }
        }
    }
}

/// J2000 equatorial -> galactic rotation (row-major). Transpose inverts.
const EQ_TO_GAL: [[f64; 3]; 3] = [
    [-0.054_875_560_4, -0.873_437_090_2, -0.483_835_015_5],
    [0.494_109_427_9, -0.444_829_630_0, 0.746_982_244_5],
    [-0.867_666_149_0, -0.198_076_373_4, 0.455_983_776_2],
];

fn lonlat_to_vec(lon: f64, lat: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

fn vec_to_lonlat(v: [f64; 3]) -> (f64, f64) {
    let lon = v[1].atan2(v[0]).rem_euclid(std::f64::consts::TAU);
    let lat = v[2].clamp(-1.0, 1.0).asin();
    (lon, lat)
}

pub(crate) fn icrs_to_galactic(ra: f64, dec: f64) -> (f64, f64) {
    let e = lonlat_to_vec(ra, dec);
    let g = [
        EQ_TO_GAL[0][0] * e[0] + EQ_TO_GAL[0][1] * e[1] + EQ_TO_GAL[0][2] * e[2],
        EQ_TO_GAL[1][0] * e[0] + EQ_TO_GAL[1][1] * e[1] + EQ_TO_GAL[1][2] * e[2],
        EQ_TO_GAL[2][0] * e[0] + EQ_TO_GAL[2][1] * e[1] + EQ_TO_GAL[2][2] * e[2],
    ];
    vec_to_lonlat(g)
}

pub(crate) fn galactic_to_icrs(l: f64, b: f64) -> (f64, f64) {
    let g = lonlat_to_vec(l, b);
    let e = [
        EQ_TO_GAL[0][0] * g[0] + EQ_TO_GAL[1][0] * g[1] + EQ_TO_GAL[2][0] * g[2],
        EQ_TO_GAL[0][1] * g[0] + EQ_TO_GAL[1][1] * g[1] + EQ_TO_GAL[2][1] * g[2],
        EQ_TO_GAL[0][2] * g[0] + EQ_TO_GAL[1][2] * g[1] + EQ_TO_GAL[2][2] * g[2],
    ];
    vec_to_lonlat(e)
}

/// ICRS unit vector for an (ra, dec) pair in radians.
pub(crate) fn sky_to_vec(ra: f64, dec: f64) -> [f64; 3] {
    lonlat_to_vec(ra, dec)
}

/// (ra, dec) radians from an ICRS vector (not necessarily unit length).
pub(crate) fn vec_to_sky(v: [f64; 3]) -> (f64, f64) {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    vec_to_lonlat([v[0] / norm, v[1] / norm, v[2] / norm])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-10;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    fn test_wcs(projection: Projection) -> Wcs {
        Wcs {
            crval: [180.0, 15.0],
            crpix: [512.5, 512.5],
            cd: [[-2.0 / 3600.0, 0.0], [0.0, 2.0 / 3600.0]],
            frame: Frame::Icrs,
            projection,
        }
    }

    #[test]
    fn crpix_maps_to_crval() {
        for proj in [Projection::Tan, Projection::Sin, Projection::Arc] {
            let wcs = test_wcs(proj);
            let (ra, dec) = wcs.pixel_to_sky(511.5, 511.5);
            assert_close(ra, PI, EPS);
            assert_close(dec, 15.0_f64.to_radians(), EPS);
        }
    }

    #[test]
    fn roundtrip_pixel_sky() {
        for proj in [Projection::Tan, Projection::Sin, Projection::Arc] {
            let wcs = test_wcs(proj);
            for &(px, py) in &[
                (511.5, 511.5),
                (0.0, 0.0),
                (1023.0, 1023.0),
                (256.0, 768.0),
                (100.0, 900.0),
            ] {
                let (ra, dec) = wcs.pixel_to_sky(px, py);
                let (px2, py2) = wcs.sky_to_pixel(ra, dec).unwrap();
                assert_close(px, px2, 1e-6);
                assert_close(py, py2, 1e-6);
            }
        }
    }

    #[test]
    fn roundtrip_rotated_cd() {
        let s = 1.5 / 3600.0;
        let angle = PI / 6.0;
        let (sin_a, cos_a) = angle.sin_cos();
        let wcs = Wcs {
            crval: [30.0, -45.0],
            crpix: [500.0, 400.0],
            cd: [[-s * cos_a, s * sin_a], [s * sin_a, s * cos_a]],
            frame: Frame::Icrs,
            projection: Projection::Tan,
        };
        for px in (0..=1000).step_by(250) {
            for py in (0..=800).step_by(200) {
                let (ra, dec) = wcs.pixel_to_sky(px as f64, py as f64);
                let (px2, py2) = wcs.sky_to_pixel(ra, dec).unwrap();
                assert_close(px as f64, px2, 1e-5);
                assert_close(py as f64, py2, 1e-5);
            }
        }
    }

    #[test]
    fn east_is_negative_x_for_negative_cd11() {
        let wcs = test_wcs(Projection::Tan);
        // With cd1_1 < 0, RA increases toward smaller x.
        let (ra_left, _) = wcs.pixel_to_sky(411.5, 511.5);
        let (ra_right, _) = wcs.pixel_to_sky(611.5, 511.5);
        assert!(ra_left > ra_right, "ra_left {ra_left} <= ra_right {ra_right}");
    }

    #[test]
    fn behind_tangent_plane_is_none() {
        let wcs = test_wcs(Projection::Tan);
        let antipode_ra = 0.0;
        let antipode_dec = (-15.0_f64).to_radians();
        assert!(wcs.sky_to_pixel(antipode_ra, antipode_dec).is_none());
    }

    #[test]
    fn pixel_scale_from_cd() {
        let wcs = test_wcs(Projection::Tan);
        assert_close(wcs.pixel_scale(), 2.0 / 3600.0, 1e-15);
    }

    #[test]
    fn check_finite_rejects_nan_crval() {
        let mut wcs = test_wcs(Projection::Tan);
        assert!(wcs.check_finite().is_ok());
        wcs.crval[0] = f64::NAN;
        assert!(wcs.check_finite().is_err());
    }

    #[test]
    fn check_finite_rejects_singular_cd() {
        let mut wcs = test_wcs(Projection::Tan);
        wcs.cd = [[0.0, 0.0], [0.0, 0.0]];
        assert!(wcs.check_finite().is_err());
    }

    #[test]
    fn roundtrip_near_pole() {
        let wcs = Wcs {
            crval: [10.0, 89.5],
            crpix: [256.0, 256.0],
            cd: [[-1.0 / 3600.0, 0.0], [0.0, 1.0 / 3600.0]],
            frame: Frame::Icrs,
            projection: Projection::Tan,
        };
        for px in (0..=512).step_by(128) {
            for py in (0..=512).step_by(128) {
                let (ra, dec) = wcs.pixel_to_sky(px as f64, py as f64);
                let (px2, py2) = wcs.sky_to_pixel(ra, dec).unwrap();
                assert_close(px as f64, px2, 1e-5);
                assert_close(py as f64, py2, 1e-5);
            }
        }
    }

    #[test]
    fn galactic_roundtrip() {
        for &(ra_deg, dec_deg) in &[(0.0, 0.0), (266.4, -28.94), (45.0, 60.0), (310.0, -75.0)] {
            let ra = (ra_deg as f64).to_radians();
            let dec = (dec_deg as f64).to_radians();
            let (l, b) = icrs_to_galactic(ra, dec);
            let (ra2, dec2) = galactic_to_icrs(l, b);
            assert_close(ra.rem_euclid(std::f64::consts::TAU), ra2, 1e-9);
            assert_close(dec, dec2, 1e-9);
        }
    }

    #[test]
    fn north_galactic_pole_position() {
        // North galactic pole is at roughly (192.86, 27.13) deg ICRS.
        let (ra, dec) = galactic_to_icrs(0.0, std::f64::consts::FRAC_PI_2);
        assert_close(ra.to_degrees(), 192.859, 0.01);
        assert_close(dec.to_degrees(), 27.128, 0.01);
    }

    #[test]
    fn galactic_frame_wcs_returns_icrs() {
        let wcs = Wcs {
            crval: [0.0, 0.0], // galactic center
            crpix: [100.0, 100.0],
            cd: [[-1.0 / 3600.0, 0.0], [0.0, 1.0 / 3600.0]],
            frame: Frame::Galactic,
            projection: Projection::Tan,
        };
        let (ra, dec) = wcs.pixel_to_sky(99.0, 99.0);
        // Galactic center is near ICRS (266.40, -28.94) deg.
        assert_close(ra.to_degrees(), 266.405, 0.01);
        assert_close(dec.to_degrees(), -28.936, 0.01);

        let (px, py) = wcs.sky_to_pixel(ra, dec).unwrap();
        assert_close(px, 99.0, 1e-6);
        assert_close(py, 99.0, 1e-6);
    }
}
