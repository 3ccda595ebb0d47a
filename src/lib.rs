//! Normalize astronomical FITS images for visualization clients.
//!
//! Some viewers can only render imagery in one specific layout: equatorial
//! (ICRS) coordinates, a TAN (gnomonic) projection, and 32-bit float pixels.
//! This crate provides [`sanitize_image`], which reprojects an arbitrary
//! celestial image into that layout and writes it back out as FITS.
//!
//! The input can be given three ways — a file path, an in-memory
//! [`ImageHdu`], or a raw `(array, WCS)` pair:
//!
//! ```no_run
//! use fits_sanitize::sanitize_image;
//!
//! sanitize_image("m101_galactic.fits", "m101_icrs_tan.fits", false)?;
//! # anyhow::Ok(())
//! ```
//!
//! The pipeline is the classic three-step normalization: find the optimal
//! ICRS/TAN grid covering the input footprint ([`mosaic`]), resample onto it
//! by bilinear interpolation ([`reproject`]), and serialize as BITPIX=-32
//! FITS ([`fits`]).

pub mod fits;
pub mod mosaic;
pub mod reproject;
pub mod sanitize;
pub mod types;
pub mod wcs;

pub use sanitize::sanitize_image;
pub use types::{ImageHdu, ImageInput};
pub use wcs::{Frame, Projection, Wcs};
