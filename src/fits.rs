use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use crate::types::ImageHdu;
use crate::wcs::{Frame, Projection, Wcs};

const FITS_BLOCK_SIZE: usize = 2880;
const FITS_CARD_SIZE: usize = 80;

/// Keywords of the primary HDU that this crate consumes.
#[derive(Debug)]
struct HeaderKeywords {
    bitpix: i32,
    naxis: i32,
    naxis1: usize,
    naxis2: usize,
    bzero: f64,
    bscale: f64,
    ctype1: Option<String>,
    ctype2: Option<String>,
    crval1: Option<f64>,
    crval2: Option<f64>,
    crpix1: Option<f64>,
    crpix2: Option<f64>,
    cdelt1: Option<f64>,
    cdelt2: Option<f64>,
    crota2: Option<f64>,
    // CD1_1, CD1_2, CD2_1, CD2_2
    cd: [Option<f64>; 4],
    // PC1_1, PC1_2, PC2_1, PC2_2
    pc: [Option<f64>; 4],
    radesys: Option<String>,
}

impl Default for HeaderKeywords {
    fn default() -> Self {
        HeaderKeywords {
            bitpix: 0,
            naxis: 0,
            naxis1: 0,
            naxis2: 0,
            bzero: 0.0,
            bscale: 1.0,
            ctype1: None,
            ctype2: None,
            crval1: None,
            crval2: None,
            crpix1: None,
            crpix2: None,
            cdelt1: None,
            cdelt2: None,
            crota2: None,
            cd: [None; 4],
            pc: [None; 4],
            radesys: None,
        }
    }
}

fn card_value(card: &str) -> Option<&str> {
    if card.len() < 10 || card.as_bytes()[8] != b'=' {
        return None;
    }
    Some(card[9..].trim_start())
}

fn parse_int_value(card: &str) -> Option<i64> {
    let val = card_value(card)?;
    let num_str: String = val
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
        .collect();
    num_str.parse().ok()
}

fn parse_float_value(card: &str) -> Option<f64> {
    let val = card_value(card)?;
    let num_str: String = val
        .chars()
        .take_while(|c| {
            c.is_ascii_digit() || *c == '-' || *c == '+' || *c == '.' || *c == 'E' || *c == 'e'
        })
        .collect();
    num_str.parse().ok()
}

fn parse_string_value(card: &str) -> Option<String> {
    let val = card_value(card)?;
    let val = val.strip_prefix('\'')?;
    let end = val.find('\'')?;
    Some(val[..end].trim_end().to_string())
}

fn read_header(reader: &mut impl Read) -> Result<HeaderKeywords> {
    let mut hdr = HeaderKeywords::default();
    let mut block = [0u8; FITS_BLOCK_SIZE];
    let mut found_end = false;

    while !found_end {
        reader
            .read_exact(&mut block)
            .context("Failed to read FITS header block")?;

        for i in 0..(FITS_BLOCK_SIZE / FITS_CARD_SIZE) {
            let card_bytes = &block[i * FITS_CARD_SIZE..(i + 1) * FITS_CARD_SIZE];
            let card = std::str::from_utf8(card_bytes).unwrap_or("");
            if card.len() < 8 {
                continue;
            }

            let key = card[..8].trim_end();
            if key == "END" {
                found_end = true;
                break;
            }

            match key {
                "BITPIX" => hdr.bitpix = parse_int_value(card).unwrap_or(0) as i32,
                "NAXIS" => hdr.naxis = parse_int_value(card).unwrap_or(0) as i32,
                "NAXIS1" => hdr.naxis1 = parse_int_value(card).unwrap_or(0).max(0) as usize,
                "NAXIS2" => hdr.naxis2 = parse_int_value(card).unwrap_or(0).max(0) as usize,
                "BZERO" => hdr.bzero = parse_float_value(card).unwrap_or(0.0),
                "BSCALE" => hdr.bscale = parse_float_value(card).unwrap_or(1.0),
                "CTYPE1" => hdr.ctype1 = parse_string_value(card),
                "CTYPE2" => hdr.ctype2 = parse_string_value(card),
                "CRVAL1" => hdr.crval1 = parse_float_value(card),
                "CRVAL2" => hdr.crval2 = parse_float_value(card),
                "CRPIX1" => hdr.crpix1 = parse_float_value(card),
                "CRPIX2" => hdr.crpix2 = parse_float_value(card),
                "CDELT1" => hdr.cdelt1 = parse_float_value(card),
                "CDELT2" => hdr.cdelt2 = parse_float_value(card),
                "CROTA2" => hdr.crota2 = parse_float_value(card),
                "CD1_1" => hdr.cd[0] = parse_float_value(card),
                "CD1_2" => hdr.cd[1] = parse_float_value(card),
                "CD2_1" => hdr.cd[2] = parse_float_value(card),
                "CD2_2" => hdr.cd[3] = parse_float_value(card),
                "PC1_1" => hdr.pc[0] = parse_float_value(card),
                "PC1_2" => hdr.pc[1] = parse_float_value(card),
                "PC2_1" => hdr.pc[2] = parse_float_value(card),
                "PC2_2" => hdr.pc[3] = parse_float_value(card),
                "RADESYS" | "RADECSYS" => hdr.radesys = parse_string_value(card),
                _ => {}
            }
        }
    }

    if hdr.bitpix == 0 {
        bail!("Missing BITPIX keyword in FITS header");
    }
    if hdr.naxis < 2 {
        bail!("FITS image must have at least 2 dimensions");
    }
    if hdr.naxis1 == 0 || hdr.naxis2 == 0 {
        bail!("Invalid FITS image dimensions");
    }

    Ok(hdr)
}

/// Build the celestial WCS from parsed header keywords.
///
/// Linear-part priority follows the FITS WCS conventions: an explicit CD
/// matrix wins, then PC×CDELT, then CDELT with optional CROTA2 rotation.
fn wcs_from_header(hdr: &HeaderKeywords) -> Result<Wcs> {
    let ctype1 = hdr
        .ctype1
        .as_deref()
        .context("No CTYPE1 in FITS header: image has no celestial WCS")?;
    let ctype2 = hdr
        .ctype2
        .as_deref()
        .context("No CTYPE2 in FITS header: image has no celestial WCS")?;

    let lon_prefix = ctype1.split('-').next().unwrap_or("");
    let frame = match lon_prefix {
        "RA" => match hdr.radesys.as_deref() {
            None | Some("ICRS") => Frame::Icrs,
            Some("FK5") => Frame::Fk5,
            Some(other) => bail!("Unsupported RADESYS: {}", other),
        },
        "GLON" => Frame::Galactic,
        other => bail!(
            "Unsupported CTYPE1 axis: {:?} (expected the longitude axis, RA or GLON)",
            other
        ),
    };

    if ctype1.len() < 3 || ctype2.len() < 3 {
        bail!("Malformed CTYPE values: {:?} / {:?}", ctype1, ctype2);
    }
    let code1 = &ctype1[ctype1.len() - 3..];
    let code2 = &ctype2[ctype2.len() - 3..];
    if code1 != code2 {
        bail!("Mismatched projections on image axes: {} vs {}", code1, code2);
    }
    let projection = Projection::from_code(code1)
        .with_context(|| format!("Unsupported projection code: {}", code1))?;

    let crval1 = hdr.crval1.context("Missing CRVAL1 in FITS header")?;
    let crval2 = hdr.crval2.context("Missing CRVAL2 in FITS header")?;
    let crpix1 = hdr.crpix1.unwrap_or(1.0);
    let crpix2 = hdr.crpix2.unwrap_or(1.0);

    let cd = if hdr.cd.iter().any(|c| c.is_some()) {
        [
            [hdr.cd[0].unwrap_or(0.0), hdr.cd[1].unwrap_or(0.0)],
            [hdr.cd[2].unwrap_or(0.0), hdr.cd[3].unwrap_or(0.0)],
        ]
    } else if hdr.pc.iter().any(|c| c.is_some()) {
        let cdelt1 = hdr.cdelt1.unwrap_or(1.0);
        let cdelt2 = hdr.cdelt2.unwrap_or(1.0);
        [
            [cdelt1 * hdr.pc[0].unwrap_or(1.0), cdelt1 * hdr.pc[1].unwrap_or(0.0)],
            [cdelt2 * hdr.pc[2].unwrap_or(0.0), cdelt2 * hdr.pc[3].unwrap_or(1.0)],
        ]
    } else {
        let cdelt1 = hdr.cdelt1.context("No CD matrix or CDELT in FITS header")?;
        let cdelt2 = hdr.cdelt2.context("No CD matrix or CDELT in FITS header")?;
        let rho = hdr.crota2.unwrap_or(0.0).to_radians();
        let (sin_r, cos_r) = rho.sin_cos();
        [
            [cdelt1 * cos_r, -cdelt2 * sin_r],
            [cdelt1 * sin_r, cdelt2 * cos_r],
        ]
    };

    let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
    if det == 0.0 || !det.is_finite() {
        bail!("Singular or non-finite CD matrix in FITS header");
    }

    Ok(Wcs {
        crval: [crval1, crval2],
        crpix: [crpix1, crpix2],
        cd,
        frame,
        projection,
    })
}

/// Read the primary HDU of a FITS file as a 2D f64 image plus its WCS.
///
/// BZERO/BSCALE are applied. For cubes (NAXIS=3) only the first plane is
/// read, which is what the visualization path wants.
pub fn read_image(path: &Path) -> Result<ImageHdu> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open FITS file {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let hdr = read_header(&mut reader)?;
    let wcs = wcs_from_header(&hdr)?;

    let num_pixels = hdr.naxis1 * hdr.naxis2;
    let bytes_per_pixel = (hdr.bitpix.unsigned_abs() as usize) / 8;

    let mut raw_data = vec![0u8; num_pixels * bytes_per_pixel];
    reader
        .read_exact(&mut raw_data)
        .context("Failed to read FITS data")?;

    let bzero = hdr.bzero;
    let bscale = hdr.bscale;
    let mut data = vec![0f64; num_pixels];

    match hdr.bitpix {
        8 => {
            for (dst, &b) in data.iter_mut().zip(raw_data.iter()) {
                *dst = bzero + bscale * b as f64;
            }
        }
        16 => {
            for (dst, src) in data.iter_mut().zip(raw_data.chunks_exact(2)) {
                let v = i16::from_be_bytes([src[0], src[1]]);
                *dst = bzero + bscale * v as f64;
            }
        }
        32 => {
            for (dst, src) in data.iter_mut().zip(raw_data.chunks_exact(4)) {
                let v = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
                *dst = bzero + bscale * v as f64;
            }
        }
        -32 => {
            for (dst, src) in data.iter_mut().zip(raw_data.chunks_exact(4)) {
                let v = f32::from_be_bytes([src[0], src[1], src[2], src[3]]);
                *dst = bzero + bscale * v as f64;
            }
        }
        -64 => {
            for (dst, src) in data.iter_mut().zip(raw_data.chunks_exact(8)) {
                let v = f64::from_be_bytes([
                    src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
                ]);
                *dst = bzero + bscale * v;
            }
        }
        other => bail!("Unsupported BITPIX value: {}", other),
    }

    let data = Array2::from_shape_vec((hdr.naxis2, hdr.naxis1), data)
        .context("Failed to reshape FITS data")?;

    Ok(ImageHdu { data, wcs })
}

fn push_card(cards: &mut Vec<u8>, content: &str) {
    let mut card = [b' '; FITS_CARD_SIZE];
    let n = content.len().min(FITS_CARD_SIZE);
    card[..n].copy_from_slice(&content.as_bytes()[..n]);
    cards.extend_from_slice(&card);
}

fn push_int_card(cards: &mut Vec<u8>, key: &str, value: i64) {
    push_card(cards, &format!("{:<8}= {:>20}", key, value));
}

fn push_float_card(cards: &mut Vec<u8>, key: &str, value: f64) {
    push_card(cards, &format!("{:<8}= {:>20}", key, format!("{:.12E}", value)));
}

fn push_string_card(cards: &mut Vec<u8>, key: &str, value: &str) {
    push_card(cards, &format!("{:<8}= '{:<8}'", key, value));
}

fn ctype_names(wcs: &Wcs) -> (String, String) {
    let code = wcs.projection.code();
    match wcs.frame {
        Frame::Icrs | Frame::Fk5 => (format!("RA---{}", code), format!("DEC--{}", code)),
        Frame::Galactic => (format!("GLON-{}", code), format!("GLAT-{}", code)),
    }
}

/// Write a 2D f32 image with its WCS as a single-HDU FITS file.
///
/// With `overwrite=false` an existing file at `path` makes this fail before
/// anything is written; with `overwrite=true` it is replaced.
pub fn write_image_f32(
    path: &Path,
    data: &Array2<f32>,
    wcs: &Wcs,
    overwrite: bool,
) -> Result<()> {
    let (height, width) = data.dim();
    if height == 0 || width == 0 {
        bail!("Refusing to write empty FITS image");
    }

    let file = if overwrite {
        File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?
    } else {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| {
                format!(
                    "Failed to create output file {} (exists already? pass overwrite=true)",
                    path.display()
                )
            })?
    };
    let mut writer = BufWriter::new(file);

    let mut header = Vec::with_capacity(FITS_BLOCK_SIZE);
    push_card(&mut header, "SIMPLE  =                    T");
    push_int_card(&mut header, "BITPIX", -32);
    push_int_card(&mut header, "NAXIS", 2);
    push_int_card(&mut header, "NAXIS1", width as i64);
    push_int_card(&mut header, "NAXIS2", height as i64);

    let (ctype1, ctype2) = ctype_names(wcs);
    push_string_card(&mut header, "CTYPE1", &ctype1);
    push_string_card(&mut header, "CTYPE2", &ctype2);
    push_float_card(&mut header, "CRVAL1", wcs.crval[0]);
    push_float_card(&mut header, "CRVAL2", wcs.crval[1]);
    push_float_card(&mut header, "CRPIX1", wcs.crpix[0]);
    push_float_card(&mut header, "CRPIX2", wcs.crpix[1]);
    push_float_card(&mut header, "CD1_1", wcs.cd[0][0]);
    push_float_card(&mut header, "CD1_2", wcs.cd[0][1]);
    push_float_card(&mut header, "CD2_1", wcs.cd[1][0]);
    push_float_card(&mut header, "CD2_2", wcs.cd[1][1]);
    match wcs.frame {
        Frame::Icrs => push_string_card(&mut header, "RADESYS", "ICRS"),
        Frame::Fk5 => {
            push_string_card(&mut header, "RADESYS", "FK5");
            push_float_card(&mut header, "EQUINOX", 2000.0);
        }
        Frame::Galactic => {}
    }
    push_card(&mut header, "END");

    let header_pad = (FITS_BLOCK_SIZE - header.len() % FITS_BLOCK_SIZE) % FITS_BLOCK_SIZE;
    header.resize(header.len() + header_pad, b' ');
    writer
        .write_all(&header)
        .context("Failed to write FITS header")?;

    let mut data_bytes = Vec::with_capacity(height * width * 4);
    for &v in data.iter() {
        data_bytes.extend_from_slice(&v.to_be_bytes());
    }
    let data_pad = (FITS_BLOCK_SIZE - data_bytes.len() % FITS_BLOCK_SIZE) % FITS_BLOCK_SIZE;
    data_bytes.resize(data_bytes.len() + data_pad, 0);
    writer
        .write_all(&data_bytes)
        .context("Failed to write FITS data")?;

    writer.flush().context("Failed to flush FITS output")?;
    Ok(())
}
