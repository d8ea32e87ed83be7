//! Pixel format conversion to Mono8.
//!
//! Every converter reads `height` rows of `stride` bytes and writes a tightly
//! packed `width * height` Mono8 buffer. Color formats use BT.601 luma:
//! `Y = 0.299 R + 0.587 G + 0.114 B`.

use crate::camera::device::PixelFormat;
use crate::error::{RigError, RigResult};

/// Convert one frame to tightly packed Mono8.
///
/// # Errors
///
/// [`RigError::ConversionFailed`] for formats without a converter and for
/// buffers that do not match the declared geometry.
pub fn to_mono8(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
) -> RigResult<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let bpp = format.bytes_per_pixel().ok_or_else(|| {
        RigError::ConversionFailed(format!("no converter for {format}"))
    })?;
    if stride < w * bpp {
        return Err(RigError::ConversionFailed(format!(
            "stride {stride} too small for {w} px of {format}"
        )));
    }
    let needed = required_len(stride, w * bpp, h);
    if data.len() < needed {
        return Err(RigError::ConversionFailed(format!(
            "{format} buffer has {} bytes, geometry needs {needed}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(w * h);
    match format {
        PixelFormat::Mono8 => {
            for row in rows(data, stride, h) {
                out.extend_from_slice(&row[..w]);
            }
        }
        PixelFormat::Mono10 => mono16_rows(data, stride, w, h, 2, &mut out),
        PixelFormat::Mono12 => mono16_rows(data, stride, w, h, 4, &mut out),
        PixelFormat::Mono16 => mono16_rows(data, stride, w, h, 8, &mut out),
        PixelFormat::Rgb8 => rgb_rows(data, stride, w, h, (0, 1, 2), &mut out),
        PixelFormat::Bgr8 => rgb_rows(data, stride, w, h, (2, 1, 0), &mut out),
        PixelFormat::Yuv422 => {
            // Y0 U Y1 V: luma is every other byte
            for row in rows(data, stride, h) {
                out.extend(row[..w * 2].iter().step_by(2));
            }
        }
        PixelFormat::BayerRG8
        | PixelFormat::BayerGR8
        | PixelFormat::BayerGB8
        | PixelFormat::BayerBG8 => bayer_rows(format, data, stride, w, h, &mut out),
        // rejected by bytes_per_pixel above
        PixelFormat::Mono12Packed => {}
    }
    Ok(out)
}

/// Bytes a buffer must hold: full strides for all rows but the last, which
/// only needs its pixel bytes.
fn required_len(stride: usize, row_bytes: usize, height: usize) -> usize {
    match height {
        0 => 0,
        h => stride * (h - 1) + row_bytes,
    }
}

fn rows(data: &[u8], stride: usize, height: usize) -> impl Iterator<Item = &[u8]> {
    (0..height).map(move |y| &data[y * stride..])
}

fn mono16_rows(data: &[u8], stride: usize, w: usize, h: usize, shift: u32, out: &mut Vec<u8>) {
    for row in rows(data, stride, h) {
        out.extend(
            row[..w * 2]
                .chunks_exact(2)
                .map(|px| (u16::from_le_bytes([px[0], px[1]]) >> shift).min(255) as u8),
        );
    }
}

fn luma(r: f32, g: f32, b: f32) -> u8 {
    (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
}

fn rgb_rows(
    data: &[u8],
    stride: usize,
    w: usize,
    h: usize,
    (ri, gi, bi): (usize, usize, usize),
    out: &mut Vec<u8>,
) {
    for row in rows(data, stride, h) {
        out.extend(
            row[..w * 3]
                .chunks_exact(3)
                .map(|px| luma(px[ri] as f32, px[gi] as f32, px[bi] as f32)),
        );
    }
}

/// Offsets of the red sample inside each 2x2 Bayer cell, as (x, y).
fn red_offset(format: PixelFormat) -> (usize, usize) {
    match format {
        PixelFormat::BayerRG8 => (0, 0),
        PixelFormat::BayerGR8 => (1, 0),
        PixelFormat::BayerGB8 => (0, 1),
        _ => (1, 1),
    }
}

/// Each output pixel takes the luma of the 2x2 cell it falls in. Odd trailing
/// rows and columns reuse the previous cell.
fn bayer_rows(
    format: PixelFormat,
    data: &[u8],
    stride: usize,
    w: usize,
    h: usize,
    out: &mut Vec<u8>,
) {
    let (rx, ry) = red_offset(format);
    let (bx, by) = (1 - rx, 1 - ry);
    let at = |x: usize, y: usize| data[y * stride + x] as f32;

    if w < 2 || h < 2 {
        for row in rows(data, stride, h) {
            out.extend_from_slice(&row[..w]);
        }
        return;
    }

    // Cell origins stay even so every cell keeps the sensor's colour phase.
    let (last_cx, last_cy) = ((w - 2) & !1, (h - 2) & !1);
    for y in 0..h {
        let cy = (y & !1).min(last_cy);
        for x in 0..w {
            let cx = (x & !1).min(last_cx);
            let r = at(cx + rx, cy + ry);
            let b = at(cx + bx, cy + by);
            let g = (at(cx + bx, cy + ry) + at(cx + rx, cy + by)) / 2.0;
            out.push(luma(r, g, b));
        }
    }
}
