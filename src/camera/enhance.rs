//! Contrast enhancement for display.
//!
//! Pure functions over [`OwnedFrame`]. Only the visible `width` bytes of each
//! row take part; padding is carried over untouched.

use crate::camera::pipeline::OwnedFrame;

/// 256-bin histogram of the visible pixels.
pub fn histogram(frame: &OwnedFrame) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for y in 0..frame.height() {
        for &px in frame.row(y) {
            hist[px as usize] += 1;
        }
    }
    hist
}

/// Lookup table that spreads the cumulative histogram over `0..=255`.
///
/// The lowest occupied level maps to 0. A single-level image maps every
/// pixel to that level unchanged.
fn equalization_lut(hist: &[u64; 256]) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let total: u64 = hist.iter().sum();
    let Some(first) = hist.iter().position(|&count| count > 0) else {
        return lut;
    };
    if hist[first] == total {
        lut.fill(first as u8);
        return lut;
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut cumulative = 0u64;
    for level in first + 1..256 {
        cumulative += hist[level];
        lut[level] = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Histogram-equalize a Mono8 frame.
///
/// The result has the same geometry and frame number as the input.
pub fn equalize_histogram(frame: &OwnedFrame) -> OwnedFrame {
    let lut = equalization_lut(&histogram(frame));
    let width = frame.width() as usize;
    let stride = frame.stride();

    let mut pixels = frame.pixels().to_vec();
    for y in 0..frame.height() as usize {
        let row = &mut pixels[y * stride..y * stride + width];
        for px in row {
            *px = lut[*px as usize];
        }
    }

    match OwnedFrame::new(pixels, frame.width(), frame.height(), stride) {
        Ok(equalized) => equalized.with_frame_number(frame.frame_number()),
        // geometry is copied from a valid frame
        Err(_) => frame.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_frame_is_unchanged() {
        let frame = OwnedFrame::new(vec![42u8; 16], 4, 4, 4).unwrap();
        let out = equalize_histogram(&frame);
        assert!(out.pixels().iter().all(|&p| p == 42));
    }

    #[test]
    fn two_levels_stretch_to_full_range() {
        let frame = OwnedFrame::new(vec![100, 100, 101, 101], 2, 2, 2).unwrap();
        let out = equalize_histogram(&frame);
        assert_eq!(out.pixels(), &[0, 0, 255, 255]);
    }

    #[test]
    fn ramp_is_monotonic_and_spans_range() {
        let pixels: Vec<u8> = (0..64).map(|i| 64 + i as u8).collect();
        let frame = OwnedFrame::new(pixels, 8, 8, 8).unwrap();
        let out = equalize_histogram(&frame);
        assert_eq!(out.pixels()[0], 0);
        assert_eq!(out.pixels()[63], 255);
        assert!(out.pixels().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn padding_is_preserved_and_ignored() {
        // padding bytes 7 must not shift the histogram
        let frame = OwnedFrame::new(vec![10, 20, 7, 10, 20, 7], 2, 2, 3)
            .unwrap()
            .with_frame_number(9);
        let out = equalize_histogram(&frame);
        assert_eq!(out.stride(), 3);
        assert_eq!(out.frame_number(), 9);
        assert_eq!(out.pixels(), &[0, 255, 7, 0, 255, 7]);
        assert_eq!(frame.pixels(), &[10, 20, 7, 10, 20, 7]);
    }
}
