//! Luma conversion.
//!
//! Replaces the red, green and blue samples of every pixel with the
//! Rec. 601 luma `0.299*R + 0.587*G + 0.114*B`, leaving alpha alone.
//! The layout and sample width of the buffer are preserved, so the
//! result can be re-encoded in the same container as the input.

use crate::types::PixelBuffer;

/// Rec. 601 weights in thousandths.
const WEIGHT_R: u32 = 299;
const WEIGHT_G: u32 = 587;
const WEIGHT_B: u32 = 114;
const WEIGHT_TOTAL: u32 = WEIGHT_R + WEIGHT_G + WEIGHT_B;

/// Weighted sum rounded half-up, clamped to `max`.
///
/// Products stay below `1000 * 65535`, well inside `u32`.
fn luma(r: u32, g: u32, b: u32, max: u32) -> u32 {
    let sum = WEIGHT_R * r + WEIGHT_G * g + WEIGHT_B * b;
    ((sum + WEIGHT_TOTAL / 2) / WEIGHT_TOTAL).min(max)
}

/// Convert a buffer to grayscale.
///
/// RGB and RGBA buffers get `R = G = B = Y`; alpha is copied unchanged.
/// Gray and gray-alpha buffers are returned as-is, which makes the
/// operation idempotent. Dimensions, layout and sample width never
/// change.
#[must_use = "returns the converted buffer"]
pub fn grayscale(buffer: PixelBuffer) -> PixelBuffer {
    let layout = buffer.layout();
    if !layout.has_color() {
        return buffer;
    }

    let channels = layout.channels();
    let samples = match buffer.bytes_per_channel() {
        1 => luma8(buffer.samples(), channels),
        _ => luma16(buffer.samples(), channels),
    };
    buffer.with_samples(samples)
}

fn luma8(samples: &[u8], channels: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len());
    for px in samples.chunks_exact(channels) {
        let y = luma(
            u32::from(px[0]),
            u32::from(px[1]),
            u32::from(px[2]),
            u32::from(u8::MAX),
        );
        #[expect(clippy::cast_possible_truncation)]
        let y = y as u8;
        out.extend_from_slice(&[y, y, y]);
        out.extend_from_slice(&px[3..]);
    }
    out
}

fn luma16(samples: &[u8], channels: usize) -> Vec<u8> {
    let read = |px: &[u8], i: usize| u32::from(u16::from_ne_bytes([px[2 * i], px[2 * i + 1]]));

    let mut out = Vec::with_capacity(samples.len());
    for px in samples.chunks_exact(channels * 2) {
        let y = luma(read(px, 0), read(px, 1), read(px, 2), u32::from(u16::MAX));
        #[expect(clippy::cast_possible_truncation)]
        let y = (y as u16).to_ne_bytes();
        for _ in 0..3 {
            out.extend_from_slice(&y);
        }
        out.extend_from_slice(&px[6..]);
    }
    out
}
