//! Dithering to the client's palettes.
//!
//! Two strategies, selected once at configuration time: Floyd-Steinberg
//! error diffusion for quality, ordered (4x4 Bayer) for throughput. Both
//! return the quantized pixels and the wire-level index map; the bitmap
//! coders consume the index map.

use serde::{Deserialize, Serialize};

use crate::color::{self, GrayLevels};

/// Dithering strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherMethod {
    /// Floyd-Steinberg error diffusion. Sequential across rows.
    #[default]
    Quality,
    /// Ordered dithering with a tiled 4x4 Bayer matrix. Fully parallel.
    Performance,
}

/// 4x4 Bayer threshold matrix, normalized to [0, 1).
const BAYER_4X4: [[f32; 4]; 4] = [
    [0.0 / 16.0, 8.0 / 16.0, 2.0 / 16.0, 10.0 / 16.0],
    [12.0 / 16.0, 4.0 / 16.0, 14.0 / 16.0, 6.0 / 16.0],
    [3.0 / 16.0, 11.0 / 16.0, 1.0 / 16.0, 9.0 / 16.0],
    [15.0 / 16.0, 7.0 / 16.0, 13.0 / 16.0, 5.0 / 16.0],
];

/// Output of a dithering pass.
pub struct Dithered {
    /// The pixels after quantization, for inspection and tests.
    pub pixels: Vec<[u8; 3]>,
    /// Row-major palette (or inverted grayscale) index per pixel.
    pub indices: Vec<u8>,
}

/// Quantize an RGB image to the 231-color palette.
pub fn dither_color(data: &[[f32; 3]], width: usize, height: usize, method: DitherMethod) -> Dithered {
    match method {
        DitherMethod::Quality => floyd_steinberg(data, width, height, |px| {
            let (index, err) = color::closest_color_pixel(px);
            (index, err, color::PALETTE[index as usize])
        }),
        DitherMethod::Performance => ordered(data, width, height, |px| {
            let (index, _) = color::closest_color_pixel(px);
            (index, color::PALETTE[index as usize])
        }),
    }
}

/// Quantize an RGB image to a grayscale sub-palette.
///
/// Indices come out already inverted for the wire (0 = white).
pub fn dither_gray(
    data: &[[f32; 3]],
    width: usize,
    height: usize,
    levels: GrayLevels,
    method: DitherMethod,
) -> Dithered {
    match method {
        DitherMethod::Quality => floyd_steinberg(data, width, height, |px| {
            let (index, err) = color::closest_gray_pixel(px, levels);
            // The scalar L residual diffuses equally into all three channels.
            (index, [err, err, err], color::gray_rgb(index, levels))
        }),
        DitherMethod::Performance => ordered(data, width, height, |px| {
            let (index, _) = color::closest_gray_pixel(px, levels);
            (index, color::gray_rgb(index, levels))
        }),
    }
}

/// Floyd-Steinberg error diffusion.
///
/// Rows run top to bottom; within a row each pixel is quantized after the
/// accumulated error lands on it, and its residual spreads 7/16 east, 3/16
/// southwest, 5/16 south, 1/16 southeast. Weights falling outside the image
/// are dropped, not renormalized.
fn floyd_steinberg<Q>(data: &[[f32; 3]], width: usize, height: usize, quantize: Q) -> Dithered
where
    Q: Fn([f32; 3]) -> (u8, [f32; 3], [u8; 3]),
{
    debug_assert_eq!(data.len(), width * height);
    let mut error = vec![[0.0f32; 3]; width * height];
    let mut pixels = Vec::with_capacity(data.len());
    let mut indices = Vec::with_capacity(data.len());

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let adjusted = [
                (data[idx][0] + error[idx][0]).clamp(0.0, 255.0),
                (data[idx][1] + error[idx][1]).clamp(0.0, 255.0),
                (data[idx][2] + error[idx][2]).clamp(0.0, 255.0),
            ];

            let (index, err, quantized) = quantize(adjusted);
            indices.push(index);
            pixels.push(quantized);

            if x + 1 < width {
                diffuse(&mut error[idx + 1], err, 7.0 / 16.0);
            }
            if y + 1 < height {
                let below = idx + width;
                if x > 0 {
                    diffuse(&mut error[below - 1], err, 3.0 / 16.0);
                }
                diffuse(&mut error[below], err, 5.0 / 16.0);
                if x + 1 < width {
                    diffuse(&mut error[below + 1], err, 1.0 / 16.0);
                }
            }
        }
    }

    Dithered { pixels, indices }
}

#[inline]
fn diffuse(target: &mut [f32; 3], err: [f32; 3], weight: f32) {
    target[0] += err[0] * weight;
    target[1] += err[1] * weight;
    target[2] += err[2] * weight;
}

/// Ordered dithering: add the tiled Bayer threshold, clip, quantize each
/// pixel independently.
fn ordered<Q>(data: &[[f32; 3]], width: usize, height: usize, quantize: Q) -> Dithered
where
    Q: Fn([f32; 3]) -> (u8, [u8; 3]),
{
    debug_assert_eq!(data.len(), width * height);
    let mut pixels = Vec::with_capacity(data.len());
    let mut indices = Vec::with_capacity(data.len());

    for y in 0..height {
        for x in 0..width {
            let threshold = BAYER_4X4[y % 4][x % 4] * 32.0 - 16.0;
            let px = data[y * width + x];
            let adjusted = [
                (px[0] + threshold).clamp(0.0, 255.0),
                (px[1] + threshold).clamp(0.0, 255.0),
                (px[2] + threshold).clamp(0.0, 255.0),
            ];
            let (index, quantized) = quantize(adjusted);
            indices.push(index);
            pixels.push(quantized);
        }
    }

    Dithered { pixels, indices }
}
