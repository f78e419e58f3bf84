//! Color space conversion and palette quantization.
//!
//! Distances are measured in CIE L*a*b* (D65 white point) because Lab is
//! perceptually uniform; quantization residuals are returned in RGB because
//! error diffusion runs on the RGB pixel data that reaches the wire.

mod palette;

pub use palette::{FALLBACK_INDEX, PALETTE_SIZE};

use once_cell::sync::Lazy;

/// sRGB -> XYZ matrix, D65 illuminant.
const XYZ_MATRIX: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// D65 reference white.
const WHITE_POINT: [f32; 3] = [0.95047, 1.0, 1.08883];

const EPSILON: f32 = 0.008856;
const KAPPA: f32 = 903.3;

/// The fixed 231-entry RGB palette.
pub static PALETTE: Lazy<[[u8; 3]; PALETTE_SIZE]> = Lazy::new(palette::build_palette);

/// Lab projection of the palette, precomputed for distance searches.
pub static PALETTE_LAB: Lazy<[[f32; 3]; PALETTE_SIZE]> = Lazy::new(|| {
    let mut lab = [[0.0f32; 3]; PALETTE_SIZE];
    for (i, rgb) in PALETTE.iter().enumerate() {
        lab[i] = rgb_to_lab([rgb[0] as f32, rgb[1] as f32, rgb[2] as f32]);
    }
    lab
});

/// Grayscale sub-palette depth supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrayLevels {
    /// 2-bit, 4 levels.
    Four,
    /// 4-bit, 16 levels.
    Sixteen,
}

impl GrayLevels {
    pub fn count(self) -> usize {
        match self {
            GrayLevels::Four => 4,
            GrayLevels::Sixteen => 16,
        }
    }

    fn palette(self) -> &'static GrayPalette {
        match self {
            GrayLevels::Four => &GRAY_4,
            GrayLevels::Sixteen => &GRAY_16,
        }
    }
}

/// A grayscale sub-palette: tone curve uniform in L*, with the RGB the
/// client's screen shows for each level.
pub struct GrayPalette {
    /// L* value of each level, ascending from black.
    pub l: Vec<f32>,
    /// Neutral RGB of each level.
    pub rgb: Vec<[u8; 3]>,
}

static GRAY_4: Lazy<GrayPalette> = Lazy::new(|| build_gray_palette(4));
static GRAY_16: Lazy<GrayPalette> = Lazy::new(|| build_gray_palette(16));

fn build_gray_palette(levels: usize) -> GrayPalette {
    let mut l = Vec::with_capacity(levels);
    let mut rgb = Vec::with_capacity(levels);
    for i in 0..levels {
        let l_star = 100.0 * i as f32 / (levels - 1) as f32;
        // Inverse of the Lab f(t) curve for a neutral color: X/Xn = Y/Yn =
        // Z/Zn = y, which maps straight back to r = g = b.
        let y = if l_star > 8.0 {
            let f = (l_star + 16.0) / 116.0;
            f * f * f
        } else {
            l_star / KAPPA
        };
        let v = (y * 255.0).clamp(0.0, 255.0).round() as u8;
        l.push(l_star);
        rgb.push([v, v, v]);
    }
    GrayPalette { l, rgb }
}

/// Convert one RGB pixel (0..255 per channel) to L*a*b*.
///
/// Branch-free per element apart from the epsilon comparison inside `lab_f`;
/// operates on f32 so whole rows can stream through without conversion.
#[inline]
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let r = rgb[0].clamp(0.0, 255.0) / 255.0;
    let g = rgb[1].clamp(0.0, 255.0) / 255.0;
    let b = rgb[2].clamp(0.0, 255.0) / 255.0;

    let x = (XYZ_MATRIX[0][0] * r + XYZ_MATRIX[0][1] * g + XYZ_MATRIX[0][2] * b) / WHITE_POINT[0];
    let y = (XYZ_MATRIX[1][0] * r + XYZ_MATRIX[1][1] * g + XYZ_MATRIX[1][2] * b) / WHITE_POINT[1];
    let z = (XYZ_MATRIX[2][0] * r + XYZ_MATRIX[2][1] * g + XYZ_MATRIX[2][2] * b) / WHITE_POINT[2];

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    [
        (116.0 * fy - 16.0).max(0.0),
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    ]
}

#[inline]
fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

/// Nearest palette entry for a single pixel: (index, RGB residual).
///
/// The residual is `pixel - palette[index]` in RGB, not Lab, because error
/// diffusion runs on the RGB data. Ties break to the lowest index.
#[inline]
pub fn closest_color_pixel(pixel: [f32; 3]) -> (u8, [f32; 3]) {
    let lab = rgb_to_lab(pixel);
    let mut best = FALLBACK_INDEX as usize;
    let mut best_dist = f32::INFINITY;
    for (i, pal) in PALETTE_LAB.iter().enumerate() {
        let dl = lab[0] - pal[0];
        let da = lab[1] - pal[1];
        let db = lab[2] - pal[2];
        let dist = dl * dl + da * da + db * db;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    let chosen = PALETTE[best];
    (
        best as u8,
        [
            pixel[0] - chosen[0] as f32,
            pixel[1] - chosen[1] as f32,
            pixel[2] - chosen[2] as f32,
        ],
    )
}

/// Nearest grayscale level for a single pixel: (inverted wire index, residual
/// scaled back to the 0..255 range).
#[inline]
pub fn closest_gray_pixel(pixel: [f32; 3], levels: GrayLevels) -> (u8, f32) {
    let palette = levels.palette();
    let n = palette.l.len();
    let l = rgb_to_lab(pixel)[0];
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, &pl) in palette.l.iter().enumerate() {
        let dist = (l - pl).abs();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    ((n - 1 - best) as u8, (l - palette.l[best]) * (255.0 / 100.0))
}

/// Map each pixel of a row to its nearest palette entry.
///
/// Row-vectorized form of [`closest_color_pixel`].
pub fn find_closest_color(pixels: &[[f32; 3]]) -> (Vec<u8>, Vec<[f32; 3]>) {
    let mut indices = Vec::with_capacity(pixels.len());
    let mut errors = Vec::with_capacity(pixels.len());
    for &pixel in pixels {
        let (index, error) = closest_color_pixel(pixel);
        indices.push(index);
        errors.push(error);
    }
    (indices, errors)
}

/// Map each pixel of a row to its nearest grayscale level.
///
/// Distance is measured on L* alone. The returned index is inverted for the
/// client's convention (0 = white, max = black); the residual is scaled back
/// from the L range to 0..255 so error diffusion stays in RGB units.
pub fn find_closest_gray(pixels: &[[f32; 3]], levels: GrayLevels) -> (Vec<u8>, Vec<f32>) {
    let mut indices = Vec::with_capacity(pixels.len());
    let mut errors = Vec::with_capacity(pixels.len());
    for &pixel in pixels {
        let (index, error) = closest_gray_pixel(pixel, levels);
        indices.push(index);
        errors.push(error);
    }
    (indices, errors)
}

/// RGB the client shows for an inverted grayscale wire index.
pub fn gray_rgb(wire_index: u8, levels: GrayLevels) -> [u8; 3] {
    let palette = levels.palette();
    let n = palette.l.len();
    palette.rgb[n - 1 - wire_index as usize]
}
