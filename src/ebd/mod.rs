//! EBD bitmap conversion.
//!
//! Turns a decoded web image into one of the client's bitmap modes:
//!
//! | mode | format                               |
//! |------|--------------------------------------|
//! | 0    | 1-bit, uncompressed                  |
//! | 1    | 1-bit, scanline compressed           |
//! | 2    | 2-bit gray, uncompressed             |
//! | 3    | 2-bit gray, scanline compressed      |
//! | 4    | 4-bit gray, uncompressed             |
//! | 5    | 4-bit gray, scanline compressed      |
//! | 8    | 8-bit color, uncompressed            |
//! | 9    | 8-bit color, pattern compressed      |
//!
//! Grayscale wire values are inverted (0 = white). The converter also owns
//! the client's image scale rules and alpha flattening.

pub mod mode9;
pub mod pack;
pub mod scanline;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, RgbImage};

use crate::color::GrayLevels;
use crate::dither::{self, DitherMethod};

/// Widest image the client accepts at half size; anything wider collapses
/// to [`REDUCED_WIDTH`].
const MAX_CLIENT_WIDTH: u32 = 306;
/// Width images wider than [`MAX_CLIENT_WIDTH`] are reduced to.
const REDUCED_WIDTH: u32 = 153;

/// A bitmap converted to one of the client's modes, immutable once built.
#[derive(Debug, Clone)]
pub struct EbdImage {
    pub mode: u8,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl EbdImage {
    /// The `<EBDIMAGE>` carrier tag: bitmap bytes base64-inlined in a
    /// comment so legacy parsers skip them.
    pub fn ebdimage_tag(&self, name: u32) -> String {
        format!(
            "<EBDIMAGE MODE=\"{}\" NAME=\"{}\"><!--{}--></EBDIMAGE>",
            self.mode,
            name,
            BASE64.encode(&self.data)
        )
    }

    /// The `<IMG>` tag referencing the carrier by `EBD="#name"`.
    pub fn img_tag(&self, name: u32, alt: Option<&str>) -> String {
        let mut tag = format!(
            "<IMG WIDTH=\"{w}\" HEIGHT=\"{h}\" EBDWIDTH=\"{w}\" EBDHEIGHT=\"{h}\" EBD=\"#{name}\"",
            w = self.width,
            h = self.height,
        );
        if let Some(alt) = alt {
            tag.push_str(&format!(" ALT=\"{alt}\""));
        }
        tag.push('>');
        tag
    }
}

/// Target dimensions under the client's reduction rules: widths past 306
/// collapse to 153 with the aspect ratio kept, everything else is halved.
pub fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width > MAX_CLIENT_WIDTH {
        let new_height = (height as f64 * REDUCED_WIDTH as f64 / width as f64).round() as u32;
        (REDUCED_WIDTH, new_height.max(1))
    } else {
        (width.div_ceil(2), height.div_ceil(2))
    }
}

/// Converts one decoded image into any of the client's bitmap modes.
pub struct EbdConverter {
    image: RgbImage,
    dither: DitherMethod,
}

impl EbdConverter {
    /// Scale the image per the client rules, flatten alpha over white, and
    /// hold the result for conversion.
    pub fn new(image: DynamicImage, dither: DitherMethod) -> Self {
        let (width, height) = (image.width(), image.height());
        let (new_width, new_height) = scaled_dimensions(width, height);
        let image = if (new_width, new_height) != (width, height) {
            tracing::debug!("scaling image {}x{} -> {}x{}", width, height, new_width, new_height);
            image.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle)
        } else {
            image
        };
        Self {
            image: flatten_over_white(image),
            dither,
        }
    }

    /// Use the image at its current size (the SVG path pre-renders at the
    /// final dimensions).
    pub fn without_scaling(image: DynamicImage, dither: DitherMethod) -> Self {
        Self {
            image: flatten_over_white(image),
            dither,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 1-bit black and white (mode 0, or scanline mode 1).
    pub fn convert_bw(&self, compressed: bool) -> EbdImage {
        let width = self.image.width() as usize;
        // bit = 1 means black on the wire, so the white/black boolean is
        // inverted at pack time.
        let black: Vec<bool> = self
            .image
            .pixels()
            .map(|p| luma(p.0) < 127.5)
            .collect();
        let packed = pack::pack_1bit(&black, width);
        if compressed {
            self.finish(1, scanline::compress(&packed, width.div_ceil(8)))
        } else {
            self.finish(0, packed)
        }
    }

    /// Grayscale at 4 or 16 levels (modes 2/3 and 4/5).
    pub fn convert_gs(&self, levels: GrayLevels, compressed: bool) -> EbdImage {
        let width = self.image.width() as usize;
        let height = self.image.height() as usize;
        let dithered = dither::dither_gray(&self.pixels(), width, height, levels, self.dither);
        match levels {
            GrayLevels::Four => {
                let packed = pack::pack_2bit(&dithered.indices, width);
                if compressed {
                    self.finish(3, scanline::compress(&packed, width.div_ceil(4)))
                } else {
                    self.finish(2, packed)
                }
            }
            GrayLevels::Sixteen => {
                let packed = pack::pack_4bit(&dithered.indices, width);
                if compressed {
                    self.finish(5, scanline::compress(&packed, width.div_ceil(2)))
                } else {
                    self.finish(4, packed)
                }
            }
        }
    }

    /// 231-color (mode 8, or pattern-compressed mode 9).
    pub fn convert_color(&self, compressed: bool) -> EbdImage {
        let width = self.image.width() as usize;
        let height = self.image.height() as usize;
        let dithered = dither::dither_color(&self.pixels(), width, height, self.dither);
        if compressed {
            self.finish(9, mode9::compress(&dithered.indices, width, height))
        } else {
            self.finish(8, pack::pack_8bit(&dithered.indices))
        }
    }

    fn pixels(&self) -> Vec<[f32; 3]> {
        self.image
            .pixels()
            .map(|p| [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32])
            .collect()
    }

    fn finish(&self, mode: u8, data: Vec<u8>) -> EbdImage {
        EbdImage {
            mode,
            width: self.image.width(),
            height: self.image.height(),
            data,
        }
    }
}

/// Composite any alpha over an opaque white background.
fn flatten_over_white(image: DynamicImage) -> RgbImage {
    if image.color().has_alpha() {
        let rgba = image.into_rgba8();
        let mut rgb = RgbImage::new(rgba.width(), rgba.height());
        for (out, px) in rgb.pixels_mut().zip(rgba.pixels()) {
            let alpha = px.0[3] as u32;
            for c in 0..3 {
                out.0[c] = ((px.0[c] as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
            }
        }
        rgb
    } else {
        image.into_rgb8()
    }
}

#[inline]
fn luma(rgb: [u8; 3]) -> f32 {
    0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    #[test]
    fn scale_rules_collapse_wide_images_and_halve_the_rest() {
        assert_eq!(scaled_dimensions(640, 480), (153, 115));
        assert_eq!(scaled_dimensions(306, 100), (153, 50));
        assert_eq!(scaled_dimensions(153, 153), (77, 77));
        assert_eq!(scaled_dimensions(101, 31), (51, 16));
        assert_eq!(scaled_dimensions(100, 400), (50, 200));
        assert_eq!(scaled_dimensions(10, 10), (5, 5));
    }

    #[test]
    fn converter_halves_mid_size_images() {
        let converter = EbdConverter::new(solid_image(200, 100, [0, 0, 0]), DitherMethod::Quality);
        assert_eq!((converter.width(), converter.height()), (100, 50));
    }

    #[test]
    fn alpha_composites_over_white() {
        let mut rgba = image::RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let converter =
            EbdConverter::without_scaling(DynamicImage::ImageRgba8(rgba), DitherMethod::Quality);
        // Fully transparent black becomes white.
        let bw = converter.convert_bw(false);
        assert_eq!(bw.data, vec![0x00]);
    }

    #[test]
    fn black_square_mode9_decodes_to_palette_black() {
        // A 10x10 source halves to 5x5 on the way in.
        let converter = EbdConverter::new(solid_image(10, 10, [0, 0, 0]), DitherMethod::Quality);
        let ebd = converter.convert_color(true);
        assert_eq!(ebd.mode, 9);
        assert_eq!((ebd.width, ebd.height), (5, 5));
        let indices = mode9::decompress(&ebd.data, 5, 5).unwrap();
        assert!(indices.iter().all(|&i| i == 0));
    }

    #[test]
    fn black_square_mode4_is_all_fifteen_nibbles() {
        let converter =
            EbdConverter::without_scaling(solid_image(6, 2, [0, 0, 0]), DitherMethod::Quality);
        let ebd = converter.convert_gs(GrayLevels::Sixteen, false);
        assert_eq!(ebd.mode, 4);
        let levels = pack::unpack_4bit(&ebd.data, 6, 2);
        assert!(levels.iter().all(|&v| v == 15));
    }

    #[test]
    fn white_square_mode0_packs_zero_bits() {
        let converter =
            EbdConverter::without_scaling(solid_image(8, 2, [255, 255, 255]), DitherMethod::Quality);
        let ebd = converter.convert_bw(false);
        assert_eq!(ebd.mode, 0);
        assert_eq!(ebd.data, vec![0x00, 0x00]);
    }

    #[test]
    fn scanline_modes_round_trip_through_the_decoder() {
        let mut img = RgbImage::new(9, 6);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = ((x * 37 + y * 11) % 256) as u8;
            px.0 = [v, v / 2, 255 - v];
        }
        let converter =
            EbdConverter::without_scaling(DynamicImage::ImageRgb8(img), DitherMethod::Quality);

        let plain = converter.convert_gs(GrayLevels::Four, false);
        let packed = converter.convert_gs(GrayLevels::Four, true);
        assert_eq!(packed.mode, 3);
        let restored = scanline::decompress(&packed.data, 9usize.div_ceil(4), 6).unwrap();
        assert_eq!(restored, plain.data);

        let plain = converter.convert_gs(GrayLevels::Sixteen, false);
        let packed = converter.convert_gs(GrayLevels::Sixteen, true);
        assert_eq!(packed.mode, 5);
        let restored = scanline::decompress(&packed.data, 9usize.div_ceil(2), 6).unwrap();
        assert_eq!(restored, plain.data);
    }

    #[test]
    fn envelope_tags_carry_mode_name_and_dimensions() {
        let ebd = EbdImage {
            mode: 9,
            width: 5,
            height: 7,
            data: vec![0x05, 0xE7],
        };
        let carrier = ebd.ebdimage_tag(3);
        assert!(carrier.starts_with("<EBDIMAGE MODE=\"9\" NAME=\"3\"><!--"));
        assert!(carrier.ends_with("--></EBDIMAGE>"));

        let img = ebd.img_tag(3, Some("logo"));
        assert_eq!(
            img,
            "<IMG WIDTH=\"5\" HEIGHT=\"7\" EBDWIDTH=\"5\" EBDHEIGHT=\"7\" EBD=\"#3\" ALT=\"logo\">"
        );
    }
}
