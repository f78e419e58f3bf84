//! SVG rasterization.
//!
//! Vector images are rendered to RGB at their final on-client size before
//! entering the bitmap pipeline. Target dimensions follow the same reduction
//! rules as raster images, seeded from the root element's width/height
//! attributes, then its viewBox, then a 306x306 fallback.

use image::RgbImage;
use thiserror::Error;

use crate::ebd::scaled_dimensions;

/// Dimension fallback when the SVG declares no usable size.
const DEFAULT_DIMENSION: u32 = 306;

/// How far into the document the `<svg` sniff looks.
const SNIFF_WINDOW: usize = 1000;

#[derive(Error, Debug)]
pub enum SvgError {
    #[error("SVG parse error: {0}")]
    Parse(String),

    #[error("SVG has an empty render target")]
    EmptyTarget,
}

/// Content sniff: does this byte stream look like an SVG document?
pub fn is_svg(data: &[u8]) -> bool {
    let window = &data[..data.len().min(SNIFF_WINDOW)];
    String::from_utf8_lossy(window).to_ascii_lowercase().contains("<svg")
}

/// Intrinsic dimensions from the root `<svg>` element.
pub fn intrinsic_dimensions(data: &[u8]) -> (u32, u32) {
    let text = String::from_utf8_lossy(data);
    let Some(tag) = root_svg_tag(&text) else {
        return (DEFAULT_DIMENSION, DEFAULT_DIMENSION);
    };

    let width = attribute_value(tag, "width").and_then(parse_length);
    let height = attribute_value(tag, "height").and_then(parse_length);
    if let (Some(w), Some(h)) = (width, height) {
        return (w, h);
    }

    if let Some(view_box) = attribute_value(tag, "viewBox") {
        let numbers: Vec<f64> = view_box
            .split([' ', ','])
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        if numbers.len() == 4 && numbers[2] > 0.0 && numbers[3] > 0.0 {
            return (numbers[2].round() as u32, numbers[3].round() as u32);
        }
    }

    (DEFAULT_DIMENSION, DEFAULT_DIMENSION)
}

/// Rasterize an SVG to RGB at its reduced on-client size, over opaque white.
pub fn rasterize(data: &[u8]) -> Result<RgbImage, SvgError> {
    let options = resvg::usvg::Options::default();
    let tree = resvg::usvg::Tree::from_data(data, &options)
        .map_err(|e| SvgError::Parse(e.to_string()))?;

    let (intrinsic_w, intrinsic_h) = intrinsic_dimensions(data);
    let (target_w, target_h) = scaled_dimensions(intrinsic_w.max(1), intrinsic_h.max(1));
    if target_w == 0 || target_h == 0 {
        return Err(SvgError::EmptyTarget);
    }

    let mut pixmap = tiny_skia::Pixmap::new(target_w, target_h).ok_or(SvgError::EmptyTarget)?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let size = tree.size();
    let scale_x = target_w as f32 / size.width();
    let scale_y = target_h as f32 / size.height();
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale_x, scale_y),
        &mut pixmap.as_mut(),
    );

    // The pixmap started opaque white, so every pixel is already composited;
    // demultiplication is a no-op at alpha = 255.
    let mut rgb = RgbImage::new(target_w, target_h);
    for (out, px) in rgb.pixels_mut().zip(pixmap.pixels()) {
        let c = px.demultiply();
        out.0 = [c.red(), c.green(), c.blue()];
    }
    Ok(rgb)
}

/// The attribute region of the root `<svg ...>` tag.
fn root_svg_tag(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("<svg")?;
    let rest = &text[start + 4..];
    let end = rest.find('>')?;
    Some(&rest[..end])
}

/// Pull one attribute value out of a tag body (double- or single-quoted).
fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{}=", name.to_ascii_lowercase());
    let mut search = 0usize;
    loop {
        let at = lower[search..].find(&needle)? + search;
        // Reject substring hits like "stroke-width=".
        if at > 0 {
            let before = lower.as_bytes()[at - 1];
            if !(before as char).is_ascii_whitespace() {
                search = at + needle.len();
                continue;
            }
        }
        let rest = &tag[at + needle.len()..];
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let value = &rest[1..];
        let end = value.find(quote)?;
        return Some(&value[..end]);
    }
}

/// Parse a CSS-ish length, accepting a bare number or a `px` suffix.
fn parse_length(value: &str) -> Option<u32> {
    let trimmed = value.trim().trim_end_matches("px").trim();
    let number: f64 = trimmed.parse().ok()?;
    if number > 0.0 {
        Some(number.round() as u32)
    } else {
        None
    }
}
