//! Page composition: constrained HTML out, EBD envelopes in.
//!
//! The tokenizer walks the upstream document synchronously, emitting
//! whitelisted tags and text into an ordered chunk buffer. Every `<img>`
//! reserves a chunk slot and spawns a concurrent task that fetches,
//! transcodes, and envelopes the image into that slot; document order is
//! the slot order, never completion order. A shared byte budget guards the
//! whole page: text chunks are checked as they are written, image envelopes
//! atomically at slot-finalize time, and the first violation cancels every
//! sibling task.

pub mod tokenizer;
pub mod whitelist;

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use crate::color::GrayLevels;
use crate::config::Config;
use crate::ebd::{EbdConverter, EbdImage};
use crate::fetch::{FetchError, Fetcher};
use crate::html::tokenizer::{Token, Tokenizer};
use crate::svg;

/// Decoded source images above this pixel count are rejected outright.
const MAX_SOURCE_PIXELS: u64 = 1_000_000;

/// Unknown-but-void tags that must not open text suppression: they never
/// get an end tag.
const UNKNOWN_VOID_TAGS: &[&str] = &["LINK", "EMBED", "SOURCE", "TRACK", "WBR", "COL", "PARAM"];

/// Mime types accepted inside data: URLs.
const DATA_URL_MIMES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/svg+xml",
    "image/webp",
];

/// Bitmap output selected by the client's device parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// 231-color, mode 9.
    Color,
    /// 1-bit, mode 0.
    BlackAndWhite,
    /// 2- or 4-bit grayscale, modes 2 and 4.
    Gray(GrayLevels),
}

impl OutputMode {
    /// Interpret the `/g{depth}/` path parameter. Color unless a grayscale
    /// bit depth was requested; unknown depths fall back to 4-bit.
    pub fn from_grayscale_depth(depth: Option<u32>) -> Self {
        match depth {
            None | Some(0) => OutputMode::Color,
            Some(1) => OutputMode::BlackAndWhite,
            Some(2) => OutputMode::Gray(GrayLevels::Four),
            Some(4) => OutputMode::Gray(GrayLevels::Sixteen),
            Some(other) => {
                tracing::warn!("unsupported grayscale depth {other}, using 4-bit");
                OutputMode::Gray(GrayLevels::Sixteen)
            }
        }
    }

    fn convert(self, converter: &EbdConverter) -> EbdImage {
        match self {
            OutputMode::Color => converter.convert_color(true),
            OutputMode::BlackAndWhite => converter.convert_bw(false),
            OutputMode::Gray(levels) => converter.convert_gs(levels, false),
        }
    }
}

/// Composition errors
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Page exceeds the output budget of {limit} bytes")]
    PageTooLarge { limit: usize },
}

/// Byte accounting shared between the tokenizer loop and the image tasks.
struct PageBudget {
    total: usize,
    limit: usize,
}

impl PageBudget {
    fn try_add(&mut self, len: usize) -> Result<(), ComposeError> {
        if self.total + len > self.limit {
            Err(ComposeError::PageTooLarge { limit: self.limit })
        } else {
            self.total += len;
            Ok(())
        }
    }
}

/// Per-image failure. Never fatal to the page; each maps to an inline
/// diagnostic filling the image's slot.
#[derive(Debug, Clone, Copy)]
enum ImageFailure {
    InvalidUrl,
    TooLarge,
    Timeout,
    DimensionsTooLarge,
    Unsupported,
    Processing,
}

impl ImageFailure {
    fn diagnostic(self) -> &'static str {
        match self {
            ImageFailure::InvalidUrl => "<p>[Invalid image URL]</p>\n",
            ImageFailure::TooLarge => "<p>[Image too large]</p>\n",
            ImageFailure::Timeout => "<p>[Image processing timeout]</p>\n",
            ImageFailure::DimensionsTooLarge => "<p>[Image dimensions too large]</p>\n",
            ImageFailure::Unsupported => "<p>[Unsupported image]</p>\n",
            ImageFailure::Processing => "<p>[Image processing error]</p>\n",
        }
    }
}

/// A validated image reference.
enum ImageSource {
    Remote(Url),
    DataUrl { mime: String, payload: String },
}

/// Composes one page at a time; owns nothing request-scoped itself.
pub struct PageComposer {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
}

impl PageComposer {
    pub fn new(config: Arc<Config>, fetcher: Arc<Fetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Transcode one HTML document. Relative links resolve against
    /// `base_url`; `cookie_header` is forwarded to image fetches.
    pub async fn compose(
        &self,
        html: &str,
        base_url: &Url,
        output: OutputMode,
        cookie_header: Option<String>,
    ) -> Result<String, ComposeError> {
        let budget = Arc::new(Mutex::new(PageBudget {
            total: 0,
            limit: self.config.max_page_size,
        }));
        let mut chunks: Vec<Option<String>> = Vec::new();
        let mut tasks: Vec<(usize, JoinHandle<Result<String, ComposeError>>)> = Vec::new();

        let walk = self.walk_document(
            html,
            base_url,
            output,
            &cookie_header,
            &budget,
            &mut chunks,
            &mut tasks,
        );
        if let Err(error) = walk {
            for (_, handle) in &tasks {
                handle.abort();
            }
            return Err(error);
        }

        // Join in slot order; the first budget violation cancels the rest.
        let mut failure: Option<ComposeError> = None;
        for (slot, handle) in tasks {
            if failure.is_some() {
                handle.abort();
                continue;
            }
            match handle.await {
                Ok(Ok(chunk)) => chunks[slot] = Some(chunk),
                Ok(Err(error)) => failure = Some(error),
                Err(join_error) if join_error.is_panic() => {
                    tracing::error!("image task panicked");
                    let diagnostic = ImageFailure::Processing.diagnostic();
                    match budget.lock().unwrap().try_add(diagnostic.len()) {
                        Ok(()) => chunks[slot] = Some(diagnostic.to_string()),
                        Err(error) => failure = Some(error),
                    }
                }
                Err(_) => {}
            }
        }
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(chunks.into_iter().flatten().collect())
    }

    /// The synchronous tokenizer pass: emit text chunks, reserve image
    /// slots, spawn image tasks.
    #[allow(clippy::too_many_arguments)]
    fn walk_document(
        &self,
        html: &str,
        base_url: &Url,
        output: OutputMode,
        cookie_header: &Option<String>,
        budget: &Arc<Mutex<PageBudget>>,
        chunks: &mut Vec<Option<String>>,
        tasks: &mut Vec<(usize, JoinHandle<Result<String, ComposeError>>)>,
    ) -> Result<(), ComposeError> {
        // Active unknown-tag suppression: (uppercase name, nesting depth).
        // Ends at the unknown tag's matching end tag, or at the next
        // supported start tag so an unclosed wrapper like <html> cannot
        // swallow the document.
        let mut suppressed: Option<(String, usize)> = None;
        let mut image_count = 0usize;
        let mut next_name = 0u32;

        let push_chunk = |chunks: &mut Vec<Option<String>>, chunk: String| {
            budget.lock().unwrap().try_add(chunk.len())?;
            chunks.push(Some(chunk));
            Ok::<(), ComposeError>(())
        };

        for token in Tokenizer::new(html) {
            match token {
                Token::StartTag {
                    name,
                    attrs,
                    self_closing,
                } => {
                    let upper = name.to_ascii_uppercase();
                    if !whitelist::is_supported(&upper) {
                        match suppressed.as_mut() {
                            Some((tag, depth)) => {
                                if upper == *tag && !self_closing {
                                    *depth += 1;
                                }
                            }
                            None => {
                                if !self_closing && !UNKNOWN_VOID_TAGS.contains(&upper.as_str()) {
                                    suppressed = Some((upper, 0));
                                }
                            }
                        }
                        continue;
                    }
                    suppressed = None;

                    if upper == "IMG" {
                        let src = attrs
                            .iter()
                            .find(|(n, _)| n == "src")
                            .map(|(_, v)| v.clone());
                        let alt = attrs
                            .iter()
                            .find(|(n, _)| n == "alt")
                            .map(|(_, v)| v.clone());
                        let Some(src) = src else {
                            tracing::warn!("IMG with no SRC under {base_url}");
                            continue;
                        };

                        if image_count >= self.config.max_images_per_page {
                            push_chunk(chunks, "<p>[Image limit exceeded]</p>\n".to_string())?;
                            continue;
                        }

                        match self.validate_src(&src, base_url) {
                            Err(failure) => {
                                tracing::warn!("rejecting image {src}: {failure:?}");
                                push_chunk(chunks, failure.diagnostic().to_string())?;
                            }
                            Ok(source) => {
                                image_count += 1;
                                next_name += 1;
                                let slot = chunks.len();
                                chunks.push(None);
                                let handle = tokio::spawn(image_task(
                                    source,
                                    next_name,
                                    alt,
                                    output,
                                    Arc::clone(&self.config),
                                    Arc::clone(&self.fetcher),
                                    Arc::clone(budget),
                                    cookie_header.clone(),
                                ));
                                tasks.push((slot, handle));
                            }
                        }
                        continue;
                    }

                    push_chunk(chunks, render_start_tag(&upper, &attrs, base_url))?;
                }
                Token::EndTag { name } => {
                    let upper = name.to_ascii_uppercase();
                    if let Some((tag, depth)) = suppressed.as_mut() {
                        if upper == *tag {
                            if *depth == 0 {
                                suppressed = None;
                            } else {
                                *depth -= 1;
                            }
                        }
                        continue;
                    }
                    if whitelist::is_supported(&upper) && !whitelist::is_void(&upper) {
                        push_chunk(chunks, format!("</{upper}>\n"))?;
                    }
                }
                Token::Text(text) => {
                    if suppressed.is_some() {
                        continue;
                    }
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        push_chunk(chunks, format!("{trimmed}\n"))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Accept http/https absolute URLs, site-relative paths, and
    /// whitelisted base64 data: URLs.
    fn validate_src(&self, src: &str, base_url: &Url) -> Result<ImageSource, ImageFailure> {
        if let Some(rest) = src.strip_prefix("data:") {
            let (header, payload) = rest.split_once(',').ok_or(ImageFailure::InvalidUrl)?;
            let header = header.to_ascii_lowercase();
            let mime = header.split(';').next().unwrap_or("").to_string();
            if !DATA_URL_MIMES.contains(&mime.as_str()) || !header.contains("base64") {
                return Err(ImageFailure::InvalidUrl);
            }
            if payload.len() > self.config.max_data_url_size {
                return Err(ImageFailure::TooLarge);
            }
            return Ok(ImageSource::DataUrl {
                mime,
                payload: payload.to_string(),
            });
        }

        if src.starts_with("http://") || src.starts_with("https://") {
            let url = src.parse().map_err(|_| ImageFailure::InvalidUrl)?;
            return Ok(ImageSource::Remote(url));
        }

        if src.starts_with('/') {
            let url = base_url.join(src).map_err(|_| ImageFailure::InvalidUrl)?;
            return Ok(ImageSource::Remote(url));
        }

        Err(ImageFailure::InvalidUrl)
    }
}

/// Render a whitelisted start tag: uppercase names, filtered attributes,
/// double-quoted values, links rewritten for the client.
fn render_start_tag(upper: &str, attrs: &[(String, String)], base_url: &Url) -> String {
    let mut out = format!("<{upper}");
    for (name, value) in attrs {
        let attr_upper = name.to_ascii_uppercase();
        if !whitelist::is_allowed_attribute(upper, &attr_upper) {
            continue;
        }
        if !whitelist::is_allowed_value(upper, &attr_upper, value) {
            continue;
        }
        if upper == "A" && attr_upper == "HREF" {
            out.push_str(&format!(" HREF=\"{}\"", rewrite_link(value, base_url)));
        } else {
            out.push_str(&format!(" {attr_upper}=\"{value}\""));
        }
    }
    out.push_str(">\n");
    out
}

/// Resolve a link against the page base and strip TLS: the client predates
/// it.
fn rewrite_link(href: &str, base_url: &Url) -> String {
    match base_url.join(href) {
        Ok(mut url) => {
            if url.scheme() == "https" {
                let _ = url.set_scheme("http");
            }
            url.to_string()
        }
        Err(_) => href.to_string(),
    }
}

/// One image's whole lifecycle: acquire, transcode, envelope, finalize.
///
/// Only a budget violation escapes as an error; everything else becomes an
/// inline diagnostic so the rest of the page survives.
async fn image_task(
    source: ImageSource,
    name: u32,
    alt: Option<String>,
    output: OutputMode,
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    budget: Arc<Mutex<PageBudget>>,
    cookie_header: Option<String>,
) -> Result<String, ComposeError> {
    let outcome = tokio::time::timeout(
        config.image_timeout(),
        process_image(source, output, &config, &fetcher, cookie_header.as_deref()),
    )
    .await;

    let chunk = match outcome {
        Ok(Ok(ebd)) => format!("{}\n{}\n", ebd.img_tag(name, alt.as_deref()), ebd.ebdimage_tag(name)),
        Ok(Err(failure)) => {
            tracing::warn!("image {name} failed: {failure:?}");
            failure.diagnostic().to_string()
        }
        Err(_) => {
            tracing::warn!("image {name} timed out");
            ImageFailure::Timeout.diagnostic().to_string()
        }
    };

    budget.lock().unwrap().try_add(chunk.len())?;
    Ok(chunk)
}

async fn process_image(
    source: ImageSource,
    output: OutputMode,
    config: &Arc<Config>,
    fetcher: &Fetcher,
    cookie_header: Option<&str>,
) -> Result<EbdImage, ImageFailure> {
    let (bytes, svg_mime): (bytes::Bytes, bool) = match source {
        ImageSource::DataUrl { mime, payload } => {
            let bytes = BASE64
                .decode(payload.as_bytes())
                .map_err(|_| ImageFailure::InvalidUrl)?;
            (bytes.into(), mime.contains("svg"))
        }
        ImageSource::Remote(url) => {
            let bytes = fetcher
                .fetch_image(&url, cookie_header)
                .await
                .map_err(|error| match error {
                    FetchError::ContentTooLarge => ImageFailure::TooLarge,
                    FetchError::InvalidUrl(_) => ImageFailure::InvalidUrl,
                    FetchError::Request(_) | FetchError::Status(_) => ImageFailure::Processing,
                })?;
            (bytes, false)
        }
    };

    if bytes.len() > config.max_image_size {
        return Err(ImageFailure::TooLarge);
    }

    if svg_mime || svg::is_svg(&bytes) {
        return process_svg(bytes, output, config).await;
    }

    let dither = config.dither;
    let max_dimension = config.max_image_dimension;
    tokio::task::spawn_blocking(move || -> Result<EbdImage, ImageFailure> {
        let decoded = image::load_from_memory(&bytes).map_err(|_| ImageFailure::Unsupported)?;
        let (width, height) = (decoded.width(), decoded.height());
        if width as u64 * height as u64 > MAX_SOURCE_PIXELS
            || width > max_dimension
            || height > max_dimension
        {
            return Err(ImageFailure::DimensionsTooLarge);
        }
        let converter = EbdConverter::new(decoded, dither);
        Ok(output.convert(&converter))
    })
    .await
    .map_err(|_| ImageFailure::Processing)?
}

/// SVG branch: rasterize under the dedicated size cap and timeout, then
/// encode at the already-final dimensions.
async fn process_svg(
    bytes: bytes::Bytes,
    output: OutputMode,
    config: &Arc<Config>,
) -> Result<EbdImage, ImageFailure> {
    if bytes.len() > config.max_svg_size {
        return Err(ImageFailure::TooLarge);
    }

    let rendered = tokio::time::timeout(
        config.svg_timeout(),
        tokio::task::spawn_blocking(move || svg::rasterize(&bytes)),
    )
    .await
    .map_err(|_| ImageFailure::Timeout)?
    .map_err(|_| ImageFailure::Processing)?
    .map_err(|_| ImageFailure::Unsupported)?;

    let dither = config.dither;
    tokio::task::spawn_blocking(move || {
        let converter =
            EbdConverter::without_scaling(image::DynamicImage::ImageRgb8(rendered), dither);
        output.convert(&converter)
    })
    .await
    .map_err(|_| ImageFailure::Processing)
}
