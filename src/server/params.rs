//! Device parameters carried in the request path.
//!
//! The client encodes its capabilities as path segments ahead of the query:
//! `/c{depth}/` color depth, `/g{depth}/` grayscale depth, `/w{width}/`
//! screen width, and `/e{enc}/` or `/de{enc}/` text encoding. Only the
//! grayscale depth changes transcoding behavior; the rest is informational.

/// Capabilities the client declared for this request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceParams {
    pub color_depth: Option<u32>,
    pub grayscale_depth: Option<u32>,
    pub screen_width: Option<u32>,
    pub encoding: Option<String>,
}

/// Parse the device segments out of a request path. Unrecognized segments
/// are ignored; the last occurrence of a parameter wins.
pub fn parse_device_params(path: &str) -> DeviceParams {
    let mut params = DeviceParams::default();

    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if let Some(value) = numeric_segment(segment, 'c') {
            params.color_depth = Some(value);
        } else if let Some(value) = numeric_segment(segment, 'g') {
            params.grayscale_depth = Some(value);
        } else if let Some(value) = numeric_segment(segment, 'w') {
            params.screen_width = Some(value);
        } else if let Some(encoding) = encoding_segment(segment) {
            params.encoding = Some(encoding.to_string());
        }
    }

    params
}

/// `c16`-style segment: one marker letter followed by digits.
fn numeric_segment(segment: &str, marker: char) -> Option<u32> {
    let rest = segment.strip_prefix(marker)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// `eISO-8859-1` or `deUTF-8`-style segment.
fn encoding_segment(segment: &str) -> Option<&str> {
    let rest = segment
        .strip_prefix("de")
        .or_else(|| segment.strip_prefix('e'))
        .or_else(|| segment.strip_prefix('d'))?;
    if rest.is_empty()
        || !rest
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        || rest.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some(rest)
}
