//! The proxy's single request handler.
//!
//! The client sends `GET /c16/g4/w160/?http://example.com/` style requests:
//! device parameters as path segments, the target URL as the raw query
//! string. Every response body starts with the 16-byte frame the client
//! expects and is encoded as latin-1 with `?` standing in for anything the
//! charset cannot carry.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Response, StatusCode, Uri};

use crate::cookies;
use crate::fetch::FetchError;
use crate::html::{ComposeError, OutputMode};
use crate::server::params::parse_device_params;
use crate::server::templates;
use crate::server::AppState;

/// The fixed response prefix: twelve NUL bytes then CR LF CR LF.
const FRAME_PREFIX: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0D, 0x0A, 0x0D,
    0x0A,
];

/// Handle one client request end to end.
pub async fn handle_request(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response<Body> {
    let params = parse_device_params(uri.path());
    let output = OutputMode::from_grayscale_depth(params.grayscale_depth);
    let target = uri.query().unwrap_or("").trim();

    tracing::debug!("request path={} target={target:?}", uri.path());

    let Some(target) = normalize_target(target) else {
        return framed_page(&templates::render_home(env!("CARGO_PKG_VERSION")), Vec::new());
    };

    // The client's magic about: URLs map to built-in pages.
    match target {
        Target::Home => framed_page(&templates::render_home(env!("CARGO_PKG_VERSION")), Vec::new()),
        Target::DeviceInfo => framed_page(&templates::render_device_info(&params), Vec::new()),
        Target::Credits => framed_page(&templates::render_credits(), Vec::new()),
        Target::Remote(url) => proxy_page(&state, &url, output, &headers).await,
    }
}

enum Target {
    Home,
    DeviceInfo,
    Credits,
    Remote(String),
}

/// Map the query string onto a target, treating the client's well-known
/// pseudo-hosts as built-in pages.
fn normalize_target(query: &str) -> Option<Target> {
    if query.is_empty() {
        return None;
    }
    match query.trim_end_matches('/') {
        "http://about" | "about:" => Some(Target::Home),
        "http://deviceinfo" => Some(Target::DeviceInfo),
        "http://github" | "http://about2" => Some(Target::Credits),
        _ => Some(Target::Remote(query.to_string())),
    }
}

/// Fetch, compose, and frame one upstream page.
async fn proxy_page(
    state: &AppState,
    url: &str,
    output: OutputMode,
    headers: &HeaderMap,
) -> Response<Body> {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(cookies::filter_request_cookies);

    let page = match state.fetcher.fetch_page(url, cookie_header.as_deref()).await {
        Ok(page) => page,
        Err(error) => {
            tracing::warn!("upstream fetch of {url} failed: {error}");
            let body = match error {
                FetchError::ContentTooLarge => {
                    templates::render_page_too_large(state.config.max_page_size)
                }
                FetchError::InvalidUrl(_) => templates::render_http_error(400),
                FetchError::Status(status) => templates::render_http_error(status),
                FetchError::Request(ref e) if e.is_timeout() => templates::render_http_error(504),
                FetchError::Request(_) => templates::render_http_error(502),
            };
            return framed_page(&body, Vec::new());
        }
    };

    let relayed_cookies = cookies::filter_response_cookies(&page.set_cookies);
    let html = String::from_utf8_lossy(&page.body);

    match state
        .composer
        .compose(&html, &page.final_url, output, cookie_header)
        .await
    {
        Ok(body) => framed_page(&body, relayed_cookies),
        Err(error @ ComposeError::PageTooLarge { .. }) => {
            tracing::warn!("composing {url} failed: {error}");
            framed_page(
                &templates::render_page_too_large(state.config.max_page_size),
                Vec::new(),
            )
        }
    }
}

/// Wrap a page in the client frame. The client reads the error text out of
/// the page body, so the HTTP status is always 200.
fn framed_page(body: &str, set_cookies: Vec<String>) -> Response<Body> {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html");
    for cookie in set_cookies {
        response = response.header(header::SET_COOKIE, cookie);
    }
    response
        .body(Body::from(frame_body(body)))
        .expect("static response headers are valid")
}

/// The 16-byte frame prefix followed by the latin-1 body.
pub fn frame_body(body: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(FRAME_PREFIX.len() + body.len());
    bytes.extend_from_slice(&FRAME_PREFIX);
    bytes.extend(latin1_lossy(body));
    bytes
}

/// Encode to ISO-8859-1, replacing anything outside the charset with `?`.
fn latin1_lossy(text: &str) -> impl Iterator<Item = u8> + '_ {
    text.chars().map(|c| {
        let code = c as u32;
        if code <= 0xFF { code as u8 } else { b'?' }
    })
}
