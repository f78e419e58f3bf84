//! Cookie passthrough under the client's storage limits.
//!
//! The client can hold at most 40 cookies in total, 20 per site, and 4 KB
//! per cookie. The proxy enforces the per-site and per-cookie limits in both
//! directions (each request targets one site) and drops violators with a
//! warning rather than failing the request.

/// Maximum cookies the client stores across all sites.
pub const MAX_TOTAL_COOKIES: usize = 40;
/// Maximum cookies the client stores for one site.
pub const MAX_COOKIES_PER_SITE: usize = 20;
/// Maximum size of one cookie as `name=value`, in bytes.
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Filter a client `Cookie` header for an outgoing upstream request.
///
/// Returns `None` when nothing survives.
pub fn filter_request_cookies(header: &str) -> Option<String> {
    let mut kept = Vec::new();

    for pair in header.split(';') {
        let pair = pair.trim();
        if pair.is_empty() || !pair.contains('=') {
            continue;
        }
        if kept.len() >= MAX_COOKIES_PER_SITE {
            tracing::warn!("dropping request cookies past the per-site limit of {MAX_COOKIES_PER_SITE}");
            break;
        }
        if pair.len() > MAX_COOKIE_SIZE {
            let name = pair.split('=').next().unwrap_or("");
            tracing::warn!("cookie {name} exceeds {MAX_COOKIE_SIZE} bytes, dropping");
            continue;
        }
        kept.push(pair);
    }

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}

/// Filter upstream `Set-Cookie` headers before relaying them to the client.
///
/// Only the `name=value` portion counts toward the size limit; attributes
/// the client ignores are passed through untouched.
pub fn filter_response_cookies(set_cookies: &[String]) -> Vec<String> {
    let mut kept = Vec::new();

    for header in set_cookies {
        if kept.len() >= MAX_COOKIES_PER_SITE {
            tracing::warn!("dropping response cookies past the per-site limit of {MAX_COOKIES_PER_SITE}");
            break;
        }
        let pair = header.split(';').next().unwrap_or("").trim();
        if !pair.contains('=') {
            continue;
        }
        if pair.len() > MAX_COOKIE_SIZE {
            let name = pair.split('=').next().unwrap_or("");
            tracing::warn!("cookie {name} exceeds {MAX_COOKIE_SIZE} bytes, dropping");
            continue;
        }
        kept.push(header.clone());
    }

    kept
}
