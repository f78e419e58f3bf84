//! Built-in pages, embedded as template functions.
//!
//! Everything here is already inside the client's HTML subset and is served
//! through the same frame + latin-1 pipeline as proxied pages.

use crate::server::params::DeviceParams;

/// Home page, reached via the client's `http://about/` magic URL.
pub fn render_home(version: &str) -> String {
    format!(
        r#"<HEAD><TITLE>EBD Proxy</TITLE></HEAD>
<BODY>
<H1>EBD Proxy</H1>
<P>Version {version}</P>
<P>This server fetches web pages and converts them for your handheld browser.</P>
<P>Enter a URL in the address bar to begin.</P>
<HR>
<P><A HREF="http://deviceinfo/">Device info</A> | <A HREF="http://github/">Credits</A></P>
</BODY>"#
    )
}

/// Device info page: echoes the parameters the client put in its request
/// path.
pub fn render_device_info(params: &DeviceParams) -> String {
    fn show_number(value: Option<u32>) -> String {
        value.map_or_else(|| "not sent".to_string(), |v| v.to_string())
    }
    let encoding = params
        .encoding
        .as_deref()
        .unwrap_or("not sent");

    format!(
        r#"<HEAD><TITLE>Device Info</TITLE></HEAD>
<BODY>
<H1>Device Info</H1>
<P>Color depth: {color}</P>
<P>Grayscale depth: {gray}</P>
<P>Screen width: {width}</P>
<P>Text encoding: {encoding}</P>
<HR>
<P><A HREF="http://about/">Back</A></P>
</BODY>"#,
        color = show_number(params.color_depth),
        gray = show_number(params.grayscale_depth),
        width = show_number(params.screen_width),
    )
}

/// Credits page, reached via `http://github/`.
pub fn render_credits() -> String {
    r#"<HEAD><TITLE>Credits</TITLE></HEAD>
<BODY>
<H1>Credits</H1>
<P>Thanks to everyone who documented the EBD bitmap formats and the
data server protocol this proxy speaks.</P>
<P><A HREF="http://about/">Back</A></P>
</BODY>"#
        .to_string()
}

/// Served when a page blows the output budget.
pub fn render_page_too_large(limit_bytes: usize) -> String {
    format!(
        r#"<HEAD><TITLE>Page Too Large</TITLE></HEAD>
<BODY>
<H1>Page Too Large</H1>
<P>The requested page is larger than this proxy's limit of {kb} KB and
cannot be displayed on your device.</P>
<P><A HREF="http://about/">Home</A></P>
</BODY>"#,
        kb = limit_bytes / 1024
    )
}

/// HTTP status code to (title, message) mapping for error pages.
const HTTP_STATUS_MESSAGES: &[(u16, &str, &str)] = &[
    (400, "Bad Request", "The request could not be understood due to malformed syntax."),
    (401, "Unauthorized", "Access to this page requires proper authentication."),
    (403, "Forbidden", "You do not have permission to access this resource."),
    (404, "Not Found", "The requested page could not be found."),
    (429, "Too Many Requests", "You have sent too many requests in a given amount of time."),
    (500, "Internal Server Error", "The server encountered an unexpected condition."),
    (502, "Bad Gateway", "The proxy received an invalid response from an upstream server."),
    (503, "Service Unavailable", "The server is temporarily unable to handle your request."),
    (504, "Gateway Timeout", "The proxy did not receive a timely response from the upstream server."),
];

/// Error page for an HTTP status; unknown codes get a generic page.
pub fn render_http_error(status: u16) -> String {
    let (title, message) = HTTP_STATUS_MESSAGES
        .iter()
        .find(|(code, _, _)| *code == status)
        .map(|(_, title, message)| (*title, *message))
        .unwrap_or(("Error", "An unknown error occurred."));

    format!(
        r#"<HEAD><TITLE>{status} {title}</TITLE></HEAD>
<BODY>
<H1>{title}</H1>
<P>{message}</P>
<P><A HREF="http://about/">Home</A></P>
</BODY>"#
    )
}
