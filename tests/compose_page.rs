//! End-to-end page composition tests.
//!
//! These drive the composer through its public interface with inline data:
//! images and a mock upstream, then verify the emitted envelopes down to
//! the decoded bitmap bytes.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ebd_proxy::config::Config;
use ebd_proxy::ebd::{mode9, pack};
use ebd_proxy::fetch::Fetcher;
use ebd_proxy::html::tokenizer::{Token, Tokenizer};
use ebd_proxy::html::whitelist;
use ebd_proxy::html::{ComposeError, OutputMode, PageComposer};

fn composer_with(config: Config) -> PageComposer {
    let config = Arc::new(config);
    let fetcher = Arc::new(Fetcher::new(Arc::clone(&config)).unwrap());
    PageComposer::new(config, fetcher)
}

fn composer() -> PageComposer {
    composer_with(Config::default())
}

fn base_url() -> Url {
    "http://test.example.com/page".parse().unwrap()
}

async fn compose(html: &str) -> String {
    composer()
        .compose(html, &base_url(), OutputMode::Color, None)
        .await
        .unwrap()
}

/// Encode an RGB image as a PNG data: URL.
fn png_data_url(img: &image::RgbImage) -> String {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", BASE64.encode(&bytes))
}

fn black_png(width: u32, height: u32) -> String {
    png_data_url(&image::RgbImage::from_pixel(width, height, image::Rgb([0, 0, 0])))
}

/// Pull the base64 payload out of the NAMEd EBDIMAGE tag.
fn envelope_payload(output: &str, name: u32) -> Vec<u8> {
    let marker = format!("NAME=\"{name}\"><!--");
    let start = output.find(&marker).expect("envelope present") + marker.len();
    let end = output[start..].find("-->").expect("envelope closed") + start;
    BASE64.decode(&output[start..end]).expect("valid base64")
}

#[tokio::test]
async fn converts_basic_markup_to_uppercase_subset() {
    let output = compose(
        "<html><body><h1>Test Page</h1><p>This is a test paragraph</p></body></html>",
    )
    .await;
    assert!(output.contains("<BODY>"));
    assert!(output.contains("<H1>"));
    assert!(output.contains("Test Page"));
    assert!(output.contains("<P>"));
    assert!(output.contains("This is a test paragraph"));
    assert!(output.contains("</H1>"));
}

#[tokio::test]
async fn relative_links_resolve_against_the_base() {
    let output = compose(r#"<a href="/x">T</a>"#).await;
    assert!(
        output.contains(r#"HREF="http://test.example.com/x""#),
        "got: {output}"
    );
}

#[tokio::test]
async fn https_links_downgrade_to_http() {
    let output = compose(r#"<a href="https://y.com/">T</a>"#).await;
    assert!(output.contains(r#"HREF="http://y.com/""#), "got: {output}");
}

#[tokio::test]
async fn disallowed_attributes_are_dropped_tag_kept() {
    let output = compose(r#"<div align="center" style="x">t</div>"#).await;
    assert!(output.contains(r#"<DIV ALIGN="center">"#), "got: {output}");
    assert!(!output.contains("STYLE"));

    let output = compose(r#"<div align="invalid">t</div>"#).await;
    assert!(output.contains("<DIV>"), "got: {output}");
    assert!(!output.contains("ALIGN"));
}

#[tokio::test]
async fn unknown_tags_suppress_their_text() {
    let output = compose("<p>keep</p><span>hidden</span>middle<p>keep2</p>").await;
    assert!(output.contains("keep"));
    assert!(output.contains("keep2"));
    // Text after the unknown tag closes comes back.
    assert!(output.contains("middle"));
    assert!(!output.contains("hidden"));

    let output = compose("<script>var secret = 1;</script><p>shown</p>").await;
    assert!(!output.contains("secret"));
    assert!(output.contains("shown"));
}

#[tokio::test]
async fn unclosed_wrapper_tags_do_not_swallow_the_page() {
    // <html> is not in the client's tag set; its children still render.
    let output = compose("<html><body><h1>Title</h1></body></html>").await;
    assert!(output.contains("Title"));
    assert!(output.contains("<H1>"));
}

#[tokio::test]
async fn output_tags_are_a_subset_of_the_whitelist() {
    let gnarly = r#"
        <!DOCTYPE html><html><head><title>T</title><style>b{}</style></head>
        <body onload="x()"><div align="left"><span>s<video>v</video></span>
        <table><tr><td valign="top">cell</td></tr></table>
        <blink>w</blink><marquee>m</marquee><custom-el>c</custom-el>
        <form method="post" action="/go"><input type="text" name="q"></form>
        </div></body></html>"#;
    let output = compose(gnarly).await;

    for token in Tokenizer::new(&output) {
        match token {
            Token::StartTag { name, .. } | Token::EndTag { name } => {
                let upper = name.to_ascii_uppercase();
                assert!(
                    whitelist::is_supported(&upper),
                    "tag {upper} escaped the whitelist in: {output}"
                );
            }
            Token::Text(_) => {}
        }
    }
}

#[tokio::test]
async fn oversized_text_raises_page_too_large() {
    let config = Config {
        max_page_size: 1024,
        ..Config::default()
    };
    let big_text = format!("<p>{}</p>", "x".repeat(2048));
    let result = composer_with(config)
        .compose(&big_text, &base_url(), OutputMode::Color, None)
        .await;
    assert!(matches!(result, Err(ComposeError::PageTooLarge { .. })));
}

#[tokio::test]
async fn tiny_black_png_becomes_a_mode9_envelope() {
    let html = format!(r#"<img src="{}">"#, black_png(10, 10));
    let output = compose(&html).await;

    assert!(output.contains(r##"EBD="#1""##), "got: {output}");
    assert!(output.contains(r#"<EBDIMAGE MODE="9" NAME="1">"#), "got: {output}");
    assert!(output.contains(r#"WIDTH="5" HEIGHT="5""#), "got: {output}");

    // The 10x10 source is halved to 5x5; solid black maps to palette
    // index 0 everywhere.
    let payload = envelope_payload(&output, 1);
    let indices = mode9::decompress(&payload, 5, 5).unwrap();
    assert_eq!(indices, vec![0u8; 25]);
}

#[tokio::test]
async fn grayscale_request_uses_mode_4() {
    let html = format!(r#"<img src="{}">"#, black_png(10, 10));
    let output = composer()
        .compose(
            &html,
            &base_url(),
            OutputMode::from_grayscale_depth(Some(4)),
            None,
        )
        .await
        .unwrap();

    assert!(output.contains(r#"<EBDIMAGE MODE="4" NAME="1">"#), "got: {output}");

    // Unpacking two nibbles per byte gives the inverted black level 15.
    let payload = envelope_payload(&output, 1);
    let levels = pack::unpack_4bit(&payload, 5, 5);
    assert_eq!(levels, vec![15u8; 25]);
}

#[tokio::test]
async fn image_limit_replaces_excess_images() {
    let config = Config {
        max_images_per_page: 2,
        ..Config::default()
    };
    let img = black_png(4, 4);
    let html = format!(
        r#"<img src="{img}"><img src="{img}"><img src="{img}"><img src="{img}">"#
    );
    let output = composer_with(config)
        .compose(&html, &base_url(), OutputMode::Color, None)
        .await
        .unwrap();

    assert_eq!(output.matches("<EBDIMAGE").count(), 2);
    assert_eq!(output.matches("<p>[Image limit exceeded]</p>").count(), 2);
}

#[tokio::test]
async fn envelope_names_follow_document_order() {
    let img = black_png(4, 4);
    let html = format!(r#"<img src="{img}"><img src="{img}"><img src="{img}">"#);
    let output = compose(&html).await;

    let positions: Vec<usize> = (1..=3)
        .map(|n| {
            output
                .find(&format!(r#"NAME="{n}""#))
                .unwrap_or_else(|| panic!("envelope {n} missing"))
        })
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2]);

    let refs: Vec<usize> = (1..=3)
        .map(|n| output.find(&format!(r##"EBD="#{n}""##)).unwrap())
        .collect();
    assert!(refs[0] < refs[1] && refs[1] < refs[2]);
}

#[tokio::test]
async fn invalid_image_sources_get_a_diagnostic() {
    let output = compose(r#"<img src="not a url"><p>rest</p>"#).await;
    assert!(output.contains("<p>[Invalid image URL]</p>"), "got: {output}");
    assert!(output.contains("rest"));

    let output = compose(r#"<img src="data:text/plain;base64,aGk="><p>rest</p>"#).await;
    assert!(output.contains("<p>[Invalid image URL]</p>"), "got: {output}");
}

#[tokio::test]
async fn remote_image_is_fetched_and_transcoded() {
    let server = MockServer::start().await;
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(10, 10, image::Rgb([0, 0, 0])))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/t.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png))
        .mount(&server)
        .await;

    let page_base: Url = format!("{}/index.html", server.uri()).parse().unwrap();
    let output = composer()
        .compose(
            r#"<img src="/t.png">"#,
            &page_base,
            OutputMode::Color,
            None,
        )
        .await
        .unwrap();

    assert!(output.contains(r#"<EBDIMAGE MODE="9" NAME="1">"#), "got: {output}");
    let payload = envelope_payload(&output, 1);
    let indices = mode9::decompress(&payload, 5, 5).unwrap();
    assert_eq!(indices, vec![0u8; 25]);
}

#[tokio::test]
async fn failed_remote_image_does_not_kill_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let page_base: Url = format!("{}/index.html", server.uri()).parse().unwrap();
    let output = composer()
        .compose(
            r#"<p>before</p><img src="/gone.png"><p>after</p>"#,
            &page_base,
            OutputMode::Color,
            None,
        )
        .await
        .unwrap();

    assert!(output.contains("<p>[Image processing error]</p>"), "got: {output}");
    assert!(output.contains("before"));
    assert!(output.contains("after"));
}

#[tokio::test]
async fn oversized_envelope_cancels_the_page() {
    let config = Config {
        max_page_size: 1024,
        ..Config::default()
    };
    // Pseudo-noise defeats both RLE and vertical copies, so the mode 9
    // stream stays far larger than the 1 KB budget.
    let mut img = image::RgbImage::new(80, 80);
    let mut state = 0xDEADBEEFu32;
    for px in img.pixels_mut() {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        px.0 = [(state >> 8) as u8, (state >> 16) as u8, (state >> 24) as u8];
    }
    let html = format!(r#"<img src="{}">"#, png_data_url(&img));

    let result = composer_with(config)
        .compose(&html, &base_url(), OutputMode::Color, None)
        .await;
    assert!(matches!(result, Err(ComposeError::PageTooLarge { .. })));
}

#[tokio::test]
async fn svg_data_url_is_rasterized() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
        <rect width="40" height="20" fill="black"/></svg>"#;
    let html = format!(
        r#"<img src="data:image/svg+xml;base64,{}">"#,
        BASE64.encode(svg)
    );
    let output = compose(&html).await;

    // 40x20 declared size halves to 20x10.
    assert!(output.contains(r#"WIDTH="20" HEIGHT="10""#), "got: {output}");
    let payload = envelope_payload(&output, 1);
    let indices = mode9::decompress(&payload, 20, 10).unwrap();
    assert_eq!(indices, vec![0u8; 200]);
}

#[tokio::test]
async fn oversize_data_url_is_rejected_as_too_large() {
    let config = Config {
        max_data_url_size: 64,
        ..Config::default()
    };
    let html = format!(r#"<img src="{}">"#, black_png(32, 32));
    let output = composer_with(config)
        .compose(&html, &base_url(), OutputMode::Color, None)
        .await
        .unwrap();
    assert!(output.contains("<p>[Image too large]</p>"), "got: {output}");
}
