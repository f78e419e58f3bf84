//! Upstream HTTP client.
//!
//! One `reqwest` client built at startup serves every request. Bodies are
//! read in chunks against a size cap so an oversized upstream response fails
//! fast instead of buffering without bound; `Content-Length` is pre-checked
//! when the server sends one.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use reqwest::header::{COOKIE, SET_COOKIE};
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Upstream redirect ceiling.
const MAX_REDIRECTS: usize = 10;

/// Fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("Upstream content exceeds the configured size limit")]
    ContentTooLarge,
}

/// A fetched page body with the metadata the composer needs.
pub struct FetchedPage {
    pub body: Bytes,
    /// URL after redirects; relative links resolve against this.
    pub final_url: Url,
    /// Raw `Set-Cookie` header values from the upstream response.
    pub set_cookies: Vec<String>,
}

/// Shared upstream HTTP client.
pub struct Fetcher {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl Fetcher {
    pub fn new(config: Arc<Config>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch a page body, capped at `max_page_size`.
    pub async fn fetch_page(
        &self,
        url: &str,
        cookie_header: Option<&str>,
    ) -> Result<FetchedPage, FetchError> {
        let url: Url = url
            .parse()
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        tracing::debug!("fetching page {url}");
        let mut request = self.client.get(url);
        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("upstream returned {status}");
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();

        let body = read_capped(response, self.config.max_page_size).await?;
        tracing::debug!("fetched {} bytes from {final_url}", body.len());

        Ok(FetchedPage {
            body,
            final_url,
            set_cookies,
        })
    }

    /// Fetch an image body, capped at `max_image_size`.
    pub async fn fetch_image(
        &self,
        url: &Url,
        cookie_header: Option<&str>,
    ) -> Result<Bytes, FetchError> {
        tracing::debug!("fetching image {url}");
        let mut request = self.client.get(url.clone());
        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        read_capped(response, self.config.max_image_size).await
    }
}

/// Accumulate a response body, failing as soon as it passes `cap` bytes.
async fn read_capped(mut response: reqwest::Response, cap: usize) -> Result<Bytes, FetchError> {
    if let Some(length) = response.content_length() {
        if length as usize > cap {
            return Err(FetchError::ContentTooLarge);
        }
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > cap {
            return Err(FetchError::ContentTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_page_size: usize) -> Fetcher {
        let config = Config {
            max_page_size,
            ..Config::default()
        };
        Fetcher::new(Arc::new(config)).unwrap()
    }

    #[tokio::test]
    async fn fetches_body_and_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .insert_header("set-cookie", "session=xyz; Path=/"),
            )
            .mount(&server)
            .await;

        let page = fetcher(1024)
            .fetch_page(&format!("{}/page", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(&page.body[..], b"<html></html>");
        assert_eq!(page.set_cookies, vec!["session=xyz; Path=/".to_string()]);
    }

    #[tokio::test]
    async fn forwards_the_cookie_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("cookie", "a=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        fetcher(1024)
            .fetch_page(&format!("{}/page", server.uri()), Some("a=1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn oversize_body_is_content_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let result = fetcher(2048)
            .fetch_page(&format!("{}/big", server.uri()), None)
            .await;
        assert!(matches!(result, Err(FetchError::ContentTooLarge)));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = fetcher(1024)
            .fetch_page(&format!("{}/missing", server.uri()), None)
            .await;
        assert!(matches!(result, Err(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn non_http_schemes_are_rejected() {
        let result = fetcher(1024).fetch_page("ftp://example.com/x", None).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }
}
