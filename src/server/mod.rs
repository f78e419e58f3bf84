//! The proxy's HTTP server.
//!
//! One catch-all route: the client encodes everything it needs in the
//! request path and query string, so routing by path template would only
//! get in the way.

pub mod params;
pub mod routes;
pub mod templates;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::html::PageComposer;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: Arc<Fetcher>,
    pub composer: Arc<PageComposer>,
}

/// The proxy server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: Arc<Config>, fetcher: Arc<Fetcher>) -> Self {
        let composer = Arc::new(PageComposer::new(Arc::clone(&config), Arc::clone(&fetcher)));
        Self {
            state: AppState {
                config,
                fetcher,
                composer,
            },
        }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .fallback(get(routes::handle_request))
            .with_state(self.state.clone())
    }

    /// Run until the shutdown future resolves.
    pub async fn run_with_shutdown(
        &self,
        port: u16,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("proxy listening on http://{addr}");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}
