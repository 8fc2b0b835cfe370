//! Embeddable mock server bound to an ephemeral local port.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::error::ConfigError;
use crate::http::build_router;
use crate::http::state::{AppState, AppStateBuilder};
use crate::mock::{Mock, MockHandle};

/// A running mock server.
///
/// Each server owns its own dispatcher and store. The server stops when
/// [`MockServer::shutdown`] is called or the value is dropped.
pub struct MockServer {
    address: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    /// Start a server with default settings on `127.0.0.1` and a random port.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound.
    pub async fn start() -> io::Result<Self> {
        Self::start_with(AppState::builder()).await
    }

    /// Start a server from a configured state builder.
    ///
    /// # Parameters
    ///
    /// - `builder` - State builder carrying store and dispatch settings
    ///
    /// # Returns
    ///
    /// Returns the running server.
    ///
    /// # Errors
    ///
    /// Returns error if the settings are invalid or the listener cannot be bound.
    pub async fn start_with(builder: AppStateBuilder) -> io::Result<Self> {
        let state = builder.build()?;
        let dispatcher = Arc::clone(&state.dispatcher);

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let address = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        let app = build_router(state);
        tokio::spawn(async move {
            let shutdown = async {
                // A dropped sender stops the server as well
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!("mock server on {address} failed: {e}");
            }
            debug!("mock server on {address} stopped");
        });

        info!("mock server listening on http://{address}");
        Ok(Self { address, dispatcher, shutdown: Some(tx) })
    }

    /// Socket address the server listens on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Full URL for `path` on this server.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.url(), path.trim_start_matches('/'))
    }

    /// Dispatcher serving this server's requests.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Register a mock with this server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the mock's configuration is invalid.
    pub fn register(&self, mock: Mock) -> Result<MockHandle, ConfigError> {
        self.dispatcher.register(mock)
    }

    /// Remove every mock registered with this server.
    pub fn reset(&self) {
        self.dispatcher.store().reset();
    }

    /// Stop accepting connections. In-flight requests are allowed to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
