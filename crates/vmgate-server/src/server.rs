//! The API server lifecycle: bind, accept, serve, drain.

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::Service;
use vmgate_driver::Driver;
use vmgate_utility::certificate::CertificatePaths;

use crate::api::{create_router, AppState};
use crate::tls::load_tls_config;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised while running the API server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup failure.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// The mTLS API server.
pub struct ApiServer {
    address: String,
    port: u16,
    version: String,
    driver: Arc<dyn Driver>,
}

/// Handle to a started server, used to stop and drain it.
pub struct ServerHandle {
    cancel: CancellationToken,
    tracker: TaskTracker,
    halted: CancellationToken,
}

impl ServerHandle {
    /// Closes the listener, then waits until every inflight request
    /// has completed.
    pub async fn stop(&self) {
        tracing::debug!("stop api service requested");
        self.cancel.cancel();
        tracing::trace!("wait for inflight requests to complete");
        self.tracker.wait().await;
        tracing::trace!("api consumer halted");
    }

    /// Completes once the server has fully halted.
    pub async fn halted(&self) {
        self.halted.cancelled().await;
    }
}

impl ApiServer {
    /// Builds a server bound to `address:port` for `driver`.
    #[must_use]
    pub fn new(address: &str, port: u16, version: &str, driver: Arc<dyn Driver>) -> Self {
        Self {
            address: address.to_string(),
            port,
            version: version.to_string(),
            driver,
        }
    }

    /// Binds the TLS listener and starts serving.
    ///
    /// # Errors
    ///
    /// Returns an error when certificate material cannot be loaded or
    /// the listener cannot bind.
    pub async fn start(&self) -> Result<ServerHandle> {
        let cert_paths =
            CertificatePaths::resolve().map_err(|err| ServerError::Tls(err.to_string()))?;
        self.start_with_certificates(&cert_paths).await
    }

    /// Binds using explicit certificate paths.
    ///
    /// # Errors
    ///
    /// Returns an error when certificate material cannot be loaded or
    /// the listener cannot bind.
    pub async fn start_with_certificates(
        &self,
        cert_paths: &CertificatePaths,
    ) -> Result<ServerHandle> {
        tracing::info!(host = %self.address, port = self.port, "api service start");
        // Pin the process-wide TLS crypto provider; a no-op after the
        // first call.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let tls_config = load_tls_config(cert_paths)?;
        let acceptor = TlsAcceptor::from(tls_config);
        let listener = TcpListener::bind((self.address.as_str(), self.port)).await?;

        let state = AppState::new(
            Arc::clone(&self.driver),
            &self.address,
            self.port,
            &self.version,
        );
        let app = create_router(state);

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let halted = CancellationToken::new();

        let accept_cancel = cancel.clone();
        let accept_tracker = tracker.clone();
        let accept_halted = halted.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = accept_cancel.cancelled() => {
                        tracing::debug!("stop notification received, closing");
                        break;
                    }
                    result = listener.accept() => {
                        let (stream, peer) = match result {
                            Ok(accepted) => accepted,
                            Err(err) => {
                                tracing::warn!(error = %err, "listener accept failure");
                                continue;
                            }
                        };
                        tracing::trace!(%peer, "connection accepted");
                        let acceptor = acceptor.clone();
                        let app = app.clone();
                        accept_tracker.spawn(async move {
                            serve_connection(acceptor, stream, app).await;
                        });
                    }
                }
            }
            drop(listener);
            accept_tracker.close();
            accept_halted.cancel();
        });

        tracing::debug!("api ready for message consumption");
        Ok(ServerHandle {
            cancel,
            tracker,
            halted,
        })
    }
}

/// Performs the TLS handshake and serves HTTP/1 on one connection.
async fn serve_connection(
    acceptor: TlsAcceptor,
    stream: tokio::net::TcpStream,
    app: axum::Router,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(err) => {
            tracing::debug!(error = %err, "tls handshake failed");
            return;
        }
    };
    let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
        app.clone().call(request)
    });
    if let Err(err) = http1::Builder::new()
        .serve_connection(TokioIo::new(tls_stream), service)
        .await
    {
        let text = err.to_string().to_lowercase();
        if !text.contains("connection reset") && !text.contains("broken pipe") {
            tracing::debug!(error = %err, "error serving connection");
        }
    }
}
