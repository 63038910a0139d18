//! TCP bridge server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::auth::AuthenticationManager;
use crate::config::Settings;
use crate::dispatch::DispatchRegistry;
use crate::error::BridgeError;

use super::handle_connection;

/// Connection metrics for monitoring.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,
    /// Connections that ended with a handler error.
    pub connections_failed: AtomicU64,
    /// Currently active connections.
    pub active_connections: AtomicUsize,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed connection.
    pub fn record_connection(&self, success: bool) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.connections_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.connections_failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// TCP server bridging external clients to the command dispatcher, one
/// gated connection task per client.
pub struct BridgeServer {
    listener: TcpListener,
    settings: Arc<Settings>,
    auth: Arc<AuthenticationManager>,
    dispatch: Arc<DispatchRegistry>,
    metrics: Arc<ConnectionMetrics>,
    connection_semaphore: Arc<Semaphore>,
}

impl BridgeServer {
    /// Bind the server to the configured address.
    pub async fn bind(
        settings: Arc<Settings>,
        auth: Arc<AuthenticationManager>,
        dispatch: Arc<DispatchRegistry>,
    ) -> Result<Self, BridgeError> {
        let addr: SocketAddr = settings
            .listen
            .addr
            .parse()
            .map_err(|e| BridgeError::Config {
                message: format!("Invalid listen address '{}': {}", settings.listen.addr, e),
            })?;

        let listener = TcpListener::bind(addr).await.map_err(|e| BridgeError::Socket {
            message: format!("Failed to bind to {}: {}", addr, e),
        })?;

        let connection_semaphore =
            Arc::new(Semaphore::new(settings.limits.max_concurrent_connections));

        let bound_addr = listener.local_addr().map_err(BridgeError::Io)?;
        info!(
            addr = %bound_addr,
            max_connections = settings.limits.max_concurrent_connections,
            "Bridge listener bound"
        );

        Ok(Self {
            listener,
            settings,
            auth,
            dispatch,
            metrics: Arc::new(ConnectionMetrics::new()),
            connection_semaphore,
        })
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.listener.local_addr().map_err(BridgeError::Io)
    }

    /// Get connection metrics.
    pub fn metrics(&self) -> Arc<ConnectionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the accept loop until `shutdown` is notified.
    ///
    /// Active connections continue until they complete; `wait_for_drain`
    /// waits them out.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), BridgeError> {
        info!("Bridge listener running, waiting for connections...");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        source = %peer_addr,
                                        max = self.settings.limits.max_concurrent_connections,
                                        "Connection limit reached, rejecting connection"
                                    );
                                    // Dropping the stream rejects the client.
                                    continue;
                                }
                            };

                            let settings = Arc::clone(&self.settings);
                            let auth = Arc::clone(&self.auth);
                            let dispatch = Arc::clone(&self.dispatch);
                            let metrics = Arc::clone(&self.metrics);

                            metrics.active_connections.fetch_add(1, Ordering::Relaxed);
                            debug!(source = %peer_addr, active = metrics.active(), "New connection accepted");

                            tokio::spawn(async move {
                                let _permit = permit; // Released when the task completes.
                                let success = match handle_connection(
                                    stream,
                                    peer_addr,
                                    settings,
                                    auth,
                                    dispatch,
                                ).await {
                                    Ok(()) => true,
                                    Err(e) => {
                                        error!(source = %peer_addr, error = %e, "Connection handler error");
                                        false
                                    }
                                };

                                metrics.record_connection(success);
                                metrics.active_connections.fetch_sub(1, Ordering::Relaxed);
                                debug!(
                                    source = %peer_addr,
                                    active = metrics.active(),
                                    success = success,
                                    "Connection closed"
                                );
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Wait for all active connections to drain.
    pub async fn wait_for_drain(&self) {
        let poll_interval = std::time::Duration::from_millis(100);

        while self.metrics.active() > 0 {
            debug!(active = self.metrics.active(), "Waiting for connections to drain");
            tokio::time::sleep(poll_interval).await;
        }

        info!("All connections drained");
    }
}
