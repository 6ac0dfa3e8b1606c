//! TCP transport server.
//!
//! Accepts connections, creates one handler per connection through a
//! factory, and drives each connection until it closes or the server stops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use wirehook_protocol::{ChannelError, DEFAULT_MAX_FRAME_LEN};

use crate::connection::{self, ConnectionSettings};
use crate::handler::ChannelHandler;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Longest accepted line, in bytes, excluding the terminator
    pub max_frame_len: usize,
    /// Close connections that send nothing for this long
    pub idle_timeout_ms: Option<u64>,
    /// Log every accepted and rejected connection at info level
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7171,
            hostname: "127.0.0.1".into(),
            max_connections: Some(64),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            idle_timeout_ms: None,
            verbose_logging: false,
        }
    }
}

impl TransportConfig {
    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            max_frame_len: self.max_frame_len,
            idle_timeout: self.idle_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// The transport server. Owns the listener and every live connection.
pub struct TransportServer {
    /// Raised to stop accepting and close all connections
    shutdown_tx: watch::Sender<bool>,
    /// Accept loop task handle
    handle: Option<JoinHandle<()>>,
    /// Actual bound address
    local_addr: SocketAddr,
    /// Live connection count
    client_count: Arc<AtomicUsize>,
}

impl TransportServer {
    /// Bind and start accepting. `factory` is called once per connection.
    pub async fn start<H, F>(config: TransportConfig, factory: F) -> Result<Self, ChannelError>
    where
        H: ChannelHandler,
        F: Fn() -> Arc<H> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind((config.hostname.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!("wirehook transport listening on {local_addr}");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let client_count = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(accept_loop(
            listener,
            config,
            factory,
            client_count.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            shutdown_tx,
            handle: Some(handle),
            local_addr,
            client_count,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being driven.
    pub fn connection_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Stop accepting, close every connection after its queued writes are
    /// flushed, and wait for all of them to finish.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("wirehook transport stopped");
    }
}

async fn accept_loop<H, F>(
    listener: TcpListener,
    config: TransportConfig,
    factory: F,
    client_count: Arc<AtomicUsize>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    H: ChannelHandler,
    F: Fn() -> Arc<H> + Send + Sync + 'static,
{
    let settings = config.connection_settings();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Accept failed: {e}");
                        continue;
                    }
                };

                if let Some(max) = config.max_connections {
                    if client_count.load(Ordering::Relaxed) >= max {
                        warn!("Connection from {peer} rejected: max connections reached ({max})");
                        drop(stream);
                        continue;
                    }
                }

                client_count.fetch_add(1, Ordering::Relaxed);
                if config.verbose_logging {
                    info!("Client connected: {peer}");
                }

                let (ctx, driver) = connection::attach(
                    stream,
                    factory(),
                    settings.clone(),
                    shutdown_rx.clone(),
                );
                let count = client_count.clone();
                let verbose = config.verbose_logging;
                connections.spawn(async move {
                    driver.await;
                    let remaining = count.fetch_sub(1, Ordering::Relaxed) - 1;
                    if verbose {
                        info!("Client disconnected: {} (total: {remaining})", ctx.id());
                    }
                });
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            _ = connection::shutdown_requested(&mut shutdown_rx) => break,
        }
    }

    drop(listener);
    debug!("Waiting for {} connection(s) to close", connections.len());
    while connections.join_next().await.is_some() {}
}
