//! Outbound connections driven by the same loop as accepted ones.

use std::sync::Arc;

use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use wirehook_protocol::ChannelError;

use crate::connection;
use crate::context::ChannelContext;
use crate::handler::ChannelHandler;
use crate::server::TransportConfig;

/// Dials out and attaches a handler to the new connection.
pub struct TransportClient;

impl TransportClient {
    /// Connect to `addr` and attach `handler`.
    ///
    /// `handler_added` has already run when this returns, so a handler that
    /// caches its context can be written through immediately.
    /// Only the frame and idle settings of `config` apply to clients.
    pub async fn connect<H: ChannelHandler>(
        addr: impl ToSocketAddrs,
        config: &TransportConfig,
        handler: Arc<H>,
    ) -> Result<ClientConnection, ChannelError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("Connected to {:?}", stream.peer_addr().ok());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ctx, driver) = connection::attach(
            stream,
            handler,
            config.connection_settings(),
            shutdown_rx,
        );

        Ok(ClientConnection {
            ctx,
            shutdown_tx,
            handle: tokio::spawn(driver),
        })
    }
}

/// A live outbound connection.
pub struct ClientConnection {
    ctx: ChannelContext,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ClientConnection {
    pub fn context(&self) -> &ChannelContext {
        &self.ctx
    }

    /// Wait until the connection ends on its own.
    pub async fn closed(self) {
        let _ = self.handle.await;
    }

    /// Close the connection and wait until the handler has been removed.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}
