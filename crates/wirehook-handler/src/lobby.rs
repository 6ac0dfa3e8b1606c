//! Lobby: relays lines between connected peers.
//!
//! Each connection's [`LobbyHandler`] owns a [`WriteHandler`] and registers
//! it with the shared [`Lobby`] on attach. Everything the lobby sends goes
//! through those cached handles, never through a callback's context.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use wirehook_protocol::WireEvent;
use wirehook_transport::{ChannelContext, ChannelHandler, ChannelId};

use crate::write_handler::WriteHandler;

/// Registry of attached peers, keyed by channel.
#[derive(Debug, Default)]
pub struct Lobby {
    peers: DashMap<ChannelId, Arc<WriteHandler>>,
}

impl Lobby {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the handler for one new connection.
    pub fn handler(self: &Arc<Self>) -> Arc<LobbyHandler> {
        Arc::new(LobbyHandler {
            lobby: self.clone(),
            writer: Arc::new(WriteHandler::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Send `event` to every peer. Returns how many writes were queued.
    pub fn broadcast(&self, event: &WireEvent) -> usize {
        self.send_to_all(event, None)
    }

    /// Send `event` to every peer except `from`.
    pub fn relay(&self, from: ChannelId, event: &WireEvent) -> usize {
        self.send_to_all(event, Some(from))
    }

    fn send_to_all(&self, event: &WireEvent, skip: Option<ChannelId>) -> usize {
        let line = match event.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode {} event: {e}", event.name());
                return 0;
            }
        };

        // Snapshot the peers so no shard lock is held while writing
        let targets: Vec<(ChannelId, Arc<WriteHandler>)> = self
            .peers
            .iter()
            .filter(|entry| Some(*entry.key()) != skip)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut queued = 0;
        for (id, writer) in targets {
            match writer.send(line.clone()) {
                Ok(receipt) if !receipt.is_failed() => queued += 1,
                Ok(_) => debug!(channel = %id, "Skipped closed peer"),
                Err(e) => debug!(channel = %id, code = e.code(), "Skipped peer: {e}"),
            }
        }
        queued
    }
}

/// Per-connection lobby member.
#[derive(Debug)]
pub struct LobbyHandler {
    lobby: Arc<Lobby>,
    writer: Arc<WriteHandler>,
}

impl LobbyHandler {
    /// The cached write handle for this connection.
    pub fn writer(&self) -> &Arc<WriteHandler> {
        &self.writer
    }
}

impl ChannelHandler for LobbyHandler {
    fn handler_added(&self, ctx: &ChannelContext) {
        self.writer.handler_added(ctx);

        // Greeting must be queued before the peer becomes visible to relays
        let greeting = WireEvent::connected(ctx.id().to_string());
        match greeting.to_line() {
            Ok(line) => {
                if let Err(e) = self.writer.send(line) {
                    warn!(channel = %ctx.id(), "Failed to greet peer: {e}");
                }
            }
            Err(e) => warn!("Failed to encode greeting: {e}"),
        }
        self.lobby.peers.insert(ctx.id(), self.writer.clone());
    }

    async fn channel_read(&self, ctx: &ChannelContext, message: String) {
        let text = message.trim();
        if text.is_empty() {
            return;
        }
        let event = WireEvent::message(ctx.id().to_string(), text);
        let delivered = self.lobby.relay(ctx.id(), &event);
        debug!(channel = %ctx.id(), delivered, "Relayed message");
    }

    fn handler_removed(&self, ctx: &ChannelContext) {
        self.lobby.peers.remove(&ctx.id());
        self.writer.handler_removed(ctx);
    }
}
