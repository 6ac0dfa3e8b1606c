//! The per-connection write handle given to handlers.
//!
//! A [`ChannelContext`] is cheap to clone and can be kept past the callback
//! it was delivered in. Writes are queued to the connection's writer task,
//! which encodes, writes and flushes them in call order.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use wirehook_protocol::ChannelError;

/// Unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Commands consumed by a connection's writer task.
pub(crate) enum Outbound {
    Write {
        message: String,
        ack: oneshot::Sender<Result<(), ChannelError>>,
    },
    Close,
}

/// Handle into a single connection.
#[derive(Clone)]
pub struct ChannelContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ChannelId,
    peer_addr: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelContext {
    pub(crate) fn new(
        id: ChannelId,
        peer_addr: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id,
                peer_addr,
                outbound,
            }),
        }
    }

    /// Create a context that is not backed by a socket.
    ///
    /// Everything written through the context shows up on the returned
    /// [`EmbeddedOutbound`], which acknowledges each write as it is taken.
    pub fn embedded(peer_addr: Option<SocketAddr>) -> (Self, EmbeddedOutbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Self::new(ChannelId::new(), peer_addr, tx);
        (ctx, EmbeddedOutbound::new(rx))
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Whether the writer side of the connection still accepts messages.
    pub fn is_active(&self) -> bool {
        !self.inner.outbound.is_closed()
    }

    /// Queue `message` to be written and flushed.
    ///
    /// Returns immediately. Await the receipt to learn whether the message
    /// reached the socket; dropping it does not cancel the write.
    pub fn write_and_flush(&self, message: impl Into<String>) -> WriteReceipt {
        let (ack, rx) = oneshot::channel();
        let command = Outbound::Write {
            message: message.into(),
            ack,
        };
        match self.inner.outbound.send(command) {
            Ok(()) => WriteReceipt::pending(rx),
            Err(_) => WriteReceipt::failed(ChannelError::Closed),
        }
    }

    /// Ask the connection to close once previously queued writes are flushed.
    pub fn close(&self) {
        let _ = self.inner.outbound.send(Outbound::Close);
    }

    /// True when both handles point at the same connection.
    pub fn same_channel(&self, other: &ChannelContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelContext")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("active", &self.is_active())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write receipts
// ─────────────────────────────────────────────────────────────────────────────

/// Completion handle for a single `write_and_flush` call.
///
/// Can be awaited directly: `ctx.write_and_flush("hi").await?`.
#[derive(Debug)]
pub struct WriteReceipt {
    state: ReceiptState,
}

#[derive(Debug)]
enum ReceiptState {
    Pending(oneshot::Receiver<Result<(), ChannelError>>),
    Failed(ChannelError),
}

impl WriteReceipt {
    fn pending(rx: oneshot::Receiver<Result<(), ChannelError>>) -> Self {
        Self {
            state: ReceiptState::Pending(rx),
        }
    }

    fn failed(error: ChannelError) -> Self {
        Self {
            state: ReceiptState::Failed(error),
        }
    }

    /// True if the write was refused before it could be queued.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, ReceiptState::Failed(_))
    }

    /// Wait until the message has been flushed to the socket.
    pub async fn flushed(self) -> Result<(), ChannelError> {
        match self.state {
            // A dropped ack means the writer went away with the message still queued
            ReceiptState::Pending(rx) => rx.await.unwrap_or_else(|_| Err(ChannelError::Closed)),
            ReceiptState::Failed(error) => Err(error),
        }
    }
}

impl IntoFuture for WriteReceipt {
    type Output = Result<(), ChannelError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.flushed())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedded outbound side
// ─────────────────────────────────────────────────────────────────────────────

/// Receiving end of an [`embedded`](ChannelContext::embedded) context.
pub struct EmbeddedOutbound {
    rx: mpsc::UnboundedReceiver<Outbound>,
    close_requested: bool,
}

impl EmbeddedOutbound {
    fn new(rx: mpsc::UnboundedReceiver<Outbound>) -> Self {
        Self {
            rx,
            close_requested: false,
        }
    }

    /// Wait for the next written message. `None` once the context is closed
    /// and every earlier write has been taken.
    pub async fn next_write(&mut self) -> Option<String> {
        while let Some(command) = self.rx.recv().await {
            if let Some(message) = self.accept(command) {
                return Some(message);
            }
        }
        None
    }

    /// Take the next written message if one is already queued.
    pub fn try_next_write(&mut self) -> Option<String> {
        while let Ok(command) = self.rx.try_recv() {
            if let Some(message) = self.accept(command) {
                return Some(message);
            }
        }
        None
    }

    /// Take every message queued so far, in write order.
    pub fn drain_writes(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_next_write()).collect()
    }

    /// Whether a handler called [`ChannelContext::close`].
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Simulate the connection going away: later writes fail with `Closed`.
    pub fn close(&mut self) {
        self.rx.close();
    }

    fn accept(&mut self, command: Outbound) -> Option<String> {
        match command {
            Outbound::Write { message, ack } if !self.close_requested => {
                let _ = ack.send(Ok(()));
                Some(message)
            }
            Outbound::Write { ack, .. } => {
                let _ = ack.send(Err(ChannelError::Closed));
                None
            }
            Outbound::Close => {
                self.close_requested = true;
                self.rx.close();
                None
            }
        }
    }
}
