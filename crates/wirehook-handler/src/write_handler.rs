//! Context-caching write helper.

use parking_lot::RwLock;
use tracing::debug;
use wirehook_transport::{ChannelContext, ChannelHandler, WriteReceipt};

use crate::error::HandlerError;

/// Remembers the context it was attached with and writes through it on
/// demand.
///
/// The cached context starts out empty. Each `handler_added` call replaces
/// it, so the last attachment wins. [`send`](Self::send) refuses to run
/// before the first attachment instead of touching an unset handle.
///
/// ```ignore
/// let handler = Arc::new(WriteHandler::new());
/// let client = TransportClient::connect(addr, &config, handler.clone()).await?;
/// handler.send("hello")?.await?;
/// ```
#[derive(Debug, Default)]
pub struct WriteHandler {
    ctx: RwLock<Option<ChannelContext>>,
}

impl WriteHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `message` to the cached context's `write_and_flush`.
    ///
    /// The message is passed through unchanged and written exactly once.
    /// The returned receipt resolves when it has been flushed, or to
    /// `ChannelError::Closed` if the connection is already gone.
    pub fn send(&self, message: impl Into<String>) -> Result<WriteReceipt, HandlerError> {
        // Clone out of the lock; nothing is held while writing
        let ctx = self.ctx.read().clone().ok_or(HandlerError::NotAttached)?;
        Ok(ctx.write_and_flush(message))
    }

    /// Send and wait for the flush.
    pub async fn send_and_flush(&self, message: impl Into<String>) -> Result<(), HandlerError> {
        self.send(message)?.await?;
        Ok(())
    }

    /// The cached context, if attached.
    pub fn context(&self) -> Option<ChannelContext> {
        self.ctx.read().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.ctx.read().is_some()
    }
}

impl ChannelHandler for WriteHandler {
    fn handler_added(&self, ctx: &ChannelContext) {
        let previous = self.ctx.write().replace(ctx.clone());
        match previous {
            Some(old) if !old.same_channel(ctx) => {
                debug!(channel = %ctx.id(), replaced = %old.id(), "Replaced cached channel context");
            }
            _ => debug!(channel = %ctx.id(), "Cached channel context"),
        }
    }

    fn handler_removed(&self, ctx: &ChannelContext) {
        // The handle stays cached; writes through it now fail with Closed
        debug!(channel = %ctx.id(), "Handler removed");
    }
}
