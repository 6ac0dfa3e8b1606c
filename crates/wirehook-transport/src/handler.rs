//! The adapter interface the transport drives for every connection.

use std::future::Future;

use tracing::warn;
use wirehook_protocol::ChannelError;

use crate::context::ChannelContext;

/// Callbacks for a single connection.
///
/// The transport creates (or is given) one handler per connection and calls:
/// 1. `handler_added` once, right after the connection is set up and before
///    any inbound frame is delivered;
/// 2. `channel_read` for each decoded line, in arrival order, awaiting each
///    call before the next;
/// 3. `exception_caught` when the connection fails; the transport closes it
///    afterwards;
/// 4. `handler_removed` once, after the connection has closed and pending
///    writes have been settled.
///
/// The context passed to `handler_added` stays usable after the callback
/// returns, so handlers may keep a clone and write through it later.
pub trait ChannelHandler: Send + Sync + 'static {
    fn handler_added(&self, _ctx: &ChannelContext) {}

    fn channel_read(
        &self,
        _ctx: &ChannelContext,
        _message: String,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn exception_caught(&self, ctx: &ChannelContext, error: &ChannelError) {
        warn!(channel = %ctx.id(), code = error.code(), "Channel error: {error}");
    }

    fn handler_removed(&self, _ctx: &ChannelContext) {}
}
