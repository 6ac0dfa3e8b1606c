//! Terminal side of `wirehook connect`.

use wirehook_handler::WriteHandler;
use wirehook_protocol::WireEvent;
use wirehook_transport::{ChannelContext, ChannelHandler};

/// Prints inbound events and exposes a cached write handle for stdin lines.
#[derive(Debug, Default)]
pub struct ConsoleHandler {
    writer: WriteHandler,
}

impl ConsoleHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writer(&self) -> &WriteHandler {
        &self.writer
    }
}

impl ChannelHandler for ConsoleHandler {
    fn handler_added(&self, ctx: &ChannelContext) {
        self.writer.handler_added(ctx);
    }

    async fn channel_read(&self, _ctx: &ChannelContext, message: String) {
        println!("{}", render(&message));
    }

    fn handler_removed(&self, ctx: &ChannelContext) {
        self.writer.handler_removed(ctx);
    }
}

/// Human-readable form of a server line. Unknown lines are shown verbatim.
fn render(line: &str) -> String {
    match WireEvent::from_line(line) {
        Ok(WireEvent::Connected {
            channel_id,
            server_version,
            ..
        }) => format!("* connected as {channel_id} (server {server_version})"),
        Ok(WireEvent::Message { from, text }) => format!("<{from}> {text}"),
        Ok(WireEvent::Goodbye { reason }) => format!("* server closing: {reason}"),
        Err(_) => line.to_string(),
    }
}
