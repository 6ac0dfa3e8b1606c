//! wirehook transport layer
//!
//! A small TCP host for channel handlers. Each connection gets exactly one
//! [`ChannelHandler`]; the transport handles:
//! - Connection lifecycle (attach, read, remove)
//! - Line framing in both directions
//! - A per-connection writer task behind the [`ChannelContext`] write handle
//! - Connection limits, idle timeouts and graceful shutdown

pub mod client;
pub mod context;
pub mod handler;
pub mod server;

mod connection;

pub use client::{ClientConnection, TransportClient};
pub use context::{ChannelContext, ChannelId, EmbeddedOutbound, WriteReceipt};
pub use handler::ChannelHandler;
pub use server::{TransportConfig, TransportServer};
pub use wirehook_protocol::ChannelError;
