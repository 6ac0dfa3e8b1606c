//! Channel handlers that keep their context around.
//!
//! [`WriteHandler`] stores the [`ChannelContext`](wirehook_transport::ChannelContext)
//! it receives when attached to a connection and lets any task push
//! messages through it later, outside of the transport's callbacks.
//! [`Lobby`] builds on it: every connection gets a `WriteHandler`, and the
//! lobby relays lines between them and broadcasts server-side events.

pub mod error;
pub mod lobby;
pub mod write_handler;

pub use error::HandlerError;
pub use lobby::{Lobby, LobbyHandler};
pub use write_handler::WriteHandler;
