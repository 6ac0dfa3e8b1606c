//! wirehook protocol types.
//!
//! Everything that crosses the socket lives here: the newline-delimited
//! frame codec, the JSON events the demo server speaks, and the error type
//! shared by the codec and the transport.

pub mod error;
pub mod events;
pub mod frame;

pub use error::ChannelError;
pub use events::WireEvent;
pub use frame::{DEFAULT_MAX_FRAME_LEN, LineCodec};

/// Version string announced in `connected` events.
pub const PROTOCOL_VERSION: &str = "0.1.0";
