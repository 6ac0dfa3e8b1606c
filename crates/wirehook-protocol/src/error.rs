//! Channel errors and their stable log codes.

use thiserror::Error;

/// Failure of a channel operation: a write, a flush, or a decode.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection is gone; nothing more can be written.
    #[error("channel is closed")]
    Closed,

    /// An inbound or outbound line is longer than the configured limit.
    #[error("frame exceeds the {max} byte limit")]
    FrameTooLarge { max: usize },

    /// A frame that cannot be represented on the wire.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Closed => "channel.closed",
            Self::FrameTooLarge { .. } => "channel.frame_too_large",
            Self::InvalidFrame(_) => "channel.invalid_frame",
            Self::Io(_) => "channel.io",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }
}
