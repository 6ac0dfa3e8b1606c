use thiserror::Error;
use wirehook_protocol::ChannelError;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// `send` was called before the handler was attached to a connection.
    #[error("handler is not attached to a channel")]
    NotAttached,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl HandlerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAttached => "handler.not_attached",
            Self::Channel(e) => e.code(),
        }
    }
}
