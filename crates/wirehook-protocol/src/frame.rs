//! Newline-delimited UTF-8 framing.
//!
//! Every frame is one line of text terminated by `\n`. A `\r` directly
//! before the terminator is dropped on decode so that telnet-style clients
//! work unchanged. The line splitting itself is `tokio_util`'s
//! [`LinesCodec`]; this wrapper adds the outbound checks and maps errors onto
//! [`ChannelError`].

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::ChannelError;

/// Default upper bound for a single line, excluding the terminator.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Line encoder/decoder with a length limit.
///
/// The limit counts every byte before the `\n`, including a trailing `\r`
/// sent by the peer. An oversized inbound line is reported once and then
/// skipped up to its terminator.
#[derive(Debug, Clone)]
pub struct LineCodec {
    inner: LinesCodec,
    max_frame_len: usize,
}

impl LineCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_frame_len),
            max_frame_len,
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn map_error(&self, error: LinesCodecError) -> ChannelError {
        match error {
            LinesCodecError::MaxLineLengthExceeded => ChannelError::FrameTooLarge {
                max: self.max_frame_len,
            },
            // LinesCodec reports bad UTF-8 as InvalidData
            LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                ChannelError::invalid_frame("line is not valid UTF-8")
            }
            LinesCodecError::Io(e) => ChannelError::Io(e),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ChannelError> {
        self.inner.decode(src).map_err(|e| self.map_error(e))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ChannelError> {
        self.inner.decode_eof(src).map_err(|e| self.map_error(e))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = ChannelError;

    /// Appends the message plus the terminator. Messages that the peer could
    /// not decode back unchanged are refused and leave `dst` untouched.
    fn encode(&mut self, message: T, dst: &mut BytesMut) -> Result<(), ChannelError> {
        let message = message.as_ref();
        if message.contains('\n') {
            return Err(ChannelError::invalid_frame("outbound message contains a line break"));
        }
        // The decoder would strip it
        if message.ends_with('\r') {
            return Err(ChannelError::invalid_frame(
                "outbound message ends with a carriage return",
            ));
        }
        if message.len() > self.max_frame_len {
            return Err(ChannelError::FrameTooLarge {
                max: self.max_frame_len,
            });
        }
        self.inner.encode(message, dst).map_err(|e| self.map_error(e))
    }
}
