//! Codec-level errors for message payloads
//!
//! Raised while decoding bytes coming off a connection or while loading a
//! structured value from text. Each variant carries enough context to tell a
//! short read apart from a malformed payload.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Reader ran out of bytes before the requested block was complete
    #[error("Truncated input: need {need} bytes, {available} available")]
    Truncated { need: usize, available: usize },

    /// Binary payload does not follow the tagged value layout
    #[error("Malformed payload: {message} (offset: {offset})")]
    Malformed { message: String, offset: usize },

    /// Text form could not be parsed into a value list
    #[error("Invalid text at column {column}: {message}")]
    InvalidText { message: String, column: usize },

    /// Payload bytes were expected to be UTF-8
    #[error("Invalid UTF-8 in {context}")]
    Utf8 { context: String },

    /// Underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub fn malformed(message: impl Into<String>, offset: usize) -> Self {
        Self::Malformed {
            message: message.into(),
            offset,
        }
    }

    pub fn invalid_text(message: impl Into<String>, column: usize) -> Self {
        Self::InvalidText {
            message: message.into(),
            column,
        }
    }

    pub fn utf8(context: impl Into<String>) -> Self {
        Self::Utf8 {
            context: context.into(),
        }
    }

    /// True when the error came from the stream rather than the payload
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
