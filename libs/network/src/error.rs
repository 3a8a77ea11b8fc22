//! Transport Error Types
//!
//! Error handling for stream failures, carrier negotiation mismatches and
//! name resolution misses. None of these are retried inside the crate;
//! [`TransportError::is_retryable`] only tells a hosting layer whether
//! trying again could plausibly help.

use codec::CodecError;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Stream died, was never connected, or refused the connection
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Peer spoke something we do not understand
    #[error("Protocol mismatch: {message}")]
    ProtocolMismatch { message: String },

    /// Name could not be resolved or registered
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// Bad local setup (unknown carrier name, wrong modifier kind)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Payload failed to decode
    #[error("Payload error: {0}")]
    Payload(CodecError),

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a transport failure
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport failure with source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The stream went away mid-operation
    pub fn stream_died() -> Self {
        Self::transport("stream died")
    }

    /// An operation needed a stream that is not there
    pub fn no_connection() -> Self {
        Self::transport("no connection")
    }

    /// Create a protocol mismatch
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolMismatch {
            message: message.into(),
        }
    }

    /// No registered carrier claims these header bytes
    pub fn unrecognized_protocol(header: &[u8]) -> Self {
        Self::protocol(format!(
            "unrecognized protocol (header {})",
            String::from_utf8_lossy(header).escape_debug()
        ))
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Transport { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Registry { .. } => true,
            TransportError::ProtocolMismatch { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Payload(_) => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Transport { .. } => "transport",
            TransportError::ProtocolMismatch { .. } => "protocol",
            TransportError::Registry { .. } => "registry",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Payload(_) => "payload",
            TransportError::Io { .. } => "io",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Stream failures surfacing through a reader stay transport failures
impl From<CodecError> for TransportError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Io(source) => TransportError::transport_with_source("stream died", source),
            other => TransportError::Payload(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert_eq!(TransportError::stream_died().category(), "transport");
        assert_eq!(TransportError::protocol("x").category(), "protocol");
        assert_eq!(TransportError::registry("x").category(), "registry");
        assert_eq!(
            TransportError::configuration("x", Some("carrier")).category(),
            "configuration"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransportError::no_connection().is_retryable());
        assert!(!TransportError::unrecognized_protocol(b"GARBAGE!").is_retryable());
        assert!(!TransportError::configuration("test", None).is_retryable());
    }

    #[test]
    fn test_unrecognized_protocol_names_header() {
        let err = TransportError::unrecognized_protocol(b"GET / HT");
        assert!(err.to_string().contains("unrecognized protocol"));
        assert!(err.to_string().contains("GET / HT"));
    }

    #[test]
    fn test_codec_io_becomes_transport_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        match TransportError::from(CodecError::Io(io)) {
            TransportError::Transport { message, source } => {
                assert_eq!(message, "stream died");
                assert!(source.is_some());
            }
            other => panic!("Expected Transport error, got {:?}", other),
        }
        let malformed = CodecError::malformed("bad tag", 4);
        assert_eq!(TransportError::from(malformed).category(), "payload");
    }
}
