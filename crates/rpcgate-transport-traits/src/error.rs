//! Transport error types.

use thiserror::Error;

use crate::config::LimitsConfig;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// The connection was closed, by either side.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The stream was reset or already finished.
    #[error("Stream {stream_id} closed")]
    StreamClosed {
        /// Transport-assigned stream identifier
        stream_id: u32,
    },

    /// Failed to send a frame.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a frame.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A protocol-level error occurred.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The operation did not complete within the configured read timeout.
    #[error("Operation timed out")]
    Timeout,

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// Message size exceeds the configured maximum limit.
    #[error(
        "Message size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, raise `LimitsConfig::max_recv_message_size` \
         or use `LimitsConfig::unlimited()`"
    )]
    MessageTooLarge {
        /// The actual size of the message in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Validates that a received message does not exceed the configured limit.
///
/// # Returns
///
/// `Ok(())` if the size is within limits or no limit is set, otherwise
/// `Err(TransportError::MessageTooLarge)`
pub fn validate_message_size(size: usize, limits: &LimitsConfig) -> TransportResult<()> {
    if let Some(max_size) = limits.max_recv_message_size
        && size > max_size
    {
        return Err(TransportError::MessageTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}
