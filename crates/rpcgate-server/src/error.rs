//! Error types for the stream bridge
//!
//! [`RpcError`] covers every way a call can end other than success. The
//! mapping from these errors to wire statuses lives in [`crate::status`].

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use rpcgate_transport_traits::{Status, TransportError};
use rpcgate_wire::CodecError;
use thiserror::Error;

/// Result type for bridge operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Error type for the stream bridge
#[derive(Debug, Error)]
pub enum RpcError {
    /// The method string has no path separator
    #[error("malformed method name: {0:?}")]
    MalformedMethodName(String),

    /// The qualified service name has no package separator
    #[error("malformed package and service name: {0:?}")]
    MalformedServiceName(String),

    /// A metadata handler rejected the call without choosing a status
    #[error("meta handler {handler} failed: {message}")]
    MetaHandler {
        /// Name of the failing handler
        handler: String,
        /// Failure description
        message: String,
    },

    /// Error returned by business logic
    #[error(transparent)]
    Business(#[from] BizError),

    /// An explicit status chosen by a handler or endpoint
    #[error("{0}")]
    Status(#[from] Status),

    /// Payload encoding or framing error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// An error carrying the backtrace of the point where it was raised
    #[error("{0}")]
    Detailed(Box<DetailedError>),
}

impl RpcError {
    /// Create a metadata handler failure
    #[must_use]
    pub fn meta_handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetaHandler {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Create a business error
    #[must_use]
    pub fn business(code: i32, message: impl Into<String>) -> Self {
        Self::Business(BizError::new(code, message))
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wrap `err` together with a backtrace captured here.
    #[must_use]
    pub fn detailed(err: impl Into<RpcError>) -> Self {
        match err.into() {
            already @ Self::Detailed(_) => already,
            inner => Self::Detailed(Box::new(DetailedError {
                inner,
                backtrace: Arc::new(Backtrace::force_capture()),
            })),
        }
    }

    /// The captured backtrace, for errors created with [`RpcError::detailed`].
    #[must_use]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Self::Detailed(d) => Some(&d.backtrace),
            _ => None,
        }
    }

    /// The error underneath any [`RpcError::Detailed`] wrapper.
    #[must_use]
    pub fn root(&self) -> &RpcError {
        match self {
            Self::Detailed(d) => d.inner.root(),
            other => other,
        }
    }

    /// Whether the error rejected the method name before any invocation
    #[must_use]
    pub fn is_malformed_name(&self) -> bool {
        matches!(
            self.root(),
            Self::MalformedMethodName(_) | Self::MalformedServiceName(_)
        )
    }
}

/// An [`RpcError`] with the backtrace of the point where it was raised.
#[derive(Debug)]
pub struct DetailedError {
    inner: RpcError,
    backtrace: Arc<Backtrace>,
}

impl DetailedError {
    /// The wrapped error
    #[must_use]
    pub fn inner(&self) -> &RpcError {
        &self.inner
    }

    /// The captured backtrace
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for DetailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

/// Application-level error returned by a business endpoint.
///
/// `code` is application defined; the configured
/// [`ErrorMapper`](crate::status::ErrorMapper) decides which wire status it
/// becomes. The message always reaches the peer unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("biz error {code}: {message}")]
pub struct BizError {
    code: i32,
    message: String,
}

impl BizError {
    /// Create a business error
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Application error code
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A value parsed but is not usable
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
