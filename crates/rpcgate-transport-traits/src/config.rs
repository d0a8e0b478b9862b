//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Read timeout applied to a whole connection.
///
/// Multiplexed connections are long-lived; a server sets
/// [`ReadTimeout::Infinite`] when a connection becomes active and leaves
/// liveness to transport keepalives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadTimeout {
    /// Never time out a read.
    #[default]
    Infinite,
    /// Fail a read that makes no progress for this long.
    After(Duration),
}

impl ReadTimeout {
    /// Returns the bounded duration, or `None` for an unbounded timeout.
    #[must_use]
    pub const fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::After(d) => Some(*d),
        }
    }

    /// Returns `true` for [`ReadTimeout::Infinite`].
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl fmt::Display for ReadTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => write!(f, "infinite"),
            Self::After(d) => write!(f, "{d:?}"),
        }
    }
}

/// Configuration for message size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of a single received message in bytes.
    /// `None` = unlimited
    pub max_recv_message_size: Option<usize>,

    /// Maximum size of a single sent message in bytes.
    /// `None` = unlimited
    pub max_send_message_size: Option<usize>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_recv_message_size: Some(4 * 1024 * 1024), // 4MB, the gRPC default
            max_send_message_size: None,
        }
    }
}

impl LimitsConfig {
    /// Create a configuration with no limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_recv_message_size: None,
            max_send_message_size: None,
        }
    }
}
