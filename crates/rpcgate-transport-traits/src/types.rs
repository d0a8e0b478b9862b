//! Core transport types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol a call arrived over.
///
/// Recorded on every call's configuration before any metadata handler runs,
/// so handlers can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportProtocol {
    /// Raw payload without any header protocol.
    #[default]
    PurePayload,
    /// Length-framed payload.
    Framed,
    /// Plain HTTP.
    Http,
    /// gRPC over HTTP/2 streams.
    Grpc,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PurePayload => write!(f, "pure_payload"),
            Self::Framed => write!(f, "framed"),
            Self::Http => write!(f, "http"),
            Self::Grpc => write!(f, "grpc"),
        }
    }
}
