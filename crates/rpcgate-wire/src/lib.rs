//! # rpcgate Wire Format
//!
//! Payload codecs and gRPC message framing for rpcgate streams.
//!
//! The server core never serialises request or response bodies itself. It is
//! handed a codec and uses it to turn typed messages into frame payloads and
//! back again. Frames follow the gRPC length-prefixed layout:
//!
//! ```text
//! +------------+---------------------------+-----------------+
//! | compressed | message length (u32, BE)  | message bytes   |
//! |   1 byte   |          4 bytes          |  length bytes   |
//! +------------+---------------------------+-----------------+
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use rpcgate_wire::{AnyCodec, Codec, JsonCodec, FrameDecoder, encode_frame};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct EchoRequest {
//!     message: String,
//! }
//!
//! let codec = JsonCodec::new();
//! let payload = codec.encode(&EchoRequest { message: "hi".into() }).unwrap();
//! let frame = encode_frame(&payload, false).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.feed(&frame);
//! let decoded = decoder.try_decode().unwrap().unwrap();
//! let req: EchoRequest = codec.decode(&decoded.payload).unwrap();
//! assert_eq!(req.message, "hi");
//! ```
//!
//! ## Features
//!
//! - `json` - JSON codec (default)
//! - `msgpack` - MessagePack binary format

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod frame;

pub use frame::{FRAME_HEADER_LEN, Frame, FrameDecoder, MAX_FRAME_SIZE, encode_frame};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Wire format codec error
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Serialising a message failed
    #[error("encode: {0}")]
    Encode(String),

    /// Deserialising a message failed
    #[error("decode: {0}")]
    Decode(String),

    /// A frame payload is larger than the decoder accepts or the length field holds
    #[error("frame of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Announced payload length
        size: usize,
        /// Configured limit
        max: usize,
    },
}

impl CodecError {
    /// Create an encoding error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create a decoding error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Payload codec trait
///
/// Codecs are shared by every stream on a server, so implementations must be
/// `Send + Sync` and keep no per-message state.
///
/// # Implementors
///
/// - [`JsonCodec`] - Standard JSON encoding (default)
/// - `MsgPackCodec` - MessagePack binary format (requires `msgpack` feature)
pub trait Codec: Send + Sync {
    /// Encode a value to bytes
    fn encode<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decode bytes to a value
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T>;

    /// Content subtype advertised on the wire (e.g. `application/grpc+json`)
    fn content_type(&self) -> &'static str;

    /// Get codec name for debugging
    fn name(&self) -> &'static str;
}

/// JSON codec using serde_json
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    /// Pretty print output (default: false)
    pub pretty: bool,
}

impl JsonCodec {
    /// Create a new JSON codec
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON codec with pretty printing enabled
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|e| CodecError::encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decode(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/grpc+json"
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// MessagePack binary codec
///
/// Produces compact binary payloads. Only use it between peers that agree on
/// the schema; MessagePack's dynamic typing gives no protection against a
/// peer sending a differently shaped value.
#[cfg(feature = "msgpack")]
#[cfg_attr(docsrs, doc(cfg(feature = "msgpack")))]
#[derive(Debug, Clone, Default)]
pub struct MsgPackCodec;

#[cfg(feature = "msgpack")]
impl MsgPackCodec {
    /// Create a new MessagePack codec
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "msgpack")]
impl Codec for MsgPackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::decode(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/grpc+msgpack"
    }

    fn name(&self) -> &'static str {
        "msgpack"
    }
}

/// Enum wrapper for all codec types
///
/// [`Codec`] has generic methods and cannot be used as a trait object, so the
/// server stores an `AnyCodec` wherever a codec is injected.
#[derive(Debug, Clone)]
pub enum AnyCodec {
    /// Standard JSON codec
    Json(JsonCodec),
    /// MessagePack binary codec
    #[cfg(feature = "msgpack")]
    #[cfg_attr(docsrs, doc(cfg(feature = "msgpack")))]
    MsgPack(MsgPackCodec),
}

impl Default for AnyCodec {
    fn default() -> Self {
        Self::Json(JsonCodec::new())
    }
}

impl AnyCodec {
    /// Create a codec by name
    ///
    /// Supported names:
    /// - `"json"` - Standard JSON codec
    /// - `"msgpack"` - MessagePack binary (requires `msgpack` feature)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json(JsonCodec::new())),
            #[cfg(feature = "msgpack")]
            "msgpack" => Some(Self::MsgPack(MsgPackCodec::new())),
            _ => None,
        }
    }

    /// List available codec names
    pub fn available_names() -> &'static [&'static str] {
        &[
            "json",
            #[cfg(feature = "msgpack")]
            "msgpack",
        ]
    }
}

impl Codec for AnyCodec {
    fn encode<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            Self::Json(c) => c.encode(value),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(c) => c.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        match self {
            Self::Json(c) => c.decode(bytes),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(c) => c.decode(bytes),
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            Self::Json(c) => c.content_type(),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(c) => c.content_type(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Json(c) => c.name(),
            #[cfg(feature = "msgpack")]
            Self::MsgPack(c) => c.name(),
        }
    }
}
