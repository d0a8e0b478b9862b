//! # rpcgate Transport Traits
//!
//! The collaborator contract between the rpcgate stream bridge and the
//! frame-level transport underneath it.
//!
//! ## Overview
//!
//! The bridge does not establish streams, run flow control or encode frames.
//! It needs exactly this much from a transport:
//! - **Traits**: [`Connection`], [`ServerTransport`], [`TransportStream`], [`ServerTransportFactory`]
//! - **Status vocabulary**: [`Code`], [`Status`]
//! - **Types**: [`TransportProtocol`], [`ReadTimeout`], [`LimitsConfig`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//!
//! ## Usage
//!
//! Transport implementations depend on this crate and implement the traits:
//!
//! ```rust,ignore
//! use rpcgate_transport_traits::{ServerTransport, StreamHandler, Status, TransportResult};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct MyH2Transport { /* ... */ }
//!
//! #[async_trait]
//! impl ServerTransport for MyH2Transport {
//!     async fn handle_streams(&self, handler: StreamHandler) -> TransportResult<()> { /* ... */ }
//!     // ... other trait methods
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod config;
mod error;
mod status;
mod traits;
mod types;

// Re-export all public items
pub use config::{LimitsConfig, ReadTimeout};
pub use error::{TransportError, TransportResult, validate_message_size};
pub use status::{Code, Status};
pub use traits::{
    Connection, ServerTransport, ServerTransportFactory, StreamHandler, TransportStream,
};
pub use types::TransportProtocol;
