//! rpcgate-transport-mem: In-process transport for rpcgate.
//!
//! A channel-backed implementation of the `rpcgate-transport-traits`
//! contract. It performs no framing or flow control of its own; it exists so
//! the stream bridge can be driven deterministically and so that everything
//! it does to a connection (read timeouts, writes, statuses, closes) can be
//! observed afterwards.
//!
//! # Usage
//!
//! ```ignore
//! let conn = MemConnection::new(Some("10.0.0.7:4242".parse()?));
//! let (transport, client) = MemServerTransport::pair(conn.remote_addr());
//!
//! let call = client.open_stream("/echo.EchoService/Echo");
//! call.send(payload)?;
//! call.close_send();
//! let status = call.status().await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod connection;
mod transport;

pub use connection::MemConnection;
pub use transport::{MemClient, MemClientStream, MemServerTransport, MemStream, MemTransportFactory};
