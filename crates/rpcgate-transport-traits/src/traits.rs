//! Core transport traits.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;

use crate::config::ReadTimeout;
use crate::error::TransportResult;
use crate::status::Status;

/// Per-stream delivery callback handed to [`ServerTransport::handle_streams`].
///
/// The transport calls it once for every accepted stream, from its own
/// delivery loop. Implementations must return promptly and do the real work
/// elsewhere, or stream acceptance for the whole connection stalls.
pub type StreamHandler = Arc<dyn Fn(Arc<dyn TransportStream>) + Send + Sync>;

/// One logical RPC call multiplexed over a connection.
#[async_trait]
pub trait TransportStream: Send + Sync + fmt::Debug {
    /// Transport-assigned stream identifier, unique per connection.
    fn id(&self) -> u32;

    /// Full method string as received, e.g. `/pkg.Service/Method`.
    fn method(&self) -> &str;

    /// Request headers received with the stream.
    fn headers(&self) -> &HeaderMap;

    /// Receives the next chunk of request data, or `None` once the peer half-closed.
    async fn recv_data(&self) -> TransportResult<Option<Bytes>>;

    /// Sends a chunk of response data.
    async fn send_data(&self, data: Bytes) -> TransportResult<()>;
}

/// Server side of a multiplexed connection.
///
/// The write path is shared by every stream on the connection; implementations
/// serialise concurrent writes themselves. Callers never lock around them.
#[async_trait]
pub trait ServerTransport: Send + Sync + fmt::Debug {
    /// Accepts streams until the connection ends, invoking `handler` once per stream.
    async fn handle_streams(&self, handler: StreamHandler) -> TransportResult<()>;

    /// Writes the terminal status of `stream` and closes it.
    async fn write_status(&self, stream: &dyn TransportStream, status: &Status)
    -> TransportResult<()>;

    /// Address of the remote peer, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Closes the transport and every stream still open on it.
    async fn close(&self) -> TransportResult<()>;
}

/// The underlying transport socket.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Address of the remote peer, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Sets the connection-level read timeout.
    fn set_read_timeout(&self, timeout: ReadTimeout) -> TransportResult<()>;

    /// Reads the next chunk of bytes, or `None` at end of input.
    async fn read(&self) -> TransportResult<Option<Bytes>>;

    /// Queues bytes for writing.
    async fn write(&self, data: Bytes) -> TransportResult<()>;

    /// Flushes queued writes to the peer.
    async fn flush(&self) -> TransportResult<()> {
        Ok(())
    }

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&self) -> TransportResult<()>;
}

/// Builds the multiplexed server transport for an accepted connection.
pub trait ServerTransportFactory: Send + Sync + fmt::Debug {
    /// Wraps `conn` in a server transport ready to deliver streams.
    fn new_server_transport(
        &self,
        conn: Arc<dyn Connection>,
    ) -> TransportResult<Arc<dyn ServerTransport>>;
}
