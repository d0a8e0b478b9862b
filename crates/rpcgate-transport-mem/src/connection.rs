use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rpcgate_transport_traits::{Connection, ReadTimeout, TransportError, TransportResult};
use tokio::sync::mpsc;

/// In-memory connection socket.
///
/// Inbound bytes are pushed by the test through [`MemConnection::push_inbound`];
/// everything flushed by the server is kept for inspection.
#[derive(Debug)]
pub struct MemConnection {
    remote: Option<SocketAddr>,
    read_timeout: Mutex<Option<ReadTimeout>>,
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    pending: Mutex<Vec<Bytes>>,
    flushed: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemConnection {
    /// Create a connection with the given peer address.
    pub fn new(remote: Option<SocketAddr>) -> std::sync::Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        std::sync::Arc::new(Self {
            remote,
            read_timeout: Mutex::new(None),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            pending: Mutex::new(Vec::new()),
            flushed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        })
    }

    /// Make `data` available to the next [`Connection::read`].
    pub fn push_inbound(&self, data: impl Into<Bytes>) {
        let _ = self.inbound_tx.send(data.into());
    }

    /// The read timeout last set on this connection, if any.
    pub fn read_timeout(&self) -> Option<ReadTimeout> {
        *self.read_timeout.lock()
    }

    /// Every chunk flushed to the peer so far, in order.
    pub fn flushed(&self) -> Vec<Bytes> {
        self.flushed.lock().clone()
    }

    /// Bytes written but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().iter().map(Bytes::len).sum()
    }

    /// Returns `true` once the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of times [`Connection::close`] was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connection for MemConnection {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn set_read_timeout(&self, timeout: ReadTimeout) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        *self.read_timeout.lock() = Some(timeout);
        Ok(())
    }

    async fn read(&self) -> TransportResult<Option<Bytes>> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut rx = self.inbound_rx.lock().await;
        match rx.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(_) => Ok(None),
        }
    }

    async fn write(&self, data: Bytes) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        self.pending.lock().push(data);
        Ok(())
    }

    async fn flush(&self) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let drained: Vec<Bytes> = self.pending.lock().drain(..).collect();
        self.flushed.lock().extend(drained);
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_is_invisible_until_flush() {
        let conn = MemConnection::new(None);
        conn.write(Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(conn.pending_len(), 3);
        assert!(conn.flushed().is_empty());

        conn.flush().await.unwrap();
        assert_eq!(conn.pending_len(), 0);
        assert_eq!(conn.flushed(), vec![Bytes::from_static(b"abc")]);
    }

    #[tokio::test]
    async fn test_read_drains_inbound_then_reports_end() {
        let conn = MemConnection::new(None);
        conn.push_inbound(&b"one"[..]);

        assert_eq!(conn.read().await.unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(conn.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_io() {
        let conn = MemConnection::new(None);
        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert!(conn.is_closed());
        assert_eq!(conn.close_calls(), 2);
        assert!(conn.set_read_timeout(ReadTimeout::Infinite).is_err());
        assert!(conn.write(Bytes::new()).await.is_err());
    }
}
