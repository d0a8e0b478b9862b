use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::HeaderMap;
use parking_lot::Mutex;
use rpcgate_transport_traits::{
    Connection, ServerTransport, ServerTransportFactory, Status, StreamHandler, TransportError,
    TransportResult, TransportStream,
};
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::debug;

/// Server-side half of an in-memory stream.
#[derive(Debug)]
pub struct MemStream {
    id: u32,
    method: String,
    headers: HeaderMap,
    data_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    data_tx: mpsc::UnboundedSender<Bytes>,
    status_tx: Mutex<Option<oneshot::Sender<Status>>>,
}

#[async_trait]
impl TransportStream for MemStream {
    fn id(&self) -> u32 {
        self.id
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn recv_data(&self) -> TransportResult<Option<Bytes>> {
        Ok(self.data_rx.lock().await.recv().await)
    }

    async fn send_data(&self, data: Bytes) -> TransportResult<()> {
        if self.status_tx.lock().is_none() {
            return Err(TransportError::StreamClosed { stream_id: self.id });
        }
        self.data_tx
            .send(data)
            .map_err(|_| TransportError::StreamClosed { stream_id: self.id })
    }
}

#[derive(Debug)]
struct Shared {
    streams: DashMap<u32, Arc<MemStream>>,
    statuses: Mutex<Vec<(u32, Status)>>,
    closed: AtomicBool,
    close_notify: Notify,
}

/// In-memory multiplexed server transport.
///
/// Every call to [`ServerTransport::write_status`] is logged, including
/// duplicate writes to an already finished stream, so tests can assert that
/// exactly one terminal status was produced per stream.
#[derive(Debug)]
pub struct MemServerTransport {
    remote: Option<SocketAddr>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<MemStream>>>,
    shared: Arc<Shared>,
}

impl MemServerTransport {
    /// Create a server transport and the client handle that opens streams on it.
    pub fn pair(remote: Option<SocketAddr>) -> (Arc<Self>, MemClient) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            streams: DashMap::new(),
            statuses: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        });
        let transport = Arc::new(Self {
            remote,
            incoming: tokio::sync::Mutex::new(rx),
            shared: Arc::clone(&shared),
        });
        let client = MemClient {
            next_id: AtomicU32::new(1),
            tx,
            shared,
        };
        (transport, client)
    }

    /// Every status written so far as `(stream id, status)`, in write order.
    pub fn written_statuses(&self) -> Vec<(u32, Status)> {
        self.shared.statuses.lock().clone()
    }

    /// Statuses written for one stream.
    pub fn statuses_for(&self, stream_id: u32) -> Vec<Status> {
        self.shared
            .statuses
            .lock()
            .iter()
            .filter(|(id, _)| *id == stream_id)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Returns `true` once the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ServerTransport for MemServerTransport {
    async fn handle_streams(&self, handler: StreamHandler) -> TransportResult<()> {
        let mut incoming = self.incoming.lock().await;
        loop {
            if self.is_closed() {
                return Ok(());
            }
            tokio::select! {
                next = incoming.recv() => match next {
                    Some(stream) => {
                        debug!(stream_id = stream.id, method = %stream.method, "stream accepted");
                        handler(stream as Arc<dyn TransportStream>);
                    }
                    None => return Ok(()),
                },
                () = self.shared.close_notify.notified() => return Ok(()),
            }
        }
    }

    async fn write_status(
        &self,
        stream: &dyn TransportStream,
        status: &Status,
    ) -> TransportResult<()> {
        let stream_id = stream.id();
        self.shared
            .statuses
            .lock()
            .push((stream_id, status.clone()));

        let (_, mem_stream) = self
            .shared
            .streams
            .remove(&stream_id)
            .ok_or(TransportError::StreamClosed { stream_id })?;
        let sender = mem_stream
            .status_tx
            .lock()
            .take()
            .ok_or(TransportError::StreamClosed { stream_id })?;
        // The client may have gone away; the status is still logged above.
        let _ = sender.send(status.clone());
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    async fn close(&self) -> TransportResult<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.close_notify.notify_waiters();
        self.shared.streams.clear();
        Ok(())
    }
}

/// Client handle that opens streams on a [`MemServerTransport`].
///
/// Dropping the client ends the transport's accept loop.
#[derive(Debug)]
pub struct MemClient {
    next_id: AtomicU32,
    tx: mpsc::UnboundedSender<Arc<MemStream>>,
    shared: Arc<Shared>,
}

impl MemClient {
    /// Open a stream for `method` with no request headers.
    pub fn open_stream(&self, method: impl Into<String>) -> MemClientStream {
        self.open_stream_with_headers(method, HeaderMap::new())
    }

    /// Open a stream for `method` carrying `headers`.
    pub fn open_stream_with_headers(
        &self,
        method: impl Into<String>,
        headers: HeaderMap,
    ) -> MemClientStream {
        // Client-initiated HTTP/2 streams use odd identifiers.
        let id = self.next_id.fetch_add(2, Ordering::AcqRel);
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = oneshot::channel();

        let stream = Arc::new(MemStream {
            id,
            method: method.into(),
            headers,
            data_rx: tokio::sync::Mutex::new(req_rx),
            data_tx: resp_tx,
            status_tx: Mutex::new(Some(status_tx)),
        });
        self.shared.streams.insert(id, Arc::clone(&stream));
        let _ = self.tx.send(stream);

        MemClientStream {
            id,
            req_tx: Mutex::new(Some(req_tx)),
            resp_rx,
            status_rx: Some(status_rx),
        }
    }
}

/// Client-side half of an in-memory stream.
#[derive(Debug)]
pub struct MemClientStream {
    id: u32,
    req_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    resp_rx: mpsc::UnboundedReceiver<Bytes>,
    status_rx: Option<oneshot::Receiver<Status>>,
}

impl MemClientStream {
    /// Stream identifier shared with the server side.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Send request data to the server.
    pub fn send(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        let guard = self.req_tx.lock();
        let tx = guard
            .as_ref()
            .ok_or(TransportError::StreamClosed { stream_id: self.id })?;
        tx.send(data.into())
            .map_err(|_| TransportError::StreamClosed { stream_id: self.id })
    }

    /// Half-close the request side.
    pub fn close_send(&self) {
        self.req_tx.lock().take();
    }

    /// Receive the next chunk of response data.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.resp_rx.recv().await
    }

    /// Wait for the terminal status.
    ///
    /// Returns `None` if the server side went away without writing one.
    pub async fn status(&mut self) -> Option<Status> {
        match self.status_rx.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }
}

/// Factory handing out a prepared [`MemServerTransport`] for every connection.
#[derive(Debug, Clone)]
pub struct MemTransportFactory {
    transport: Arc<MemServerTransport>,
}

impl MemTransportFactory {
    /// Wrap a prepared transport.
    pub fn new(transport: Arc<MemServerTransport>) -> Self {
        Self { transport }
    }
}

impl ServerTransportFactory for MemTransportFactory {
    fn new_server_transport(
        &self,
        conn: Arc<dyn Connection>,
    ) -> TransportResult<Arc<dyn ServerTransport>> {
        if conn.remote_addr() != self.transport.remote {
            return Err(TransportError::ConfigurationError(format!(
                "transport prepared for {:?}, connection is from {:?}",
                self.transport.remote,
                conn.remote_addr()
            )));
        }
        Ok(Arc::clone(&self.transport) as Arc<dyn ServerTransport>)
    }
}
