//! Shared harness for driving the stream bridge over the in-memory transport.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rpcgate_server::rpcinfo::FaultPayload;
use rpcgate_server::{
    MetaHandler, RpcContext, RpcResult, ServerOptionBuilder, Status, SvrTransHandler, Tracer,
};
use rpcgate_transport_mem::{MemClient, MemConnection, MemServerTransport, MemTransportFactory};
use rpcgate_transport_traits::Connection;
use rpcgate_wire::encode_frame;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const REMOTE: &str = "10.0.0.7:4242";

pub fn remote() -> SocketAddr {
    REMOTE.parse().unwrap()
}

/// What a tracer saw when one call finished.
#[derive(Debug, Clone)]
pub struct Finished {
    pub seq_id: u32,
    pub package: String,
    pub service: String,
    pub method: String,
    pub started: bool,
    pub error: Option<String>,
    pub panicked: Option<FaultPayload>,
    /// Statuses already written for the stream when finish ran
    pub statuses_written: usize,
    /// Bytes received counted on the call state when start ran
    pub recv_at_start: u64,
}

#[derive(Debug, Clone)]
struct Started {
    recv: u64,
}

/// Tracer reporting every finish on a channel.
pub struct RecordingTracer {
    transport: Arc<MemServerTransport>,
    tx: mpsc::UnboundedSender<Finished>,
}

impl RecordingTracer {
    pub fn new(transport: Arc<MemServerTransport>) -> (Arc<Self>, mpsc::UnboundedReceiver<Finished>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { transport, tx }), rx)
    }
}

impl Tracer for RecordingTracer {
    fn start(&self, mut ctx: RpcContext) -> RpcContext {
        let recv = ctx.rpc_info().map_or(0, |info| info.stats().recv_size());
        ctx.insert(Started { recv });
        ctx
    }

    fn finish(&self, ctx: &RpcContext) {
        let info = ctx.rpc_info().expect("call state bound to context");
        let invocation = info.invocation();
        let started = ctx.get::<Started>();
        let _ = self.tx.send(Finished {
            seq_id: invocation.seq_id(),
            package: invocation.package_name().to_string(),
            service: invocation.service_name().to_string(),
            method: invocation.method_name().to_string(),
            started: started.is_some(),
            error: info.stats().error().map(|e| e.to_string()),
            panicked: info.stats().panicked(),
            statuses_written: self.transport.statuses_for(invocation.seq_id()).len(),
            recv_at_start: started.map_or(0, |s| s.recv),
        });
    }
}

/// Metadata handler that records its label and optionally fails.
pub struct LabelHandler {
    pub label: &'static str,
    pub fail_with: Option<Status>,
    pub log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl MetaHandler for LabelHandler {
    async fn on_read_stream(&self, ctx: RpcContext) -> RpcResult<RpcContext> {
        self.log.lock().push(self.label);
        match &self.fail_with {
            Some(status) => Err(status.clone().into()),
            None => Ok(ctx),
        }
    }
}

/// Counts endpoint invocations.
#[derive(Debug, Default, Clone)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A running handler serving one in-memory connection.
pub struct Served {
    pub handler: Arc<SvrTransHandler>,
    pub transport: Arc<MemServerTransport>,
    pub conn: Arc<MemConnection>,
    pub client: Option<MemClient>,
    pub task: JoinHandle<RpcResult<()>>,
}

impl Served {
    pub fn client(&self) -> &MemClient {
        self.client.as_ref().expect("client still open")
    }

    /// Drop the client, let the accept loop end and return its result.
    pub async fn shutdown(mut self) -> RpcResult<()> {
        self.client.take();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("accept loop ended")
            .expect("accept task did not panic")
    }
}

/// Build a transport pair first so tracers can observe it, then serve.
pub fn transport() -> (Arc<MemServerTransport>, MemClient) {
    MemServerTransport::pair(Some(remote()))
}

pub fn serve(
    transport: Arc<MemServerTransport>,
    client: MemClient,
    opt: ServerOptionBuilder,
) -> Served {
    let factory = Arc::new(MemTransportFactory::new(Arc::clone(&transport)));
    let handler = Arc::new(SvrTransHandler::new(opt.build(), factory));
    let conn = MemConnection::new(Some(remote()));

    let ctx = handler
        .on_active(RpcContext::new(), conn.as_ref())
        .expect("connection active");
    let task = {
        let handler = Arc::clone(&handler);
        let conn = Arc::clone(&conn) as Arc<dyn Connection>;
        tokio::spawn(async move { handler.on_read(ctx, conn).await })
    };

    Served {
        handler,
        transport,
        conn,
        client: Some(client),
        task,
    }
}

pub fn frame<T: Serialize>(msg: &T) -> Bytes {
    encode_frame(&serde_json::to_vec(msg).unwrap(), false).unwrap()
}

pub async fn next_finish(rx: &mut mpsc::UnboundedReceiver<Finished>) -> Finished {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("tracer finished in time")
        .expect("tracer channel open")
}

/// Wait until the handler's pool holds `n` idle call states.
pub async fn wait_for_idle(handler: &SvrTransHandler, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while handler.call_states().pool().idle() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("call states released in time");
}
