//! Server transport handler: connection lifecycle and per-stream dispatch

use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use rpcgate_transport_traits::{
    Connection, LimitsConfig, ReadTimeout, ServerTransport, ServerTransportFactory, Status,
    StreamHandler, TransportStream,
};
use rpcgate_wire::{AnyCodec, Codec, FrameDecoder, MAX_FRAME_SIZE, encode_frame};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, warn};

use crate::context::RpcContext;
use crate::endpoint::{Endpoint, StreamArgs};
use crate::error::{RpcError, RpcResult};
use crate::meta::{self, MetaHandler};
use crate::method::MethodTriple;
use crate::option::{FaultPolicy, ServerOption};
use crate::rpcinfo::{CallStateManager, FaultPayload, RpcInfoPool};
use crate::status::StatusTranslator;
use crate::stream::{RpcStream, check_send_size, decode_frame, truncated};
use crate::tracer::{TracerBracket, TracerController};

const TARGET: &str = "rpcgate::server";

/// Outcome handed to the tracer bracket when a call ends.
type CallOutcome = (Option<Arc<RpcError>>, Option<FaultPayload>);

/// State shared by every stream task of a handler.
struct Dispatcher {
    meta_handlers: Vec<Arc<dyn MetaHandler>>,
    tracer: Option<Arc<TracerController>>,
    translator: StatusTranslator,
    codec: AnyCodec,
    limits: LimitsConfig,
    fault_policy: FaultPolicy,
    call_states: CallStateManager,
    endpoint: RwLock<Option<Arc<dyn Endpoint>>>,
}

/// Bridges a multiplexed server transport to the business endpoint.
///
/// One handler serves every connection of a server. For each connection the
/// host calls [`on_active`](Self::on_active), then [`on_read`](Self::on_read)
/// until the connection ends, then [`on_inactive`](Self::on_inactive).
/// Transport failures are reported through [`on_error`](Self::on_error).
pub struct SvrTransHandler {
    dispatcher: Arc<Dispatcher>,
    transport_factory: Arc<dyn ServerTransportFactory>,
}

impl std::fmt::Debug for SvrTransHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvrTransHandler")
            .field("transport_factory", &self.transport_factory)
            .field("codec", &self.dispatcher.codec)
            .field("fault_policy", &self.dispatcher.fault_policy)
            .finish_non_exhaustive()
    }
}

impl SvrTransHandler {
    /// Create a handler from `opt`, building a server transport for every
    /// connection with `transport_factory`.
    #[must_use]
    pub fn new(opt: ServerOption, transport_factory: Arc<dyn ServerTransportFactory>) -> Self {
        let call_states = CallStateManager::new(
            opt.rpc_info_factory,
            RpcInfoPool::with_capacity(opt.pool_capacity),
        );
        Self {
            dispatcher: Arc::new(Dispatcher {
                meta_handlers: opt.meta_handlers,
                tracer: opt.tracer,
                translator: opt.translator,
                codec: opt.codec,
                limits: opt.limits,
                fault_policy: opt.fault_policy,
                call_states,
                endpoint: RwLock::new(opt.endpoint),
            }),
            transport_factory,
        }
    }

    /// Install the business endpoint. Streams dispatched afterwards use it.
    pub fn set_invoke_handler(&self, endpoint: Arc<dyn Endpoint>) {
        *self.dispatcher.endpoint.write() = Some(endpoint);
    }

    /// Call-state manager, for hosts that inspect pooling
    #[must_use]
    pub fn call_states(&self) -> &CallStateManager {
        &self.dispatcher.call_states
    }

    /// A new connection became active.
    ///
    /// Streams on one connection live arbitrarily long, so the connection read
    /// timeout is disabled; liveness is left to transport keepalive.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the timeout cannot be set.
    pub fn on_active(&self, ctx: RpcContext, conn: &dyn Connection) -> RpcResult<RpcContext> {
        conn.set_read_timeout(ReadTimeout::Infinite)?;
        Ok(ctx)
    }

    /// Serve the connection: accept streams until it ends, dispatching each
    /// to its own task.
    ///
    /// The server transport is closed on return, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the server transport cannot be created or its
    /// accept loop fails.
    pub async fn on_read(&self, ctx: RpcContext, conn: Arc<dyn Connection>) -> RpcResult<()> {
        let transport = self.transport_factory.new_server_transport(conn)?;

        let dispatcher = Arc::clone(&self.dispatcher);
        let accept_transport = Arc::clone(&transport);
        let handler: StreamHandler = Arc::new(move |stream: Arc<dyn TransportStream>| {
            let dispatcher = Arc::clone(&dispatcher);
            let transport = Arc::clone(&accept_transport);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                dispatcher.serve_stream(ctx, transport, stream).await;
            });
        });

        let served = transport.handle_streams(handler).await;
        if let Err(e) = transport.close().await {
            debug!(target: TARGET, error = %e, "closing server transport failed");
        }
        served.map_err(RpcError::from)
    }

    /// The connection closed. Releases a call state bound to the
    /// connection-level context, if there is one.
    ///
    /// Per-stream call states are released by their stream tasks.
    pub fn on_inactive(&self, mut ctx: RpcContext, _conn: &dyn Connection) {
        if let Some(info) = ctx.take_rpc_info() {
            self.dispatcher.call_states.release(info);
        }
    }

    /// Report a transport-level error. Logging only.
    pub fn on_error(&self, _ctx: &RpcContext, err: &RpcError, conn: &dyn Connection) {
        let remote = display_remote(conn.remote_addr());
        match err.backtrace() {
            Some(backtrace) => error!(
                target: TARGET,
                remote = %remote,
                error = %err,
                backtrace = %backtrace,
                "processing request error"
            ),
            None => error!(
                target: TARGET,
                remote = %remote,
                error = %err,
                "processing request error"
            ),
        }
    }

    /// Encode `msg` as one frame on `conn` and flush it.
    ///
    /// # Errors
    ///
    /// Encoding failures, messages over the send limit, and transport errors.
    pub async fn write<T: Serialize>(
        &self,
        ctx: &RpcContext,
        conn: &dyn Connection,
        msg: &T,
    ) -> RpcResult<()> {
        let payload = self.dispatcher.codec.encode(msg)?;
        check_send_size(payload.len(), self.dispatcher.limits.max_send_message_size)?;
        conn.write(encode_frame(&payload, false)?).await?;
        conn.flush().await?;
        if let Some(info) = ctx.rpc_info() {
            info.stats().add_send_size(payload.len());
        }
        Ok(())
    }

    /// A read buffer sized to the configured receive limit, for [`Self::read`].
    #[must_use]
    pub fn new_read_buffer(&self) -> FrameDecoder {
        FrameDecoder::with_max_size(
            self.dispatcher
                .limits
                .max_recv_message_size
                .unwrap_or(MAX_FRAME_SIZE),
        )
    }

    /// Decode the next frame from `conn`, buffering partial input in `buf`.
    ///
    /// Returns `None` at end of input. On error the buffer is cleared.
    ///
    /// # Errors
    ///
    /// Transport errors, oversized or truncated frames, and decode failures.
    pub async fn read<T: DeserializeOwned>(
        &self,
        ctx: &RpcContext,
        conn: &dyn Connection,
        buf: &mut FrameDecoder,
    ) -> RpcResult<Option<T>> {
        let result = self.read_frame(ctx, conn, buf).await;
        if result.is_err() {
            buf.clear();
        }
        result
    }

    async fn read_frame<T: DeserializeOwned>(
        &self,
        ctx: &RpcContext,
        conn: &dyn Connection,
        buf: &mut FrameDecoder,
    ) -> RpcResult<Option<T>> {
        loop {
            if let Some(frame) = buf.try_decode()? {
                if let Some(info) = ctx.rpc_info() {
                    info.stats().add_recv_size(frame.payload.len());
                }
                return decode_frame(&self.dispatcher.codec, &frame).map(Some);
            }
            match conn.read().await? {
                Some(chunk) => buf.feed(&chunk),
                None if buf.is_empty() => return Ok(None),
                None => return Err(truncated(buf)),
            }
        }
    }
}

impl Dispatcher {
    /// Everything one stream goes through, from call-state acquisition to
    /// release.
    async fn serve_stream(
        &self,
        conn_ctx: RpcContext,
        transport: Arc<dyn ServerTransport>,
        stream: Arc<dyn TransportStream>,
    ) {
        let mut stream_ctx = conn_ctx;
        *stream_ctx.headers_mut() = stream.headers().clone();

        let (info, ctx) = self
            .call_states
            .acquire(stream_ctx, transport.remote_addr());
        info.invocation_setter().set_seq_id(stream.id());

        let mut bracket = TracerBracket::new(self.tracer.clone(), Arc::clone(&info), ctx.clone());
        let (err, fault) = self
            .run_call(ctx, &mut bracket, transport.as_ref(), &stream)
            .await;
        bracket.finish(err, fault);

        self.call_states.release(info);
    }

    async fn run_call(
        &self,
        ctx: RpcContext,
        bracket: &mut TracerBracket,
        transport: &dyn ServerTransport,
        stream: &Arc<dyn TransportStream>,
    ) -> CallOutcome {
        let ctx = match meta::run_chain(&self.meta_handlers, ctx).await {
            Ok(ctx) => ctx,
            Err(err) => return self.fail(transport, stream.as_ref(), err).await,
        };

        let ctx = bracket.start(ctx);

        let triple = match MethodTriple::parse(stream.method()) {
            Ok(triple) => triple,
            Err(err) => return self.fail(transport, stream.as_ref(), err).await,
        };
        if let Some(info) = ctx.rpc_info() {
            info.invocation_setter().set_triple(&triple);
        }

        let endpoint = self.endpoint.read().clone();
        let Some(endpoint) = endpoint else {
            let err = RpcError::Status(Status::unimplemented(format!(
                "no invoke handler installed for {triple}"
            )));
            return self.fail(transport, stream.as_ref(), err).await;
        };

        let args = StreamArgs {
            stream: RpcStream::new(
                ctx.clone(),
                Arc::clone(stream),
                self.codec.clone(),
                &self.limits,
            ),
        };
        let invoked = AssertUnwindSafe(endpoint.call(ctx, args))
            .catch_unwind()
            .await;

        match invoked {
            Ok(Ok(())) => {
                self.write_status(transport, stream.as_ref(), &Status::ok()).await;
                (None, None)
            }
            Ok(Err(err)) => self.fail(transport, stream.as_ref(), err).await,
            Err(panic) => {
                let backtrace = Backtrace::force_capture().to_string();
                let fault = FaultPayload::from_panic(panic.as_ref(), backtrace);
                error!(
                    target: TARGET,
                    remote = %display_remote(transport.remote_addr()),
                    method = %triple,
                    panic = %fault.message,
                    backtrace = %fault.backtrace,
                    "panic happened in endpoint"
                );
                if self.fault_policy == FaultPolicy::InternalStatus {
                    let status = Status::internal(format!("panic: {}", fault.message));
                    self.write_status(transport, stream.as_ref(), &status).await;
                }
                (None, Some(fault))
            }
        }
    }

    /// Write the translated status for `err` and hand the error to the bracket.
    async fn fail(
        &self,
        transport: &dyn ServerTransport,
        stream: &dyn TransportStream,
        err: RpcError,
    ) -> CallOutcome {
        let status = self.translator.translate(&err);
        self.write_status(transport, stream, &status).await;
        (Some(Arc::new(err)), None)
    }

    async fn write_status(
        &self,
        transport: &dyn ServerTransport,
        stream: &dyn TransportStream,
        status: &Status,
    ) {
        if let Err(e) = transport.write_status(stream, status).await {
            warn!(
                target: TARGET,
                stream_id = stream.id(),
                status = %status,
                error = %e,
                "failed to write stream status"
            );
        }
    }
}

fn display_remote(addr: Option<std::net::SocketAddr>) -> String {
    addr.map_or_else(|| "unknown".to_string(), |a| a.to_string())
}
