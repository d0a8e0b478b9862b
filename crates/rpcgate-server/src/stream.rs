//! Server-side view of one call's stream

use std::sync::Arc;

use http::HeaderMap;
use rpcgate_transport_traits::{LimitsConfig, Status, TransportStream};
use rpcgate_wire::{
    AnyCodec, Codec, CodecError, Frame, FrameDecoder, MAX_FRAME_SIZE, encode_frame,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::context::RpcContext;
use crate::error::{RpcError, RpcResult};
use crate::rpcinfo::StatsEvent;

/// Message-level stream handed to the endpoint.
///
/// Wraps the transport stream with gRPC framing and the server's codec.
/// Byte counts and read/write timestamps are recorded on the call's stats.
pub struct RpcStream {
    ctx: RpcContext,
    inner: Arc<dyn TransportStream>,
    codec: AnyCodec,
    decoder: FrameDecoder,
    max_send_message_size: Option<usize>,
}

impl std::fmt::Debug for RpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStream")
            .field("id", &self.inner.id())
            .field("method", &self.inner.method())
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}

impl RpcStream {
    pub(crate) fn new(
        ctx: RpcContext,
        inner: Arc<dyn TransportStream>,
        codec: AnyCodec,
        limits: &LimitsConfig,
    ) -> Self {
        let decoder =
            FrameDecoder::with_max_size(limits.max_recv_message_size.unwrap_or(MAX_FRAME_SIZE));
        Self {
            ctx,
            inner,
            codec,
            decoder,
            max_send_message_size: limits.max_send_message_size,
        }
    }

    /// Full method string as received
    #[must_use]
    pub fn method(&self) -> &str {
        self.inner.method()
    }

    /// Request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Context the call was dispatched with
    #[must_use]
    pub fn context(&self) -> &RpcContext {
        &self.ctx
    }

    /// Receive the next request message, or `None` once the client half-closed.
    ///
    /// # Errors
    ///
    /// Transport failures, frames over the receive limit, compressed frames,
    /// payloads the codec cannot decode, and a half-close in the middle of a
    /// frame.
    pub async fn recv_msg<T: DeserializeOwned>(&mut self) -> RpcResult<Option<T>> {
        self.record(StatsEvent::ReadStart);
        let result = self.next_msg().await;
        self.record(StatsEvent::ReadFinish);
        result
    }

    async fn next_msg<T: DeserializeOwned>(&mut self) -> RpcResult<Option<T>> {
        loop {
            if let Some(frame) = self.decoder.try_decode()? {
                if let Some(info) = self.ctx.rpc_info() {
                    info.stats().add_recv_size(frame.payload.len());
                }
                return decode_frame(&self.codec, &frame).map(Some);
            }

            match self.inner.recv_data().await? {
                Some(chunk) => self.decoder.feed(&chunk),
                None if self.decoder.is_empty() => return Ok(None),
                None => return Err(truncated(&mut self.decoder)),
            }
        }
    }

    /// Send one response message.
    ///
    /// # Errors
    ///
    /// Encoding failures, messages over the send limit, and transport failures.
    pub async fn send_msg<T: Serialize>(&self, msg: &T) -> RpcResult<()> {
        self.record(StatsEvent::WriteStart);
        let result = self.write_msg(msg).await;
        self.record(StatsEvent::WriteFinish);
        result
    }

    async fn write_msg<T: Serialize>(&self, msg: &T) -> RpcResult<()> {
        let payload = self.codec.encode(msg)?;
        check_send_size(payload.len(), self.max_send_message_size)?;

        self.inner.send_data(encode_frame(&payload, false)?).await?;
        if let Some(info) = self.ctx.rpc_info() {
            info.stats().add_send_size(payload.len());
        }
        Ok(())
    }

    fn record(&self, event: StatsEvent) {
        if let Some(info) = self.ctx.rpc_info() {
            info.stats().record(event);
        }
    }
}

/// Reject an encoded message longer than the send limit.
pub(crate) fn check_send_size(len: usize, max: Option<usize>) -> RpcResult<()> {
    match max {
        Some(max) if len > max => Err(RpcError::Status(Status::resource_exhausted(format!(
            "trying to send message larger than max ({len} vs. {max})"
        )))),
        _ => Ok(()),
    }
}

/// Decode one frame's payload with `codec`.
pub(crate) fn decode_frame<T: DeserializeOwned>(codec: &AnyCodec, frame: &Frame) -> RpcResult<T> {
    if frame.compressed {
        return Err(Status::unimplemented("compressed messages are not supported").into());
    }
    Ok(codec.decode(&frame.payload)?)
}

/// Error for input that ended inside a frame. Drops the partial frame.
pub(crate) fn truncated(decoder: &mut FrameDecoder) -> RpcError {
    let buffered = decoder.len();
    decoder.clear();
    CodecError::decode(format!(
        "stream ended with {buffered} bytes of an incomplete frame"
    ))
    .into()
}
