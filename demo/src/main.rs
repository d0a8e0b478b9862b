//! rpcgate demo - an echo service behind the stream bridge
//!
//! Serves one in-memory connection and drives a handful of calls through it:
//! a successful echo, two malformed method names and a call the tenant check
//! rejects. Logging follows `RPCGATE_*` environment configuration.

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use rpcgate_server::{
    LogTracer, MetaHandler, RpcContext, RpcResult, ServerConfig, ServerOption, Status,
    SvrTransHandler, endpoint_fn,
};
use rpcgate_transport_mem::{MemClient, MemConnection, MemServerTransport, MemTransportFactory};
use rpcgate_transport_traits::Connection;
use rpcgate_wire::{Codec, FrameDecoder, JsonCodec, encode_frame};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct EchoMessage {
    text: String,
}

/// Rejects streams without an `x-tenant` header
struct TenantCheck;

#[async_trait]
impl MetaHandler for TenantCheck {
    async fn on_read_stream(&self, ctx: RpcContext) -> RpcResult<RpcContext> {
        if ctx.headers().contains_key("x-tenant") {
            Ok(ctx)
        } else {
            Err(Status::unauthenticated("missing x-tenant header").into())
        }
    }
}

async fn call(
    client: &MemClient,
    method: &str,
    tenant: Option<&'static str>,
    text: &str,
) -> anyhow::Result<()> {
    let codec = JsonCodec::new();
    let mut headers = HeaderMap::new();
    if let Some(tenant) = tenant {
        headers.insert("x-tenant", HeaderValue::from_static(tenant));
    }

    let mut stream = client.open_stream_with_headers(method, headers);
    let payload = codec.encode(&EchoMessage { text: text.into() })?;
    stream.send(encode_frame(&payload, false)?)?;
    stream.close_send();

    let status = stream.status().await;

    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = stream.recv().await {
        decoder.feed(&chunk);
    }
    while let Some(frame) = decoder.try_decode()? {
        let reply: EchoMessage = codec.decode(&frame.payload)?;
        println!("{method:<28} reply  {:?}", reply.text);
    }
    match status {
        Some(status) => println!("{method:<28} status {status}"),
        None => println!("{method:<28} no status"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    let _guard = config.logging.init()?;

    let opt = ServerOption::from_config(&config)?
        .meta_handler(Arc::new(TenantCheck))
        .tracer(Arc::new(LogTracer))
        .invoke_handler(endpoint_fn(|_ctx, mut args| async move {
            while let Some(msg) = args.stream.recv_msg::<EchoMessage>().await? {
                args.stream.send_msg(&msg).await?;
            }
            Ok(())
        }))
        .build();

    let remote = "127.0.0.1:50051".parse()?;
    let (transport, client) = MemServerTransport::pair(Some(remote));
    let handler = Arc::new(SvrTransHandler::new(
        opt,
        Arc::new(MemTransportFactory::new(transport)),
    ));

    let conn = MemConnection::new(Some(remote));
    let ctx = handler.on_active(RpcContext::new(), conn.as_ref())?;
    let serving = {
        let handler = Arc::clone(&handler);
        let conn = Arc::clone(&conn) as Arc<dyn Connection>;
        let ctx = ctx.clone();
        tokio::spawn(async move { handler.on_read(ctx, conn).await })
    };
    info!(%remote, "connection active");

    call(&client, "/echo.EchoService/Echo", Some("acme"), "hello").await?;
    call(&client, "BadMethod", Some("acme"), "hello").await?;
    call(&client, "/noservice/Method", Some("acme"), "hello").await?;
    call(&client, "/echo.EchoService/Echo", None, "hello").await?;

    drop(client);
    if let Err(e) = serving.await? {
        handler.on_error(&ctx, &e, conn.as_ref());
    }
    handler.on_inactive(ctx, conn.as_ref());
    conn.close().await?;
    info!("connection closed");
    Ok(())
}
