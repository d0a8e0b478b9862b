//! Business endpoint abstraction

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RpcContext;
use crate::error::RpcResult;
use crate::stream::RpcStream;

/// Arguments handed to the endpoint for a streaming call.
#[derive(Debug)]
pub struct StreamArgs {
    /// The call's message stream
    pub stream: RpcStream,
}

/// Business logic entry point.
///
/// Called once per stream after the handshake and method resolution
/// succeeded. The resolved method is on the call state in `ctx`. Returning
/// `Ok` sends an OK status; an error is translated to a status.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Serve one call
    async fn call(&self, ctx: RpcContext, args: StreamArgs) -> RpcResult<()>;
}

/// [`Endpoint`] backed by an async closure.
pub struct EndpointFn<F>(F);

impl<F> std::fmt::Debug for EndpointFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EndpointFn")
    }
}

#[async_trait]
impl<F, Fut> Endpoint for EndpointFn<F>
where
    F: Fn(RpcContext, StreamArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<()>> + Send + 'static,
{
    async fn call(&self, ctx: RpcContext, args: StreamArgs) -> RpcResult<()> {
        (self.0)(ctx, args).await
    }
}

/// Wrap an async closure as a shared endpoint.
///
/// ```ignore
/// let echo = endpoint_fn(|_ctx, mut args| async move {
///     while let Some(msg) = args.stream.recv_msg::<serde_json::Value>().await? {
///         args.stream.send_msg(&msg).await?;
///     }
///     Ok(())
/// });
/// ```
pub fn endpoint_fn<F, Fut>(f: F) -> Arc<dyn Endpoint>
where
    F: Fn(RpcContext, StreamArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<()>> + Send + 'static,
{
    Arc::new(EndpointFn(f))
}
