//! Pre-invocation metadata handlers

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::RpcContext;
use crate::error::RpcResult;

/// One step of the metadata handshake run before a stream is dispatched.
///
/// Handlers run in registration order. Each may rewrite the context; the
/// first error aborts the call and becomes its status.
#[async_trait]
pub trait MetaHandler: Send + Sync {
    /// Inspect or transform the context of an incoming stream
    async fn on_read_stream(&self, ctx: RpcContext) -> RpcResult<RpcContext>;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Run `handlers` front to back, stopping at the first failure.
pub(crate) async fn run_chain(
    handlers: &[Arc<dyn MetaHandler>],
    mut ctx: RpcContext,
) -> RpcResult<RpcContext> {
    for handler in handlers {
        ctx = handler.on_read_stream(ctx).await.inspect_err(|e| {
            debug!(
                target: "rpcgate::server",
                handler = handler.name(),
                error = %e,
                "meta handler rejected stream"
            );
        })?;
    }
    Ok(ctx)
}
