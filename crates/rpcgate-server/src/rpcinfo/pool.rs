//! Call state acquisition, pooling and release

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rpcgate_transport_traits::TransportProtocol;
use tracing::debug;

use super::RpcInfo;
use crate::context::RpcContext;

/// Default number of idle call states kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Populates a blank call state for a new stream.
///
/// `info` is either fresh or recycled; either way every field is at its
/// default when this is called.
pub trait RpcInfoFactory: Send + Sync {
    /// Fill in `info` for a stream arriving on `ctx` from `remote`
    fn init_rpc_info(&self, info: &mut RpcInfo, ctx: &RpcContext, remote: Option<SocketAddr>);
}

/// Records the remote address as the caller and a fixed service name as the
/// callee.
#[derive(Debug, Clone, Default)]
pub struct DefaultRpcInfoFactory {
    service_name: String,
}

impl DefaultRpcInfoFactory {
    /// Factory for a server that identifies itself as `service_name`
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl RpcInfoFactory for DefaultRpcInfoFactory {
    fn init_rpc_info(&self, info: &mut RpcInfo, _ctx: &RpcContext, remote: Option<SocketAddr>) {
        info.from_mut().set_address(remote);
        info.to_mut().set_service_name(self.service_name.clone());
    }
}

/// Free list of recycled call states.
#[derive(Debug)]
pub struct RpcInfoPool {
    free: Mutex<Vec<RpcInfo>>,
    capacity: usize,
}

impl Default for RpcInfoPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }
}

impl RpcInfoPool {
    /// Pool keeping at most `capacity` idle call states
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Take a blank call state, reusing an idle one when available
    #[must_use]
    pub fn get(&self) -> RpcInfo {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Return a call state to the pool.
    ///
    /// The state is only pooled when `info` is its last reference; a state
    /// still reachable from elsewhere is left to be dropped by its last owner.
    /// Returns whether it was pooled.
    pub fn put(&self, info: Arc<RpcInfo>) -> bool {
        let Some(mut info) = Arc::into_inner(info) else {
            debug!(target: "rpcgate::server", "call state still shared on release, not pooled");
            return false;
        };
        info.recycle();

        let mut free = self.free.lock();
        if free.len() >= self.capacity {
            return false;
        }
        free.push(info);
        true
    }

    /// Number of idle call states
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Maximum number of idle call states kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Owns the lifecycle of per-call state: acquire at stream start, release
/// once the stream task is done.
pub struct CallStateManager {
    factory: Arc<dyn RpcInfoFactory>,
    pool: RpcInfoPool,
}

impl std::fmt::Debug for CallStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallStateManager")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl CallStateManager {
    /// Create a manager around `factory` and `pool`
    #[must_use]
    pub fn new(factory: Arc<dyn RpcInfoFactory>, pool: RpcInfoPool) -> Self {
        Self { factory, pool }
    }

    /// Create the call state for a new stream and bind it to a derived context.
    ///
    /// The transport protocol is tagged as [`TransportProtocol::Grpc`] after the
    /// factory runs.
    pub fn acquire(
        &self,
        ctx: RpcContext,
        remote: Option<SocketAddr>,
    ) -> (Arc<RpcInfo>, RpcContext) {
        let mut info = self.pool.get();
        self.factory.init_rpc_info(&mut info, &ctx, remote);
        info.config_mut()
            .set_transport_protocol(TransportProtocol::Grpc);

        let info = Arc::new(info);
        let ctx = ctx.with_rpc_info(Arc::clone(&info));
        (info, ctx)
    }

    /// Reset `info` and return it to the pool
    pub fn release(&self, info: Arc<RpcInfo>) -> bool {
        self.pool.put(info)
    }

    /// The underlying pool
    #[must_use]
    pub fn pool(&self) -> &RpcInfoPool {
        &self.pool
    }
}
