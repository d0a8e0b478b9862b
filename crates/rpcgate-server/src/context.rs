//! Per-call context

use std::sync::Arc;

use http::{Extensions, HeaderMap};

use crate::rpcinfo::RpcInfo;

/// Context threaded through metadata handlers, tracers and the endpoint.
///
/// Cloning is cheap enough for the per-call path: the call state is shared
/// and extensions hold whatever handlers chose to attach.
#[derive(Debug, Clone, Default)]
pub struct RpcContext {
    headers: HeaderMap,
    extensions: Extensions,
    rpc_info: Option<Arc<RpcInfo>>,
}

impl RpcContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for a stream that arrived with `headers`
    #[must_use]
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    /// Request headers of the stream
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers, for handlers that rewrite metadata
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Attach a typed value, returning the previous one of the same type
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    /// Typed value previously attached with [`RpcContext::insert`]
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Call state bound to this context
    #[must_use]
    pub fn rpc_info(&self) -> Option<&Arc<RpcInfo>> {
        self.rpc_info.as_ref()
    }

    /// Derive a context bound to `info`
    #[must_use]
    pub fn with_rpc_info(mut self, info: Arc<RpcInfo>) -> Self {
        self.rpc_info = Some(info);
        self
    }

    /// Detach the call state from this context
    pub fn take_rpc_info(&mut self) -> Option<Arc<RpcInfo>> {
        self.rpc_info.take()
    }
}
