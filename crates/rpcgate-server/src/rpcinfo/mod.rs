//! Per-call state: invocation, configuration, endpoints and stats
//!
//! An [`RpcInfo`] is created for every stream by the [`CallStateManager`],
//! shared read-only through the [`RpcContext`](crate::RpcContext), and
//! recycled into an [`RpcInfoPool`] once the stream task is done with it.

mod endpoint;
mod invocation;
mod pool;
mod stats;

use rpcgate_transport_traits::TransportProtocol;

pub use endpoint::EndpointInfo;
pub use invocation::Invocation;
pub(crate) use invocation::InvocationSetter;
pub use pool::{
    CallStateManager, DEFAULT_POOL_CAPACITY, DefaultRpcInfoFactory, RpcInfoFactory, RpcInfoPool,
};
pub use stats::{FaultPayload, RpcStats, StatsEvent};

use invocation::InvocationCell;

/// Call-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcConfig {
    transport_protocol: TransportProtocol,
    payload_codec: String,
}

impl RpcConfig {
    /// Protocol the call arrived over
    #[must_use]
    pub fn transport_protocol(&self) -> TransportProtocol {
        self.transport_protocol
    }

    /// Name of the payload codec serving the call
    #[must_use]
    pub fn payload_codec(&self) -> &str {
        &self.payload_codec
    }

    /// Set the transport protocol
    pub fn set_transport_protocol(&mut self, protocol: TransportProtocol) {
        self.transport_protocol = protocol;
    }

    /// Set the payload codec name
    pub fn set_payload_codec(&mut self, name: impl Into<String>) {
        self.payload_codec = name.into();
    }
}

/// Everything known about one call.
///
/// `from`, `to` and `config` are fixed once the call state is shared; they are
/// set through `&mut` accessors by the factory. The invocation record can only
/// be written by the dispatcher. Stats are internally synchronised.
#[derive(Debug, Default)]
pub struct RpcInfo {
    from: EndpointInfo,
    to: EndpointInfo,
    config: RpcConfig,
    invocation: InvocationCell,
    stats: RpcStats,
}

impl RpcInfo {
    /// The caller
    #[must_use]
    pub fn from(&self) -> &EndpointInfo {
        &self.from
    }

    /// The callee
    #[must_use]
    pub fn to(&self) -> &EndpointInfo {
        &self.to
    }

    /// Call configuration
    #[must_use]
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Snapshot of the invocation record
    #[must_use]
    pub fn invocation(&self) -> Invocation {
        self.invocation.snapshot()
    }

    /// Call statistics
    #[must_use]
    pub fn stats(&self) -> &RpcStats {
        &self.stats
    }

    /// Mutable caller descriptor
    pub fn from_mut(&mut self) -> &mut EndpointInfo {
        &mut self.from
    }

    /// Mutable callee descriptor
    pub fn to_mut(&mut self) -> &mut EndpointInfo {
        &mut self.to
    }

    /// Mutable call configuration
    pub fn config_mut(&mut self) -> &mut RpcConfig {
        &mut self.config
    }

    pub(crate) fn invocation_setter(&self) -> InvocationSetter<'_> {
        self.invocation.setter()
    }

    /// Clear every field so the value can serve another call.
    pub(crate) fn recycle(&mut self) {
        self.from.reset();
        self.to.reset();
        self.config = RpcConfig::default();
        self.invocation.reset();
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodTriple;

    #[test]
    fn test_recycle_clears_all_parts() {
        let mut info = RpcInfo::default();
        info.from_mut().set_address(Some("127.0.0.1:1".parse().unwrap()));
        info.to_mut().set_service_name("echo");
        info.config_mut().set_transport_protocol(TransportProtocol::Grpc);
        info.invocation_setter()
            .set_triple(&MethodTriple::parse("/a.B/C").unwrap());
        info.stats().record(StatsEvent::RpcStart);

        info.recycle();

        assert_eq!(info.from(), &EndpointInfo::default());
        assert_eq!(info.to(), &EndpointInfo::default());
        assert_eq!(info.config(), &RpcConfig::default());
        assert_eq!(info.invocation(), Invocation::default());
        assert!(info.stats().is_empty());
    }
}
