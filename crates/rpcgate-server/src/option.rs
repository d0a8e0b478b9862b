//! Programmatic server options

use std::sync::Arc;

use rpcgate_transport_traits::LimitsConfig;
use rpcgate_wire::AnyCodec;

use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::meta::MetaHandler;
use crate::rpcinfo::{DEFAULT_POOL_CAPACITY, DefaultRpcInfoFactory, RpcInfoFactory};
use crate::status::{ErrorMapper, StatusTranslator};
use crate::tracer::{Tracer, TracerController};

/// What to tell the peer when an endpoint panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Write no status; the peer waits for its own deadline
    #[default]
    Silent,
    /// Write an `INTERNAL` status before the tracers finish
    InternalStatus,
}

/// Everything the stream handler is configured with.
///
/// Build with [`ServerOption::builder`] or seed from a file with
/// [`ServerOption::from_config`].
pub struct ServerOption {
    pub(crate) meta_handlers: Vec<Arc<dyn MetaHandler>>,
    pub(crate) rpc_info_factory: Arc<dyn RpcInfoFactory>,
    pub(crate) tracer: Option<Arc<TracerController>>,
    pub(crate) translator: StatusTranslator,
    pub(crate) codec: AnyCodec,
    pub(crate) endpoint: Option<Arc<dyn Endpoint>>,
    pub(crate) fault_policy: FaultPolicy,
    pub(crate) limits: LimitsConfig,
    pub(crate) pool_capacity: usize,
}

impl std::fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOption")
            .field("meta_handlers", &self.meta_handlers.len())
            .field("tracer", &self.tracer)
            .field("codec", &self.codec)
            .field("has_endpoint", &self.endpoint.is_some())
            .field("fault_policy", &self.fault_policy)
            .field("limits", &self.limits)
            .field("pool_capacity", &self.pool_capacity)
            .finish_non_exhaustive()
    }
}

impl Default for ServerOption {
    fn default() -> Self {
        ServerOptionBuilder::new().build()
    }
}

impl ServerOption {
    /// Create a new option builder
    #[must_use]
    pub fn builder() -> ServerOptionBuilder {
        ServerOptionBuilder::new()
    }

    /// Seed a builder from file/env configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown codec name.
    pub fn from_config(config: &ServerConfig) -> Result<ServerOptionBuilder, ConfigError> {
        let policy = if config.send_status_on_fault {
            FaultPolicy::InternalStatus
        } else {
            FaultPolicy::Silent
        };
        Ok(ServerOptionBuilder::new()
            .codec(config.payload_codec()?)
            .rpc_info_factory(Arc::new(DefaultRpcInfoFactory::new(&config.service_name)))
            .fault_policy(policy)
            .limits(config.limits.clone())
            .pool_capacity(config.pool_capacity))
    }

    /// Configured fault policy
    #[must_use]
    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    /// Configured payload codec
    #[must_use]
    pub fn codec(&self) -> &AnyCodec {
        &self.codec
    }
}

/// Builder for [`ServerOption`]
pub struct ServerOptionBuilder {
    meta_handlers: Vec<Arc<dyn MetaHandler>>,
    rpc_info_factory: Arc<dyn RpcInfoFactory>,
    tracer: TracerController,
    translator: StatusTranslator,
    codec: AnyCodec,
    endpoint: Option<Arc<dyn Endpoint>>,
    fault_policy: FaultPolicy,
    limits: LimitsConfig,
    pool_capacity: usize,
}

impl std::fmt::Debug for ServerOptionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptionBuilder").finish_non_exhaustive()
    }
}

impl Default for ServerOptionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerOptionBuilder {
    /// Create a builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta_handlers: Vec::new(),
            rpc_info_factory: Arc::new(DefaultRpcInfoFactory::default()),
            tracer: TracerController::new(),
            translator: StatusTranslator::default(),
            codec: AnyCodec::default(),
            endpoint: None,
            fault_policy: FaultPolicy::default(),
            limits: LimitsConfig::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    /// Append a metadata handler; handlers run in the order added
    #[must_use]
    pub fn meta_handler(mut self, handler: Arc<dyn MetaHandler>) -> Self {
        self.meta_handlers.push(handler);
        self
    }

    /// Replace the call-state factory
    #[must_use]
    pub fn rpc_info_factory(mut self, factory: Arc<dyn RpcInfoFactory>) -> Self {
        self.rpc_info_factory = factory;
        self
    }

    /// Register a tracer; tracers start in the order added
    #[must_use]
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer.append(tracer);
        self
    }

    /// Replace the business error mapper
    #[must_use]
    pub fn error_mapper(mut self, mapper: Arc<dyn ErrorMapper>) -> Self {
        self.translator = StatusTranslator::new(mapper);
        self
    }

    /// Set the payload codec
    #[must_use]
    pub fn codec(mut self, codec: AnyCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the business endpoint
    #[must_use]
    pub fn invoke_handler(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the fault policy
    #[must_use]
    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Set message size limits
    #[must_use]
    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Set how many idle call states are kept for reuse
    #[must_use]
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> ServerOption {
        let tracer = self
            .tracer
            .has_tracers()
            .then(|| Arc::new(self.tracer));
        ServerOption {
            meta_handlers: self.meta_handlers,
            rpc_info_factory: self.rpc_info_factory,
            tracer,
            translator: self.translator,
            codec: self.codec,
            endpoint: self.endpoint,
            fault_policy: self.fault_policy,
            limits: self.limits,
            pool_capacity: self.pool_capacity,
        }
    }
}
