//! Translation from call errors to wire statuses

use std::sync::Arc;

use rpcgate_transport_traits::{Code, Status};
use rpcgate_wire::CodecError;

use crate::error::{BizError, RpcError};

/// Maps business errors to wire status codes.
///
/// Only the code is pluggable. The written status always carries the business
/// message unchanged.
pub trait ErrorMapper: Send + Sync {
    /// Code for one business error
    fn map_business(&self, err: &BizError) -> Code;
}

/// Uses the business code as the gRPC code when it is a known code value,
/// otherwise `UNKNOWN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn map_business(&self, err: &BizError) -> Code {
        Code::from_i32(err.code())
    }
}

impl<F> ErrorMapper for F
where
    F: Fn(&BizError) -> Code + Send + Sync,
{
    fn map_business(&self, err: &BizError) -> Code {
        self(err)
    }
}

/// Turns the outcome of a call into the status written to its stream.
#[derive(Clone)]
pub struct StatusTranslator {
    mapper: Arc<dyn ErrorMapper>,
}

impl std::fmt::Debug for StatusTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTranslator").finish_non_exhaustive()
    }
}

impl Default for StatusTranslator {
    fn default() -> Self {
        Self::new(Arc::new(DefaultErrorMapper))
    }
}

impl StatusTranslator {
    /// Create a translator using `mapper` for business errors
    #[must_use]
    pub fn new(mapper: Arc<dyn ErrorMapper>) -> Self {
        Self { mapper }
    }

    /// Status for a call that ended with `result`
    #[must_use]
    pub fn translate_result<T>(&self, result: &Result<T, RpcError>) -> Status {
        match result {
            Ok(_) => Status::ok(),
            Err(err) => self.translate(err),
        }
    }

    /// Status for a failed call
    #[must_use]
    pub fn translate(&self, err: &RpcError) -> Status {
        match err {
            RpcError::MalformedMethodName(_) | RpcError::MalformedServiceName(_) => {
                Status::resource_exhausted(err.to_string())
            }
            RpcError::Business(biz) => {
                Status::new(self.mapper.map_business(biz), biz.message())
            }
            RpcError::Status(status) => status.clone(),
            RpcError::Codec(CodecError::FrameTooLarge { .. }) => {
                Status::resource_exhausted(err.to_string())
            }
            RpcError::Transport(_) => Status::unavailable(err.to_string()),
            RpcError::Detailed(detailed) => self.translate(detailed.inner()),
            RpcError::MetaHandler { .. } | RpcError::Codec(_) | RpcError::Internal(_) => {
                Status::internal(err.to_string())
            }
        }
    }
}
