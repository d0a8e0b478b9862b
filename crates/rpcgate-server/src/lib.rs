//! rpcgate server stream bridge
//!
//! Connects a multiplexed HTTP/2 server transport to business logic. Every
//! inbound stream runs in its own task, which:
//!
//! - binds a pooled call state ([`RpcInfo`]) to the stream's context
//! - runs the metadata handler chain (the handshake)
//! - starts the configured tracers
//! - resolves `/package.Service/Method` into its three parts
//! - invokes the [`Endpoint`] and isolates any panic it raises
//! - writes exactly one terminal [`Status`] (unless a panic occurred and the
//!   [`FaultPolicy`] is silent)
//! - finishes the tracers exactly once, then recycles the call state
//!
//! # Quick Start
//!
//! ```ignore
//! use rpcgate_server::{LogTracer, ServerOption, SvrTransHandler, endpoint_fn};
//!
//! let opt = ServerOption::builder()
//!     .tracer(Arc::new(LogTracer))
//!     .invoke_handler(endpoint_fn(|_ctx, mut args| async move {
//!         while let Some(msg) = args.stream.recv_msg::<serde_json::Value>().await? {
//!             args.stream.send_msg(&msg).await?;
//!         }
//!         Ok(())
//!     }))
//!     .build();
//!
//! let handler = SvrTransHandler::new(opt, transport_factory);
//! let ctx = handler.on_active(RpcContext::new(), conn.as_ref())?;
//! handler.on_read(ctx.clone(), conn.clone()).await?;
//! handler.on_inactive(ctx, conn.as_ref());
//! ```
//!
//! # Configuration
//!
//! [`ServerConfig`] loads from TOML/YAML/JSON files and `RPCGATE_*`
//! environment variables; [`ServerOption::from_config`] turns it into a
//! builder. Logging is set up separately with [`LoggingConfig::init`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod logging;
pub mod meta;
pub mod method;
pub mod option;
pub mod rpcinfo;
pub mod status;
pub mod stream;
pub mod tracer;

// Re-exports for convenience
pub use config::{LogOutput, LogRotation, LoggingConfig, ServerConfig};
pub use context::RpcContext;
pub use endpoint::{Endpoint, StreamArgs, endpoint_fn};
pub use error::{BizError, ConfigError, RpcError, RpcResult};
pub use handler::SvrTransHandler;
pub use logging::LoggingGuard;
pub use meta::MetaHandler;
pub use method::MethodTriple;
pub use option::{FaultPolicy, ServerOption, ServerOptionBuilder};
pub use rpcinfo::{CallStateManager, RpcInfo, RpcInfoFactory, RpcInfoPool};
pub use status::{ErrorMapper, StatusTranslator};
pub use stream::RpcStream;
pub use tracer::{CallSpan, LogTracer, Tracer, TracerBracket, TracerController};

pub use rpcgate_transport_traits::{Code, Status};
