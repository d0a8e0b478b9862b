//! Tracer hooks and the per-call start/finish bracket
//!
//! A [`TracerController`] holds the registered [`Tracer`]s. Every stream task
//! owns one [`TracerBracket`], which guarantees the finish hooks run exactly
//! once for the call, including when the task is dropped mid-flight.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{Span, error, field, info, info_span};

use crate::context::RpcContext;
use crate::error::RpcError;
use crate::rpcinfo::{FaultPayload, RpcInfo, StatsEvent};

/// Start and finish hooks around one call.
///
/// Hooks are synchronous and should return quickly; they run on the stream's
/// task. The call state is available through [`RpcContext::rpc_info`].
pub trait Tracer: Send + Sync {
    /// Called once the metadata handshake has succeeded
    fn start(&self, ctx: RpcContext) -> RpcContext;

    /// Called exactly once when the call ends, however it ended
    fn finish(&self, ctx: &RpcContext);

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Ordered set of tracers.
///
/// Tracers start in registration order and finish in reverse order. A
/// panicking tracer is logged and skipped; the remaining tracers still run.
#[derive(Clone, Default)]
pub struct TracerController {
    tracers: Vec<Arc<dyn Tracer>>,
}

impl std::fmt::Debug for TracerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tracers.iter().map(|t| t.name()))
            .finish()
    }
}

impl TracerController {
    /// Create an empty controller
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tracer
    pub fn append(&mut self, tracer: Arc<dyn Tracer>) {
        self.tracers.push(tracer);
    }

    /// Whether any tracer is registered
    #[must_use]
    pub fn has_tracers(&self) -> bool {
        !self.tracers.is_empty()
    }

    /// Record `RpcStart` and run every start hook in order
    pub fn do_start(&self, mut ctx: RpcContext, info: &RpcInfo) -> RpcContext {
        info.stats().record(StatsEvent::RpcStart);
        for tracer in &self.tracers {
            let input = ctx.clone();
            match catch_unwind(AssertUnwindSafe(|| tracer.start(input))) {
                Ok(next) => ctx = next,
                Err(panic) => log_tracer_panic(tracer.name(), "start", panic.as_ref()),
            }
        }
        ctx
    }

    /// Record `RpcFinish` and the error, then run every finish hook in reverse
    pub fn do_finish(&self, ctx: &RpcContext, info: &RpcInfo, err: Option<Arc<RpcError>>) {
        info.stats().record(StatsEvent::RpcFinish);
        if let Some(err) = err {
            info.stats().set_error(err);
        }
        for tracer in self.tracers.iter().rev() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| tracer.finish(ctx))) {
                log_tracer_panic(tracer.name(), "finish", panic.as_ref());
            }
        }
    }
}

fn log_tracer_panic(name: &str, hook: &str, panic: &(dyn std::any::Any + Send)) {
    let payload = FaultPayload::from_panic(panic, String::new());
    error!(
        target: "rpcgate::server",
        tracer = name,
        hook,
        panic = %payload.message,
        "tracer panicked"
    );
}

/// Start/finish scope of one call.
///
/// [`TracerBracket::finish`] consumes the bracket. A bracket dropped without
/// being finished finishes itself with an internal error, so the finish
/// hooks run exactly once on every exit path.
pub struct TracerBracket {
    controller: Option<Arc<TracerController>>,
    info: Arc<RpcInfo>,
    ctx: RpcContext,
    finished: bool,
}

impl std::fmt::Debug for TracerBracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerBracket")
            .field("controller", &self.controller)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl TracerBracket {
    /// Open a bracket for the call described by `info`.
    ///
    /// A missing controller turns start and finish into stats-only operations.
    #[must_use]
    pub fn new(controller: Option<Arc<TracerController>>, info: Arc<RpcInfo>, ctx: RpcContext) -> Self {
        Self {
            controller,
            info,
            ctx,
            finished: false,
        }
    }

    /// Run the start hooks and return the context they produced
    pub fn start(&mut self, ctx: RpcContext) -> RpcContext {
        let ctx = match &self.controller {
            Some(controller) => controller.do_start(ctx, &self.info),
            None => ctx,
        };
        self.ctx = ctx.clone();
        ctx
    }

    /// Run the finish hooks with the terminal error and fault payload, then
    /// reset the call's stats.
    pub fn finish(mut self, err: Option<Arc<RpcError>>, fault: Option<FaultPayload>) {
        self.finish_once(err, fault);
    }

    fn finish_once(&mut self, err: Option<Arc<RpcError>>, fault: Option<FaultPayload>) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(fault) = fault {
            self.info.stats().set_panicked(fault);
        }
        if let Some(controller) = &self.controller {
            controller.do_finish(&self.ctx, &self.info, err);
        }
        self.info.stats().reset();
    }
}

impl Drop for TracerBracket {
    fn drop(&mut self) {
        if !self.finished {
            self.finish_once(
                Some(Arc::new(RpcError::internal(
                    "stream task ended before the call completed",
                ))),
                None,
            );
        }
    }
}

/// Span opened by [`LogTracer`] and carried in the call context.
#[derive(Debug, Clone)]
pub struct CallSpan(pub Span);

/// Built-in tracer that logs every call through `tracing`.
///
/// Opens an `rpc.call` span on start and emits one completion event inside
/// it on finish, with the method triple, duration and error.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn start(&self, mut ctx: RpcContext) -> RpcContext {
        let remote = ctx
            .rpc_info()
            .and_then(|info| info.from().address())
            .map(|addr| addr.to_string());
        let span = info_span!(
            target: "rpcgate::server",
            "rpc.call",
            rpc.remote = remote.as_deref().unwrap_or("unknown"),
            rpc.package = field::Empty,
            rpc.service = field::Empty,
            rpc.method = field::Empty,
        );
        ctx.insert(CallSpan(span));
        ctx
    }

    fn finish(&self, ctx: &RpcContext) {
        let Some(info) = ctx.rpc_info() else {
            return;
        };
        let span = ctx
            .get::<CallSpan>()
            .map_or_else(Span::none, |s| s.0.clone());

        let invocation = info.invocation();
        span.record("rpc.package", invocation.package_name());
        span.record("rpc.service", invocation.service_name());
        span.record("rpc.method", invocation.method_name());

        let stats = info.stats();
        let duration_ms = stats.rpc_duration().map_or(0, |d| d.as_millis());
        let error = stats.error().map(|e| e.to_string());
        let panicked = stats.panicked().map(|p| p.message);

        span.in_scope(|| {
            info!(
                target: "rpcgate::server",
                package = invocation.package_name(),
                service = invocation.service_name(),
                method = invocation.method_name(),
                duration_ms,
                recv_bytes = stats.recv_size(),
                send_bytes = stats.send_size(),
                error = error.as_deref(),
                panic = panicked.as_deref(),
                "rpc finished"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        panic_on_finish: bool,
    }

    impl Tracer for Recorder {
        fn start(&self, ctx: RpcContext) -> RpcContext {
            self.log.lock().push(format!("start {}", self.label));
            ctx
        }

        fn finish(&self, ctx: &RpcContext) {
            let err = ctx
                .rpc_info()
                .and_then(|i| i.stats().error())
                .map(|e| e.to_string());
            self.log
                .lock()
                .push(format!("finish {} {:?}", self.label, err));
            if self.panic_on_finish {
                panic!("tracer bug");
            }
        }
    }

    fn setup(panic_label: Option<&'static str>) -> (Arc<TracerController>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = TracerController::new();
        for label in ["a", "b"] {
            controller.append(Arc::new(Recorder {
                label,
                log: Arc::clone(&log),
                panic_on_finish: panic_label == Some(label),
            }));
        }
        (Arc::new(controller), log)
    }

    fn call_state() -> (Arc<RpcInfo>, RpcContext) {
        let info = Arc::new(RpcInfo::default());
        let ctx = RpcContext::new().with_rpc_info(Arc::clone(&info));
        (info, ctx)
    }

    #[test]
    fn test_start_in_order_finish_in_reverse() {
        let (controller, log) = setup(None);
        let (info, ctx) = call_state();

        let mut bracket = TracerBracket::new(Some(controller), Arc::clone(&info), ctx.clone());
        bracket.start(ctx);
        bracket.finish(None, None);

        assert_eq!(
            *log.lock(),
            ["start a", "start b", "finish b None", "finish a None"]
        );
        assert!(info.stats().is_empty());
    }

    #[test]
    fn test_finish_sees_error_and_panic_payload() {
        let seen = Arc::new(Mutex::new(None));
        struct PanicProbe(Arc<Mutex<Option<FaultPayload>>>);
        impl Tracer for PanicProbe {
            fn start(&self, ctx: RpcContext) -> RpcContext {
                ctx
            }
            fn finish(&self, ctx: &RpcContext) {
                *self.0.lock() = ctx.rpc_info().and_then(|i| i.stats().panicked());
            }
        }
        let mut controller = TracerController::new();
        controller.append(Arc::new(PanicProbe(Arc::clone(&seen))));

        let (info, ctx) = call_state();
        let bracket = TracerBracket::new(Some(Arc::new(controller)), info, ctx);
        bracket.finish(
            None,
            Some(FaultPayload {
                message: "boom".into(),
                backtrace: String::new(),
            }),
        );

        assert_eq!(seen.lock().as_ref().map(|p| p.message.as_str()), Some("boom"));
    }

    #[test]
    fn test_panicking_tracer_does_not_stop_siblings() {
        let (controller, log) = setup(Some("b"));
        let (info, ctx) = call_state();

        let bracket = TracerBracket::new(Some(controller), info, ctx);
        bracket.finish(Some(Arc::new(RpcError::internal("x"))), None);

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert!(log[1].starts_with("finish a"));
        assert!(log[1].contains("internal error: x"));
    }

    #[test]
    fn test_dropped_bracket_finishes_once() {
        let (controller, log) = setup(None);
        let (info, ctx) = call_state();

        drop(TracerBracket::new(Some(controller), info, ctx));

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert!(log[0].contains("stream task ended"));
    }

    #[test]
    fn test_absent_controller_is_noop() {
        let (info, ctx) = call_state();
        info.stats().add_recv_size(5);

        let mut bracket = TracerBracket::new(None, Arc::clone(&info), ctx.clone());
        let out = bracket.start(ctx);
        assert!(out.rpc_info().is_some());
        bracket.finish(None, None);
        assert!(info.stats().is_empty());
    }

    #[test]
    fn test_log_tracer_tolerates_missing_span() {
        let (info, ctx) = call_state();
        let controller = {
            let mut c = TracerController::new();
            c.append(Arc::new(LogTracer));
            Arc::new(c)
        };
        TracerBracket::new(Some(controller), info, ctx).finish(None, None);
    }
}
