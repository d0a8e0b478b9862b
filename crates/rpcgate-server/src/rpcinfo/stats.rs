//! Per-call statistics

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::RpcError;

/// Points in a call's lifetime that are timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsEvent {
    /// Tracers started
    RpcStart,
    /// Tracers finished
    RpcFinish,
    /// A message read began
    ReadStart,
    /// A message read completed
    ReadFinish,
    /// A message write began
    WriteStart,
    /// A message write completed
    WriteFinish,
}

/// Payload captured from a contained panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPayload {
    /// Panic message, or a placeholder for non-string payloads
    pub message: String,
    /// Backtrace captured where the panic was caught
    pub backtrace: String,
}

impl FaultPayload {
    /// Build a payload from a raw panic value
    pub fn from_panic(panic: &(dyn std::any::Any + Send), backtrace: String) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message, backtrace }
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    events: HashMap<StatsEvent, Instant>,
    recv_size: u64,
    send_size: u64,
    error: Option<Arc<RpcError>>,
    panicked: Option<FaultPayload>,
}

/// Timestamps, byte counts and outcome of one call.
///
/// Everything is cleared by [`RpcStats::reset`] before the owning call state
/// goes back to the pool.
#[derive(Debug, Default)]
pub struct RpcStats {
    inner: Mutex<StatsInner>,
}

impl RpcStats {
    /// Timestamp `event` now, replacing any earlier record of it
    pub fn record(&self, event: StatsEvent) {
        self.inner.lock().events.insert(event, Instant::now());
    }

    /// When `event` was recorded
    #[must_use]
    pub fn event_time(&self, event: StatsEvent) -> Option<Instant> {
        self.inner.lock().events.get(&event).copied()
    }

    /// Time from `RpcStart` to `RpcFinish`, once both are recorded
    #[must_use]
    pub fn rpc_duration(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        let start = inner.events.get(&StatsEvent::RpcStart)?;
        let finish = inner.events.get(&StatsEvent::RpcFinish)?;
        Some(finish.saturating_duration_since(*start))
    }

    /// Add to the received payload byte count
    pub fn add_recv_size(&self, n: usize) {
        self.inner.lock().recv_size += n as u64;
    }

    /// Add to the sent payload byte count
    pub fn add_send_size(&self, n: usize) {
        self.inner.lock().send_size += n as u64;
    }

    /// Received payload bytes
    #[must_use]
    pub fn recv_size(&self) -> u64 {
        self.inner.lock().recv_size
    }

    /// Sent payload bytes
    #[must_use]
    pub fn send_size(&self) -> u64 {
        self.inner.lock().send_size
    }

    /// Record the terminal error of the call
    pub fn set_error(&self, err: Arc<RpcError>) {
        self.inner.lock().error = Some(err);
    }

    /// Terminal error of the call, if it failed
    #[must_use]
    pub fn error(&self) -> Option<Arc<RpcError>> {
        self.inner.lock().error.clone()
    }

    /// Record a contained panic
    pub fn set_panicked(&self, payload: FaultPayload) {
        self.inner.lock().panicked = Some(payload);
    }

    /// Payload of a contained panic, if the endpoint panicked
    #[must_use]
    pub fn panicked(&self) -> Option<FaultPayload> {
        self.inner.lock().panicked.clone()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.events.is_empty()
            && inner.recv_size == 0
            && inner.send_size == 0
            && inner.error.is_none()
            && inner.panicked.is_none()
    }

    /// Clear every record
    pub fn reset(&self) {
        *self.inner.lock() = StatsInner::default();
    }
}
