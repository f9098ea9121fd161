//! Completion channel and the dispatcher that drains it.
//!
//! Workers never run user callbacks. They push finished requests onto the
//! [`CompletionChannel`] and wake the [`Dispatcher`], which runs callbacks
//! one at a time on whatever context owns it.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A finished request waiting for its callback.
///
/// Dropping the completion releases the stream pin it carries.
pub(crate) trait Completion: Send + 'static {
    /// Run the callback, if any. Called at most once.
    fn deliver(&mut self);

    /// `name#id kind` of the owning stream and operation, for fault reports.
    fn origin(&self) -> String;
}

/// Ordered queue of completed requests shared by every stream of a runtime.
pub(crate) struct CompletionChannel {
    queue: Mutex<VecDeque<Box<dyn Completion>>>,
    notify: Notify,
    /// Requests submitted whose callback has not run yet
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl CompletionChannel {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a finished request and wake the dispatcher.
    pub(crate) fn push(&self, completion: Box<dyn Completion>) {
        self.queue.lock().push_back(completion);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Box<dyn Completion>> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn expect_one(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// Release one request. Wakes the dispatcher when the last one goes, since
    /// a request dropped without completing (a rejected activation) never
    /// passes through `push`.
    pub(crate) fn settle_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_one();
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Faults
// ─────────────────────────────────────────────────────────────────────────────

/// A callback that panicked while being delivered.
#[derive(Debug, Clone)]
pub struct Fault {
    /// `name#id kind` of the request whose callback failed
    pub origin: String,
    pub message: String,
}

/// Top-level sink for callback faults.
pub type FaultHandler = Arc<dyn Fn(Fault) + Send + Sync>;

fn log_fault(fault: Fault) {
    tracing::error!("[dispatcher] Callback for {} panicked: {}", fault.origin, fault.message);
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// The single callback context of a runtime.
///
/// Not `Clone`: exactly one dispatcher drains a runtime's completions.
pub struct Dispatcher {
    channel: Arc<CompletionChannel>,
    on_fault: FaultHandler,
}

impl Dispatcher {
    pub(crate) fn new(channel: Arc<CompletionChannel>) -> Self {
        Self {
            channel,
            on_fault: Arc::new(log_fault),
        }
    }

    /// Replace the default fault handler, which logs through `tracing`.
    pub fn with_fault_handler(mut self, handler: impl Fn(Fault) + Send + Sync + 'static) -> Self {
        self.on_fault = Arc::new(handler);
        self
    }

    /// Run every completed request's callback in arrival order.
    ///
    /// Returns how many completions were delivered. Never blocks on workers.
    pub fn drain(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(mut completion) = self.channel.pop() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| completion.deliver()));
            if let Err(payload) = result {
                (self.on_fault)(Fault {
                    origin: completion.origin(),
                    message: panic_message(payload.as_ref()),
                });
            }
            // Releases the stream pin.
            drop(completion);
            delivered += 1;
        }
        delivered
    }

    /// Wait for a wakeup from a worker, then drain.
    pub async fn wait(&mut self) -> usize {
        self.channel.notify.notified().await;
        self.drain()
    }

    /// Drain until every submitted request has had its callback run.
    pub async fn settle(&mut self) {
        loop {
            self.drain();
            if self.channel.in_flight() == 0 {
                return;
            }
            self.channel.notify.notified().await;
        }
    }

    /// Requests submitted but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.channel.in_flight()
    }

    /// Deliver completions until the runtime shuts down and nothing is left
    /// in flight.
    pub async fn run(mut self) {
        tracing::debug!("[dispatcher] Started");
        loop {
            self.drain();
            if self.channel.is_closed() && self.channel.in_flight() == 0 {
                break;
            }
            self.channel.notify.notified().await;
        }
        tracing::debug!("[dispatcher] Finished");
    }
}
