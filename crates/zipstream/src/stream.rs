//! Stream handle.
//!
//! A [`Stream`] binds one processor to a runtime. Operations are queued and
//! return immediately; their callbacks run later on the runtime's
//! [`Dispatcher`](crate::Dispatcher), in submission order.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::blob::Blob;
use crate::error::{StreamError, SubmitError};
use crate::liveness::LivenessPin;
use crate::machine::Core;
use crate::pool::Rejected;
use crate::processor::Processor;
use crate::queue::{Activation, WorkQueue};
use crate::request::{Callback, Kind, Request};
use crate::runtime::Shared;
use crate::state::State;

/// State shared between a stream's handle, its queued requests and the
/// worker draining it.
pub(crate) struct Inner<P: Processor> {
    pub(crate) id: u64,
    pub(crate) shared: Arc<Shared>,
    pub(crate) queue: Mutex<WorkQueue<P>>,
    pub(crate) core: Mutex<Core<P>>,
    /// Mirror of `core.state` readable without the core lock
    state: AtomicU8,
    /// Requests submitted whose callback has not run yet
    pub(crate) pins: AtomicUsize,
}

impl<P: Processor> Inner<P> {
    pub(crate) fn new(id: u64, shared: Arc<Shared>, core: Core<P>) -> Self {
        let state = AtomicU8::new(core.state as u8);
        Self {
            id,
            shared,
            queue: Mutex::new(WorkQueue::new()),
            core: Mutex::new(core),
            state,
            pins: AtomicUsize::new(0),
        }
    }

    pub(crate) fn publish_state(&self, state: State) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn push_request(&self, request: Request<P>) -> Result<Activation, SubmitError> {
        let mut queue = self.queue.lock();
        let activation = queue.push(request)?;
        tracing::trace!(
            "[stream:{}#{}] Queued, depth {} ({:?})",
            P::NAME,
            self.id,
            queue.len(),
            activation
        );
        Ok(activation)
    }

    fn schedule(self: &Arc<Self>) -> Result<(), Rejected> {
        let stream = Arc::clone(self);
        self.shared.pool.spawn(Box::new(move || stream.run_worker()))
    }

    /// Unwind an activation no worker could pick up.
    ///
    /// The activating request is always at the front: the flag was clear, so
    /// the queue was empty when it was pushed. It is dropped (the caller gets
    /// the error synchronously); anything queued behind it completes with
    /// `ShutDown`.
    fn abandon_activation(&self) {
        let mut abandoned = self.queue.lock().abandon().into_iter();
        drop(abandoned.next());

        for mut request in abandoned {
            request.complete(Err(StreamError::ShutDown), Blob::new());
            self.shared.channel.push(Box::new(request));
        }
    }
}

impl<P: Processor> Drop for Inner<P> {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if core.state != State::Destroyed {
            tracing::debug!("[stream:{}#{}] Finalized while {}", P::NAME, self.id, core.state);
        }
        core.destroy();
    }
}

/// Handle to one streaming session.
///
/// Dropping the handle finalizes the stream once every outstanding request
/// has had its callback run.
pub struct Stream<P: Processor> {
    inner: Arc<Inner<P>>,
}

impl<P: Processor> Stream<P> {
    pub(crate) fn new(inner: Inner<P>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Queue a write of `data`.
    ///
    /// The bytes are snapshotted before this returns; the callback receives
    /// the output this write produced.
    pub fn write(
        &self,
        data: impl Into<Bytes>,
        callback: Option<Callback<P::Error>>,
    ) -> Result<(), SubmitError> {
        self.submit(Kind::Write(data.into()), callback)
    }

    /// Queue a close: flush remaining output, then tear the processor down.
    pub fn close(&self, callback: Option<Callback<P::Error>>) -> Result<(), SubmitError> {
        self.submit(Kind::Close, callback)
    }

    /// Queue an unconditional teardown. No callback.
    pub fn destroy(&self) -> Result<(), SubmitError> {
        self.submit(Kind::Destroy, None)
    }

    /// State as of the last completed operation.
    pub fn state(&self) -> State {
        State::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Requests submitted on this stream whose callback has not run yet.
    pub fn pending(&self) -> usize {
        self.inner.pins.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    fn submit(&self, kind: Kind, callback: Option<Callback<P::Error>>) -> Result<(), SubmitError> {
        if self.inner.shared.channel.is_closed() {
            tracing::warn!(
                "[stream:{}#{}] Rejected {} after shutdown",
                P::NAME,
                self.inner.id,
                kind.label()
            );
            return Err(SubmitError::Rejected);
        }

        let request = Request::new(kind, LivenessPin::new(&self.inner), callback);
        if self.inner.push_request(request)? == Activation::Active {
            return Ok(());
        }

        if self.inner.schedule().is_err() {
            tracing::warn!("[stream:{}#{}] No worker available", P::NAME, self.inner.id);
            self.inner.abandon_activation();
            return Err(SubmitError::Rejected);
        }
        Ok(())
    }
}

impl<P: Processor> std::fmt::Debug for Stream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("processor", &P::NAME)
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}
