//! Per-stream work queue and the activation protocol.
//!
//! The queue and the `active` flag live under one lock. Pushing tests and
//! sets the flag in the same critical section, and the worker clears it only
//! after seeing the queue empty under that lock, so a stream never has two
//! workers and never strands a request.

use std::collections::VecDeque;

use crate::error::SubmitError;
use crate::processor::Processor;
use crate::request::Request;

/// Result of pushing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    /// The caller must schedule a worker for this stream
    Schedule,
    /// A worker is already draining this stream
    Active,
}

pub(crate) struct WorkQueue<P: Processor> {
    requests: VecDeque<Request<P>>,
    active: bool,
}

impl<P: Processor> WorkQueue<P> {
    pub(crate) fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            active: false,
        }
    }

    /// Append a request and claim activation if nobody holds it.
    ///
    /// On allocation failure the request is dropped, releasing its pin.
    pub(crate) fn push(&mut self, request: Request<P>) -> Result<Activation, SubmitError> {
        if self.requests.try_reserve(1).is_err() {
            return Err(SubmitError::OutOfMemory);
        }
        self.requests.push_back(request);

        if self.active {
            Ok(Activation::Active)
        } else {
            self.active = true;
            Ok(Activation::Schedule)
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Request<P>> {
        self.requests.pop_front()
    }

    /// Give up activation if there is nothing left to do.
    ///
    /// Returns false when work raced in and the worker must keep going.
    pub(crate) fn try_retire(&mut self) -> bool {
        if self.requests.is_empty() {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Take every queued request and drop activation.
    ///
    /// Used when no worker could be scheduled.
    pub(crate) fn abandon(&mut self) -> VecDeque<Request<P>> {
        self.active = false;
        std::mem::take(&mut self.requests)
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }
}
