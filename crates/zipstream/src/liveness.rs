//! Liveness pinning.
//!
//! Every outstanding request holds a [`LivenessPin`] on its stream. The pin
//! owns a strong reference, so the stream cannot be finalized until the last
//! request's callback has run and its pin dropped.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::processor::Processor;
use crate::stream::Inner;

pub(crate) struct LivenessPin<P: Processor> {
    stream: Arc<Inner<P>>,
}

impl<P: Processor> LivenessPin<P> {
    pub(crate) fn new(stream: &Arc<Inner<P>>) -> Self {
        stream.pins.fetch_add(1, Ordering::SeqCst);
        stream.shared.channel.expect_one();
        Self {
            stream: Arc::clone(stream),
        }
    }

    pub(crate) fn stream(&self) -> &Arc<Inner<P>> {
        &self.stream
    }
}

impl<P: Processor> Drop for LivenessPin<P> {
    fn drop(&mut self) {
        self.stream.pins.fetch_sub(1, Ordering::SeqCst);
        self.stream.shared.channel.settle_one();
    }
}
