//! Worker execution loop.
//!
//! One drain job runs per activation. It pops requests one at a time (the
//! queue lock is never held while the processor runs), executes them against
//! the stream's state machine and publishes each onto the completion channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::blob::Blob;
use crate::completion::panic_message;
use crate::error::StreamError;
use crate::processor::Processor;
use crate::request::{Kind, Request};
use crate::stream::Inner;

impl<P: Processor> Inner<P> {
    /// Drain this stream's queue until it is observed empty.
    pub(crate) fn run_worker(self: &Arc<Self>) {
        tracing::trace!("[worker:{}#{}] Activated", P::NAME, self.id);

        loop {
            while let Some(request) = self.pop_request() {
                let request = self.execute(request);
                self.shared.channel.push(Box::new(request));
            }

            // Emptiness check and flag clear share one critical section; a
            // push that lands before this sees the flag still set.
            if self.queue.lock().try_retire() {
                break;
            }
        }

        tracing::trace!("[worker:{}#{}] Retired", P::NAME, self.id);
    }

    fn pop_request(&self) -> Option<Request<P>> {
        self.queue.lock().pop()
    }

    fn execute(&self, mut request: Request<P>) -> Request<P> {
        let config = &self.shared.config;
        let mut output = Blob::with_limit(config.max_output_bytes);

        let mut core = self.core.lock();
        let result = panic::catch_unwind(AssertUnwindSafe(|| match request.kind() {
            Kind::Write(data) => core.write(data, &mut output, config),
            Kind::Close => core.close(&mut output, config),
            Kind::Destroy => {
                core.destroy();
                Ok(())
            }
        }));

        let status = match result {
            Ok(status) => status,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    "[worker:{}#{}] Processor panicked during {}: {}",
                    P::NAME,
                    self.id,
                    request.kind().label(),
                    message
                );
                // A write leaves Error behind through its transition guard;
                // a panicking teardown must not be retried.
                if !matches!(request.kind(), Kind::Write(_)) {
                    core.abandon();
                }
                Err(StreamError::Panicked(message))
            }
        };
        self.publish_state(core.state);
        drop(core);

        if let Err(e) = &status {
            tracing::debug!(
                "[worker:{}#{}] {} failed: {}",
                P::NAME,
                self.id,
                request.kind().label(),
                e
            );
        }

        request.complete(status, output);
        request
    }
}
