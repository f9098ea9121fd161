//! Requests queued against a stream.
//!
//! A request is built on the caller's thread, run on a worker, and handed
//! back to the dispatcher for its callback.

use std::sync::Arc;

use bytes::Bytes;

use crate::blob::Blob;
use crate::completion::Completion;
use crate::error::StreamError;
use crate::liveness::LivenessPin;
use crate::machine::Status;
use crate::processor::Processor;
use crate::stream::Inner;

/// Completion callback: `(error, output)`.
///
/// `output` holds only the bytes this operation produced.
pub type Callback<E> = Box<dyn FnOnce(Option<StreamError<E>>, Vec<u8>) + Send + 'static>;

/// Box a closure as a [`Callback`].
pub fn callback<E, F>(f: F) -> Option<Callback<E>>
where
    F: FnOnce(Option<StreamError<E>>, Vec<u8>) + Send + 'static,
{
    Some(Box::new(f))
}

/// What a request asks the stream to do.
pub(crate) enum Kind {
    /// Feed an immutable snapshot of the caller's bytes
    Write(Bytes),
    Close,
    Destroy,
}

impl Kind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Kind::Write(_) => "write",
            Kind::Close => "close",
            Kind::Destroy => "destroy",
        }
    }
}

pub(crate) struct Request<P: Processor> {
    kind: Kind,
    pin: LivenessPin<P>,
    callback: Option<Callback<P::Error>>,
    output: Blob,
    status: Status<P>,
}

impl<P: Processor> Request<P> {
    pub(crate) fn new(kind: Kind, pin: LivenessPin<P>, callback: Option<Callback<P::Error>>) -> Self {
        Self {
            kind,
            pin,
            callback,
            output: Blob::new(),
            status: Ok(()),
        }
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.kind
    }

    pub(crate) fn stream(&self) -> &Arc<Inner<P>> {
        self.pin.stream()
    }

    /// Record the worker's result.
    pub(crate) fn complete(&mut self, status: Status<P>, output: Blob) {
        self.status = status;
        self.output = output;
    }
}

impl<P: Processor> Completion for Request<P> {
    fn deliver(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let error = std::mem::replace(&mut self.status, Ok(())).err();
        let output = std::mem::take(&mut self.output).into_vec();
        callback(error, output);
    }

    fn origin(&self) -> String {
        format!("{}#{} {}", P::NAME, self.stream().id, self.kind.label())
    }
}
