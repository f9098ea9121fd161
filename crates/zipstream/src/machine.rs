//! Stream state machine.
//!
//! `Core` owns the processor and its lifecycle state. It is only ever
//! touched by the worker currently draining the stream, or by the final
//! owner on teardown.

use crate::blob::Blob;
use crate::config::EngineConfig;
use crate::error::StreamError;
use crate::processor::{Flow, Processor};
use crate::state::{State, Transition};

pub(crate) type Status<P> = Result<(), StreamError<<P as Processor>::Error>>;

pub(crate) struct Core<P: Processor> {
    pub(crate) state: State,
    processor: P,
    initialized: bool,
}

impl<P: Processor> Core<P> {
    pub(crate) fn new(processor: P) -> Self {
        Self {
            state: State::Idle,
            processor,
            initialized: false,
        }
    }

    /// Run the processor's `init`, moving to `Data` or `Error`.
    pub(crate) fn init(&mut self) -> Result<(), P::Error> {
        let t = Transition::new(&mut self.state, State::Error);
        self.processor.init()?;
        self.initialized = true;
        t.commit(State::Data);
        Ok(())
    }

    /// Feed `input` through the processor.
    pub(crate) fn write(&mut self, input: &[u8], out: &mut Blob, config: &EngineConfig) -> Status<P> {
        if self.state != State::Data {
            return Err(StreamError::Sequence);
        }

        let t = Transition::new(&mut self.state, State::Error);
        let mut remaining = input;
        while !remaining.is_empty() {
            out.grow_by(remaining.len().saturating_add(config.write_slack))
                .map_err(|e| {
                    tracing::warn!("[stream:{}] Write growth failed: {}", P::NAME, e);
                    StreamError::Memory
                })?;

            let produced_before = out.len();
            let step = self
                .processor
                .write(remaining, out)
                .map_err(StreamError::Processor)?;
            remaining = &remaining[step.consumed.min(remaining.len())..];

            if step.flow == Flow::EndOfStream {
                t.commit(State::Eos);
                return Ok(());
            }
            if step.consumed == 0 && out.len() == produced_before {
                return Err(StreamError::Stalled);
            }
        }

        // Input exhausted without end of stream: still in Data.
        t.abort();
        Ok(())
    }

    /// Finalize and tear down.
    ///
    /// Teardown happens whatever `finish` reports; the returned status only
    /// reflects the flush.
    pub(crate) fn close(&mut self, out: &mut Blob, config: &EngineConfig) -> Status<P> {
        if self.state.is_idle() {
            return Ok(());
        }

        let result = if self.state == State::Data {
            self.finish(out, config)
        } else {
            Ok(())
        };

        self.destroy();
        result
    }

    fn finish(&mut self, out: &mut Blob, config: &EngineConfig) -> Status<P> {
        let t = Transition::new(&mut self.state, State::Error);
        loop {
            out.grow_by(config.finish_chunk).map_err(|e| {
                tracing::warn!("[stream:{}] Finish growth failed: {}", P::NAME, e);
                StreamError::Memory
            })?;

            let produced_before = out.len();
            let flow = self
                .processor
                .finish(out)
                .map_err(StreamError::Processor)?;
            if flow == Flow::EndOfStream {
                break;
            }
            if out.len() == produced_before {
                return Err(StreamError::Stalled);
            }
        }
        t.commit(State::Eos);
        Ok(())
    }

    /// Tear the processor down. Safe to call any number of times.
    pub(crate) fn destroy(&mut self) {
        if self.initialized {
            self.initialized = false;
            self.processor.destroy();
        }
        self.state = State::Destroyed;
    }

    /// Drop the processor without calling into it again.
    pub(crate) fn abandon(&mut self) {
        self.initialized = false;
        self.state = State::Destroyed;
    }
}
