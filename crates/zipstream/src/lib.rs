//! zipstream
//!
//! Turns a synchronous, stateful, chunked transform (a compressor or
//! decompressor) into a stream with non-blocking `write`, `close` and
//! `destroy` operations.
//!
//! # Architecture
//!
//! - Each operation becomes a request on its stream's queue
//! - At most one worker thread drains a given stream at a time, so the
//!   processor is never touched concurrently
//! - Finished requests go onto one completion channel per runtime
//! - The runtime's single [`Dispatcher`] runs callbacks in submission order
//! - Outstanding requests pin their stream; it is finalized only after the
//!   last callback has run

mod blob;
mod completion;
mod config;
mod error;
mod liveness;
mod machine;
mod pool;
mod processor;
mod queue;
mod request;
mod runtime;
mod state;
mod stream;
mod worker;

pub mod codec;

pub use blob::{Blob, GrowError};
pub use completion::{Dispatcher, Fault, FaultHandler};
pub use config::EngineConfig;
pub use error::{ConfigError, OpenError, PoolError, StreamError, SubmitError};
pub use pool::{Job, Rejected, ThreadPool, WorkerPool};
pub use processor::{Flow, Processor, Step};
pub use request::{Callback, callback};
pub use runtime::Runtime;
pub use state::State;
pub use stream::Stream;
