//! Error types for the streaming engine.

/// Errors delivered to a request's callback.
///
/// `E` is the processor's own error type.
#[derive(Debug, thiserror::Error)]
pub enum StreamError<E> {
    #[error("Operation not permitted in the current stream state")]
    Sequence,

    #[error("Insufficient space")]
    Memory,

    #[error("Processor made no progress")]
    Stalled,

    #[error("Processor panicked: {0}")]
    Panicked(String),

    #[error("Runtime shut down before the request ran")]
    ShutDown,

    #[error("{0}")]
    Processor(E),
}

impl<E> StreamError<E> {
    /// True for errors raised by the engine rather than the processor.
    pub fn is_engine(&self) -> bool {
        !matches!(self, StreamError::Processor(_))
    }
}

/// Errors returned synchronously when queueing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Runtime is not accepting requests")]
    Rejected,

    #[error("Insufficient space")]
    OutOfMemory,
}

/// Errors returned when opening a stream.
#[derive(Debug, thiserror::Error)]
pub enum OpenError<E> {
    #[error("Processor initialization failed: {0}")]
    Init(E),

    #[error("Runtime has shut down")]
    ShutDown,
}

/// Errors that can occur while starting a worker pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool needs at least one thread")]
    Empty,

    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Errors that can occur while loading engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
