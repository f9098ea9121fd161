//! Runtime: the worker pool and completion channel shared by a set of
//! streams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::completion::{CompletionChannel, Dispatcher};
use crate::config::EngineConfig;
use crate::error::{OpenError, PoolError};
use crate::machine::Core;
use crate::pool::{ThreadPool, WorkerPool};
use crate::processor::Processor;
use crate::stream::{Inner, Stream};

pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) channel: Arc<CompletionChannel>,
    pub(crate) pool: Arc<dyn WorkerPool>,
    next_id: AtomicU64,
}

/// Cloneable handle for opening streams.
///
/// Created together with the runtime's single [`Dispatcher`].
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Start a runtime backed by a [`ThreadPool`] sized from `config`.
    pub fn new(config: EngineConfig) -> Result<(Self, Dispatcher), PoolError> {
        let pool = ThreadPool::new(&config.name, config.workers)?;
        Ok(Self::with_pool(config, Arc::new(pool)))
    }

    /// Build a runtime on an existing pool.
    pub fn with_pool(config: EngineConfig, pool: Arc<dyn WorkerPool>) -> (Self, Dispatcher) {
        let channel = Arc::new(CompletionChannel::new());
        let dispatcher = Dispatcher::new(Arc::clone(&channel));
        let shared = Arc::new(Shared {
            config,
            channel,
            pool,
            next_id: AtomicU64::new(1),
        });
        (Self { shared }, dispatcher)
    }

    /// Open a stream over `processor`.
    ///
    /// `init` runs here, on the caller's thread; its failure is returned
    /// directly rather than through a callback.
    pub fn open<P: Processor>(&self, processor: P) -> Result<Stream<P>, OpenError<P::Error>> {
        if self.shared.channel.is_closed() {
            return Err(OpenError::ShutDown);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut core = Core::new(processor);
        if let Err(e) = core.init() {
            tracing::warn!("[runtime] Failed to open {}#{}: {}", P::NAME, id, e);
            return Err(OpenError::Init(e));
        }

        tracing::debug!("[runtime] Opened {}#{}", P::NAME, id);
        Ok(Stream::new(Inner::new(id, Arc::clone(&self.shared), core)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Requests submitted on any stream whose callback has not run yet.
    pub fn in_flight(&self) -> usize {
        self.shared.channel.in_flight()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.channel.is_closed()
    }

    /// Stop accepting requests. Does not block.
    ///
    /// Queued work still runs and its callbacks are still delivered by the
    /// dispatcher, whose `run` returns once nothing is left in flight. Worker
    /// threads are joined when the last reference to the pool is dropped.
    pub fn shutdown(&self) {
        if self.shared.channel.is_closed() {
            return;
        }
        tracing::debug!("[runtime] Shutting down, {} in flight", self.in_flight());
        self.shared.channel.close();
        self.shared.pool.shutdown();
    }
}
