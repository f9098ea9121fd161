// Worker pool - threads that run stream drain jobs
//
// Each worker owns a command channel and runs jobs in the order they were
// sent. Jobs are handed out round-robin; per-stream serialization comes from
// the stream's activation flag, not from the pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::PoolError;

/// Unit of work handed to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The pool refused a job because it is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Worker pool is shut down")]
pub struct Rejected;

/// Somewhere to run blocking work off the callback context.
pub trait WorkerPool: Send + Sync + 'static {
    /// Queue `job` on some worker thread.
    fn spawn(&self, job: Job) -> Result<(), Rejected>;

    /// Stop accepting jobs. Jobs already queued still run.
    ///
    /// Must not block: it is called from the callback context.
    fn shutdown(&self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Commands sent to a worker thread
enum WorkerCommand {
    /// Run a job
    Run(Job),
    /// Close the channel; the worker exits once it has run what is buffered
    Shutdown,
}

/// Handle to a worker thread
struct WorkerHandle {
    id: usize,
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    fn send(&self, cmd: WorkerCommand) -> Result<(), Rejected> {
        self.command_tx.send(cmd).map_err(|_| Rejected)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Thread Pool
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed set of named OS threads.
pub struct ThreadPool {
    workers: Vec<WorkerHandle>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl ThreadPool {
    /// Start `size` workers named `{name}-worker-{id}`.
    pub fn new(name: &str, size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::Empty);
        }

        let workers = (0..size)
            .map(|id| spawn_worker(name, id))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("[pool:{}] Started {} workers", name, size);

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit.
    ///
    /// A worker thread calling this skips joining itself.
    fn join(&self) {
        let current = thread::current().id();
        for worker in &self.workers {
            let Some(handle) = worker.thread_handle.lock().take() else {
                continue;
            };
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("[pool] Worker {} panicked", worker.id);
            }
        }
    }
}

impl WorkerPool for ThreadPool {
    fn spawn(&self, job: Job) -> Result<(), Rejected> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Rejected);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index].send(WorkerCommand::Run(job))
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("[pool] Shutting down {} workers", self.workers.len());
        for worker in &self.workers {
            let _ = worker.send(WorkerCommand::Shutdown);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

fn spawn_worker(name: &str, id: usize) -> Result<WorkerHandle, PoolError> {
    let (command_tx, command_rx) = mpsc::unbounded_channel::<WorkerCommand>();

    let thread_handle = thread::Builder::new()
        .name(format!("{}-worker-{}", name, id))
        .spawn(move || run_worker(id, command_rx))?;

    Ok(WorkerHandle {
        id,
        command_tx,
        thread_handle: Mutex::new(Some(thread_handle)),
    })
}

fn run_worker(id: usize, mut command_rx: mpsc::UnboundedReceiver<WorkerCommand>) {
    tracing::debug!("[pool] Worker {} started", id);

    while let Some(cmd) = command_rx.blocking_recv() {
        match cmd {
            WorkerCommand::Run(job) => job(),
            // Later sends fail; a job that slipped in before this still runs.
            WorkerCommand::Shutdown => command_rx.close(),
        }
    }

    tracing::debug!("[pool] Worker {} finished", id);
}
