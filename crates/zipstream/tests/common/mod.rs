#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use zipstream::{Blob, Callback, Dispatcher, EngineConfig, Flow, Processor, Runtime, Step, StreamError};

pub const TRAILER: &[u8] = b"<END>";

/// Shared counters a test can inspect after handing the processor to a stream.
#[derive(Default)]
pub struct ScriptedStats {
    pub destroyed: AtomicUsize,
    pub writes: AtomicUsize,
    pub busy: AtomicBool,
    pub overlaps: AtomicUsize,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptedError {
    #[error("init refused")]
    Init,
    #[error("poison byte {0:#04x}")]
    Poison(u8),
}

/// Echoes input and appends [`TRAILER`] on finish.
#[derive(Default)]
pub struct Scripted {
    pub stats: Arc<ScriptedStats>,
    pub fail_init: bool,
    pub poison: Option<u8>,
    pub end_immediately: bool,
    pub delay: Option<Duration>,
    pub panic_on: Option<u8>,
    pub trailer_sent: usize,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<ScriptedStats> {
        Arc::clone(&self.stats)
    }
}

impl Processor for Scripted {
    type Error = ScriptedError;
    const NAME: &'static str = "scripted";

    fn init(&mut self) -> Result<(), ScriptedError> {
        if self.fail_init {
            return Err(ScriptedError::Init);
        }
        Ok(())
    }

    fn write(&mut self, input: &[u8], out: &mut Blob) -> Result<Step, ScriptedError> {
        if self.stats.busy.swap(true, Ordering::SeqCst) {
            self.stats.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let result = if let Some(b) = self.poison.filter(|b| input.contains(b)) {
            Err(ScriptedError::Poison(b))
        } else if self.panic_on.is_some_and(|b| input.contains(&b)) {
            self.stats.busy.store(false, Ordering::SeqCst);
            panic!("scripted processor asked to panic");
        } else {
            let n = out.fill(input);
            if self.end_immediately {
                Ok(Step::end_of_stream(n))
            } else {
                Ok(Step::consumed(n))
            }
        };

        self.stats.busy.store(false, Ordering::SeqCst);
        result
    }

    fn finish(&mut self, out: &mut Blob) -> Result<Flow, ScriptedError> {
        self.trailer_sent += out.fill(&TRAILER[self.trailer_sent..]);
        if self.trailer_sent == TRAILER.len() {
            Ok(Flow::EndOfStream)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn destroy(&mut self) {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// One delivered callback.
pub struct Delivery<E> {
    pub tag: usize,
    pub error: Option<StreamError<E>>,
    pub output: Vec<u8>,
}

/// Collects callback deliveries in the order the dispatcher runs them.
pub struct Recorder<E> {
    log: Arc<Mutex<Vec<Delivery<E>>>>,
}

impl<E: Send + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn callback(&self, tag: usize) -> Option<Callback<E>> {
        let log = Arc::clone(&self.log);
        zipstream::callback(move |error, output| {
            log.lock().push(Delivery { tag, error, output });
        })
    }

    pub fn take(&self) -> Vec<Delivery<E>> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }
}

pub fn runtime(workers: usize) -> (Runtime, Dispatcher) {
    runtime_with(EngineConfig::default().with_workers(workers))
}

pub fn runtime_with(config: EngineConfig) -> (Runtime, Dispatcher) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("zipstream=debug")
        .with_test_writer()
        .try_init();
    Runtime::new(config).unwrap()
}

pub async fn settle(dispatcher: &mut Dispatcher) {
    tokio::time::timeout(Duration::from_secs(10), dispatcher.settle())
        .await
        .expect("requests did not settle");
}
