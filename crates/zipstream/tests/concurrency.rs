mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{Recorder, Scripted, TRAILER, runtime, settle};
use parking_lot::Mutex;
use zipstream::{EngineConfig, Job, Rejected, Runtime, WorkerPool};

#[tokio::test]
async fn test_callbacks_follow_submission_order() {
    let (runtime, mut dispatcher) = runtime(4);
    let recorder = Recorder::new();
    let scripted = Scripted {
        delay: Some(Duration::from_micros(200)),
        ..Scripted::new()
    };
    let stream = runtime.open(scripted).unwrap();

    for i in 0..200usize {
        stream.write(i.to_le_bytes().to_vec(), recorder.callback(i)).unwrap();
        if i % 17 == 0 {
            tokio::task::yield_now().await;
        }
    }
    stream.close(recorder.callback(200)).unwrap();
    settle(&mut dispatcher).await;

    let deliveries = recorder.take();
    let tags: Vec<usize> = deliveries.iter().map(|d| d.tag).collect();
    assert_eq!(tags, (0..=200).collect::<Vec<_>>());
    for d in &deliveries[..200] {
        assert_eq!(d.output, d.tag.to_le_bytes());
    }
    assert_eq!(deliveries[200].output, TRAILER);
}

#[tokio::test]
async fn test_stream_never_runs_on_two_workers() {
    let (runtime, mut dispatcher) = runtime(8);
    let recorder = Recorder::new();

    let mut streams = Vec::new();
    let mut stats = Vec::new();
    for _ in 0..4 {
        let scripted = Scripted {
            delay: Some(Duration::from_micros(100)),
            ..Scripted::new()
        };
        stats.push(scripted.stats());
        streams.push(runtime.open(scripted).unwrap());
    }

    // Submit from several threads at once to race activation.
    std::thread::scope(|scope| {
        for (s, stream) in streams.iter().enumerate() {
            for t in 0..3 {
                let recorder = &recorder;
                scope.spawn(move || {
                    for i in 0..40usize {
                        let tag = s * 1000 + t * 100 + i;
                        stream.write(vec![1u8; 8], recorder.callback(tag)).unwrap();
                    }
                });
            }
        }
    });
    settle(&mut dispatcher).await;

    assert_eq!(recorder.len(), 4 * 3 * 40);
    for s in &stats {
        assert_eq!(s.overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(s.writes.load(Ordering::SeqCst), 3 * 40);
    }
    for stream in &streams {
        assert_eq!(stream.pending(), 0);
    }
}

#[tokio::test]
async fn test_per_stream_order_holds_across_streams() {
    let (runtime, mut dispatcher) = runtime(4);
    let recorder = Recorder::new();
    let a = runtime.open(Scripted::new()).unwrap();
    let b = runtime.open(Scripted::new()).unwrap();

    for i in 0..50usize {
        a.write(vec![b'a'], recorder.callback(i)).unwrap();
        b.write(vec![b'b'], recorder.callback(1000 + i)).unwrap();
    }
    settle(&mut dispatcher).await;

    let deliveries = recorder.take();
    let a_tags: Vec<usize> = deliveries.iter().map(|d| d.tag).filter(|t| *t < 1000).collect();
    let b_tags: Vec<usize> = deliveries.iter().map(|d| d.tag).filter(|t| *t >= 1000).collect();
    assert_eq!(a_tags, (0..50).collect::<Vec<_>>());
    assert_eq!(b_tags, (1000..1050).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_panicking_callback_does_not_stop_delivery() {
    let (runtime, dispatcher) = runtime(2);
    let faults = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&faults);
    let mut dispatcher = dispatcher.with_fault_handler(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let recorder = Recorder::new();
    let stream = runtime.open(Scripted::new()).unwrap();
    stream.write(&b"one"[..], recorder.callback(0)).unwrap();
    stream
        .write(&b"two"[..], zipstream::callback(|_, _| panic!("callback failed")))
        .unwrap();
    stream.write(&b"three"[..], recorder.callback(2)).unwrap();
    settle(&mut dispatcher).await;

    let tags: Vec<usize> = recorder.take().iter().map(|d| d.tag).collect();
    assert_eq!(tags, vec![0, 2]);
    assert_eq!(faults.load(Ordering::SeqCst), 1);
    assert_eq!(stream.pending(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Liveness
// ─────────────────────────────────────────────────────────────────────────────

/// Pool that holds jobs until the test releases them.
#[derive(Default)]
struct GatedPool {
    jobs: Mutex<Vec<Job>>,
    closed: AtomicBool,
}

impl GatedPool {
    fn release(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        for job in jobs {
            job();
        }
    }
}

impl WorkerPool for GatedPool {
    fn spawn(&self, job: Job) -> Result<(), Rejected> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Rejected);
        }
        self.jobs.lock().push(job);
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_stream_outlives_dropped_handle_until_callbacks_run() {
    let pool = Arc::new(GatedPool::default());
    let (runtime, mut dispatcher) =
        Runtime::with_pool(EngineConfig::default(), Arc::clone(&pool) as Arc<dyn WorkerPool>);
    let recorder = Recorder::new();
    let scripted = Scripted::new();
    let stats = scripted.stats();

    let stream = runtime.open(scripted).unwrap();
    stream.write(&b"held"[..], recorder.callback(0)).unwrap();
    stream.write(&b"back"[..], recorder.callback(1)).unwrap();
    assert_eq!(stream.pending(), 2);
    drop(stream);

    // Work has not run: the requests pin the stream.
    assert_eq!(runtime.in_flight(), 2);
    assert_eq!(stats.destroyed.load(Ordering::SeqCst), 0);

    // Work ran but callbacks are still waiting on the dispatcher.
    pool.release();
    assert_eq!(stats.writes.load(Ordering::SeqCst), 2);
    assert_eq!(stats.destroyed.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.len(), 0);

    assert_eq!(dispatcher.drain(), 2);
    assert_eq!(recorder.len(), 2);
    assert_eq!(runtime.in_flight(), 0);
    // Last pin gone: the stream is finalized and its processor torn down.
    assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
}

/// Pool that takes a while to refuse every job.
struct SlowRejectPool;

impl WorkerPool for SlowRejectPool {
    fn spawn(&self, _job: Job) -> Result<(), Rejected> {
        std::thread::sleep(Duration::from_millis(100));
        Err(Rejected)
    }

    fn shutdown(&self) {}
}

#[tokio::test]
async fn test_settle_wakes_when_rejected_request_is_released() {
    let (runtime, mut dispatcher) =
        Runtime::with_pool(EngineConfig::default(), Arc::new(SlowRejectPool) as Arc<dyn WorkerPool>);
    let stream = runtime.open(Scripted::new()).unwrap();

    let writer = std::thread::spawn(move || {
        let result = stream.write(&b"refused"[..], None);
        (result, stream.pending())
    });
    // Let the write take its pin before the dispatcher starts waiting.
    tokio::time::sleep(Duration::from_millis(20)).await;

    settle(&mut dispatcher).await;
    let (result, pending) = writer.join().unwrap();
    assert_eq!(result, Err(zipstream::SubmitError::Rejected));
    assert_eq!(pending, 0);
    assert_eq!(runtime.in_flight(), 0);
}

#[test]
fn test_dropping_idle_stream_finalizes_immediately() {
    let (runtime, _dispatcher) = runtime(1);
    let scripted = Scripted::new();
    let stats = scripted.stats();

    let stream = runtime.open(scripted).unwrap();
    drop(stream);
    assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
}
