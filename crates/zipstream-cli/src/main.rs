//! zipstream CLI
//!
//! Compresses or decompresses a file by streaming it through a zipstream
//! runtime. Reads stdin and writes stdout when paths are omitted.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use zipstream::codec::{Deflate, Gunzip, Gzip, Inflate};
use zipstream::{Callback, Dispatcher, EngineConfig, Processor, Runtime};

/// Streaming zlib/gzip compressor
#[derive(Parser, Debug)]
#[command(name = "zipstream")]
#[command(about = "Streaming zlib compression on a worker pool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bytes handed to each write
    #[arg(long, global = true, default_value = "65536")]
    chunk_size: usize,

    /// Override the number of worker threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Use gzip framing instead of zlib
    #[arg(long, global = true)]
    gzip: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress INPUT into zlib (or gzip) format
    Compress {
        /// Compression level, 0-9
        #[arg(short, long, default_value = "6")]
        level: u32,

        /// Input file (stdin if omitted)
        input: Option<PathBuf>,

        /// Output file (stdout if omitted)
        output: Option<PathBuf>,
    },

    /// Decompress zlib (or gzip) data from INPUT
    Decompress {
        /// Input file (stdin if omitted)
        input: Option<PathBuf>,

        /// Output file (stdout if omitted)
        output: Option<PathBuf>,
    },
}

/// Byte counts for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Totals {
    read: u64,
    written: u64,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout may carry the payload.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("zipstream=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let totals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(run(args))?;

    info!("Read {} bytes, wrote {} bytes", totals.read, totals.written);
    Ok(())
}

async fn run(args: Args) -> Result<Totals> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    config.validate()?;
    if args.chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }

    let (runtime, mut dispatcher) = Runtime::new(config)?;
    info!(
        "Started {} with {} workers",
        runtime.config().name,
        runtime.config().workers
    );

    let chunk = args.chunk_size;
    let result = match args.command {
        Command::Compress {
            level,
            input,
            output,
        } => {
            let (reader, writer) = open_io(input, output)?;
            if args.gzip {
                pump(&runtime, &mut dispatcher, Gzip::new(level), reader, writer, chunk).await
            } else {
                pump(&runtime, &mut dispatcher, Deflate::new(level), reader, writer, chunk).await
            }
        }
        Command::Decompress { input, output } => {
            let (reader, writer) = open_io(input, output)?;
            if args.gzip {
                pump(&runtime, &mut dispatcher, Gunzip::new(), reader, writer, chunk).await
            } else {
                pump(&runtime, &mut dispatcher, Inflate::new(), reader, writer, chunk).await
            }
        }
    };

    runtime.shutdown();
    dispatcher.settle().await;
    result
}

fn open_io(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(Box<dyn Read>, Box<dyn Write + Send>)> {
    let reader: Box<dyn Read> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let writer: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };
    Ok((reader, writer))
}

// ─────────────────────────────────────────────────────────────────────────────
// Pumping
// ─────────────────────────────────────────────────────────────────────────────

/// Where callbacks put their output. Callbacks run in submission order, so
/// appending here keeps the output in order.
struct Sink {
    out: Box<dyn Write + Send>,
    written: u64,
    failure: Option<String>,
}

impl Sink {
    fn accept(&mut self, output: &[u8]) {
        if self.failure.is_some() {
            return;
        }
        match self.out.write_all(output) {
            Ok(()) => self.written += output.len() as u64,
            Err(e) => self.failure = Some(format!("Failed to write output: {}", e)),
        }
    }
}

fn deliver_to<E: Display + Send + 'static>(sink: &Arc<Mutex<Sink>>) -> Option<Callback<E>> {
    let sink = Arc::clone(sink);
    zipstream::callback(move |error, output: Vec<u8>| {
        let mut sink = sink.lock();
        match error {
            Some(e) => {
                if sink.failure.is_none() {
                    sink.failure = Some(e.to_string());
                }
            }
            None => sink.accept(&output),
        }
    })
}

async fn pump<P: Processor>(
    runtime: &Runtime,
    dispatcher: &mut Dispatcher,
    processor: P,
    mut reader: Box<dyn Read>,
    writer: Box<dyn Write + Send>,
    chunk_size: usize,
) -> Result<Totals> {
    let stream = runtime
        .open(processor)
        .map_err(|e| anyhow!("Failed to open {} stream: {}", P::NAME, e))?;
    let sink = Arc::new(Mutex::new(Sink {
        out: writer,
        written: 0,
        failure: None,
    }));
    let max_pending = runtime.config().workers.max(1) * 2;

    let mut totals = Totals::default();
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read input"),
        };
        totals.read += n as u64;
        stream.write(Bytes::copy_from_slice(&buf[..n]), deliver_to(&sink))?;

        dispatcher.drain();
        while stream.pending() >= max_pending {
            dispatcher.wait().await;
        }
        if let Some(failure) = sink.lock().failure.take() {
            stream.destroy()?;
            bail!("{} failed: {}", P::NAME, failure);
        }
    }

    debug!("[cli] Input exhausted after {} bytes, closing", totals.read);
    stream.close(deliver_to(&sink))?;
    dispatcher.settle().await;

    let mut sink = sink.lock();
    if let Some(failure) = sink.failure.take() {
        bail!("{} failed: {}", P::NAME, failure);
    }
    sink.out.flush().context("Failed to flush output")?;
    totals.written = sink.written;
    Ok(totals)
}
