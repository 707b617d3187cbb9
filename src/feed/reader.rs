//! Line-oriented feed transport.
//!
//! The sensor bridge writes one message per line. A background thread reads
//! lines from a TCP connection or stdin and forwards them on a bounded channel;
//! parsing happens in the pipeline so malformed input is counted in one place.

use crate::config::FeedSource;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Channel capacity between the reader thread and the ingestion loop.
const FEED_CHANNEL_CAPACITY: usize = 10_000;

/// How often a blocked TCP read wakes up to check the stop flag.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors that can occur while starting the feed.
#[derive(Debug)]
pub enum FeedError {
    AlreadyRunning,
    Connect { addr: String, message: String },
    Io(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::AlreadyRunning => write!(f, "Feed is already running"),
            FeedError::Connect { addr, message } => {
                write!(f, "Could not connect to feed at {addr}: {message}")
            }
            FeedError::Io(e) => write!(f, "Feed IO error: {e}"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Reads feed lines on a background thread.
pub struct SampleFeed {
    source: FeedSource,
    sender: Sender<String>,
    receiver: Receiver<String>,
    running: Arc<AtomicBool>,
}

impl SampleFeed {
    /// Create a new feed for the given source. Nothing is read until `start`.
    pub fn new(source: FeedSource) -> Self {
        let (sender, receiver) = bounded(FEED_CHANNEL_CAPACITY);
        Self {
            source,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Connect and start the reader thread.
    pub fn start(&mut self) -> Result<(), FeedError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(FeedError::AlreadyRunning);
        }

        let reader: Box<dyn Read + Send> = match &self.source {
            FeedSource::Tcp { addr } => {
                let stream = TcpStream::connect(addr).map_err(|e| FeedError::Connect {
                    addr: addr.clone(),
                    message: e.to_string(),
                })?;
                stream
                    .set_read_timeout(Some(READ_POLL_INTERVAL))
                    .map_err(|e| FeedError::Io(e.to_string()))?;
                tracing::info!("Connected to sample feed at {}", addr);
                Box::new(stream)
            }
            FeedSource::Stdin => {
                tracing::info!("Reading sample feed from stdin");
                Box::new(std::io::stdin())
            }
        };

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let sender = self.sender.clone();

        thread::Builder::new()
            .name("sample-feed".to_string())
            .spawn(move || read_lines(reader, sender, running))
            .map_err(|e| FeedError::Io(e.to_string()))?;

        Ok(())
    }

    /// Ask the reader thread to stop after its current read.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the reader thread is still delivering lines.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for feed lines.
    pub fn receiver(&self) -> &Receiver<String> {
        &self.receiver
    }

    /// Sender half, for pushing lines from another transport.
    pub fn sender(&self) -> Sender<String> {
        self.sender.clone()
    }
}

fn read_lines(reader: Box<dyn Read + Send>, sender: Sender<String>, running: Arc<AtomicBool>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    while running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                tracing::info!("Sample feed reached end of stream");
                break;
            }
            Ok(_) => {
                // Invalid UTF-8 is forwarded lossily and dropped as malformed by the parser.
                let complete = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                if sender.send(complete).is_err() {
                    break;
                }
            }
            // Partial bytes stay in `line` until the newline arrives.
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!("Sample feed read failed: {}", e);
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
}
