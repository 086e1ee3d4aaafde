//! Sample sources: a live serial device or a recorded trace replay.
//!
//! Reading is blocking, so a source runs on its own OS thread and hands
//! samples to the consumer loop through a bounded queue. Backpressure policy:
//! when the queue is full the source thread blocks in `blocking_send` until
//! the consumer drains a slot. No sample is ever dropped and arrival order is
//! preserved.

use crate::error::SourceError;
use crate::types::Sample;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Serial read timeout; also bounds how long shutdown can go unnoticed.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A configured, ready-to-run sample source.
///
/// Construction fails fast (port cannot be opened, trace missing or empty);
/// after `spawn` the source only ever terminates gracefully.
pub enum SampleSource {
    Serial {
        port_name: String,
        port: Box<dyn serialport::SerialPort>,
    },
    Replay {
        samples: Vec<Sample>,
        interval: Duration,
    },
}

impl SampleSource {
    /// Open a serial device for live streaming.
    pub fn serial(port_name: &str, baud_rate: u32) -> Result<Self, SourceError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| SourceError::SerialOpen {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        info!("opened serial port {} at {} baud", port_name, baud_rate);
        Ok(Self::Serial {
            port_name: port_name.to_string(),
            port,
        })
    }

    /// Load a captured trace for paced replay.
    pub fn replay(path: &Path, interval: Duration) -> Result<Self, SourceError> {
        let samples = load_trace(path)?;
        info!("loaded {} samples from {}", samples.len(), path.display());
        Ok(Self::Replay { samples, interval })
    }

    /// Run the source on a dedicated thread, feeding `tx` until the stream
    /// ends, the consumer goes away, or `shutdown` is raised.
    pub fn spawn(self, tx: mpsc::Sender<Sample>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        std::thread::spawn(move || match self {
            SampleSource::Serial { port_name, port } => {
                read_serial(&port_name, port, tx, shutdown)
            }
            SampleSource::Replay { samples, interval } => {
                replay_trace(samples, interval, tx, shutdown)
            }
        })
    }
}

/// Read a captured trace file: one sample per line, malformed lines skipped.
pub fn load_trace(path: &Path) -> Result<Vec<Sample>, SourceError> {
    if !path.exists() {
        return Err(SourceError::TraceNotFound(path.display().to_string()));
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut samples = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(sample) = Sample::parse_line(&line) {
            samples.push(sample);
        }
    }

    if samples.is_empty() {
        return Err(SourceError::EmptyTrace(path.display().to_string()));
    }
    Ok(samples)
}

fn read_serial(
    port_name: &str,
    port: Box<dyn serialport::SerialPort>,
    tx: mpsc::Sender<Sample>,
    shutdown: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(port);
    let mut line = String::new();
    let mut sample_count: u64 = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("serial reader shutting down");
            break;
        }

        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                warn!("serial port {} closed unexpectedly", port_name);
                break;
            }
            Ok(_) => {
                let Some(sample) = Sample::parse_line(line.trim()) else {
                    // Debug output or a partial line; keep reading.
                    continue;
                };
                sample_count += 1;
                if sample_count == 1 {
                    info!(
                        "first sample received: ax={} ay={} az={}",
                        sample.ax, sample.ay, sample.az
                    );
                } else if sample_count % 500 == 0 {
                    debug!("serial stream alive: {} samples received", sample_count);
                }
                if tx.blocking_send(sample).is_err() {
                    info!("consumer loop gone, stopping serial reader");
                    break;
                }
            }
            // Timeouts let the shutdown flag be observed; invalid bytes are
            // just garbage on the wire.
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
            Err(e) if e.kind() == ErrorKind::InvalidData => continue,
            Err(e) => {
                error!("serial read failed on {}: {}", port_name, e);
                break;
            }
        }
    }
}

fn replay_trace(
    samples: Vec<Sample>,
    interval: Duration,
    tx: mpsc::Sender<Sample>,
    shutdown: Arc<AtomicBool>,
) {
    info!(
        "starting replay of {} samples ({}ms pacing)",
        samples.len(),
        interval.as_millis()
    );
    let total = samples.len();
    for (i, sample) in samples.into_iter().enumerate() {
        if shutdown.load(Ordering::Relaxed) {
            info!("replay shutting down at sample {}/{}", i, total);
            return;
        }
        if tx.blocking_send(sample).is_err() {
            info!("consumer loop gone, stopping replay at sample {}/{}", i, total);
            return;
        }
        if (i + 1) % 500 == 0 {
            debug!("replay progress: {}/{}", i + 1, total);
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
    info!("replay complete ({} samples)", total);
}
