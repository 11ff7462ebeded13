// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Throughput, drop and latency counters for the reader and the writer.
//!
//! Every counter keeps a lifetime total and a "current window" value. Each
//! counter group is owned by exactly one task; the [`StatsAggregator`] only
//! reads them and asks the owners to zero their windows by sending a
//! [`CounterCommand::ResetWindow`] message after each reported snapshot.
//!
//! A reset and a concurrent increment may land in either order. These are
//! operational telemetry, not an accounting ledger.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Message from the aggregator to a counter owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterCommand {
    ResetWindow,
}

pub type CounterCommandSender = mpsc::UnboundedSender<CounterCommand>;
pub type CounterCommandReceiver = mpsc::UnboundedReceiver<CounterCommand>;

/// A window/lifetime pair. Only the owning task calls [`add`](Self::add) and
/// [`reset_window`](Self::reset_window).
#[derive(Debug, Default)]
pub struct Counter {
    window: AtomicU64,
    lifetime: AtomicU64,
}

impl Counter {
    pub fn add(&self, value: u64) {
        self.window.fetch_add(value, Ordering::Relaxed);
        self.lifetime.fetch_add(value, Ordering::Relaxed);
    }

    pub fn incr(&self) {
        self.add(1);
    }

    pub fn reset_window(&self) {
        self.window.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn window(&self) -> u64 {
        self.window.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn lifetime(&self) -> u64 {
        self.lifetime.load(Ordering::Relaxed)
    }
}

/// Counters owned by the reader task.
#[derive(Debug, Default)]
pub struct ReaderCounters {
    pub lines: Counter,
    pub drops: Counter,
    /// microseconds
    pub read_duration: Counter,
}

impl ReaderCounters {
    pub fn apply(&self, command: CounterCommand) {
        match command {
            CounterCommand::ResetWindow => self.reset_window(),
        }
    }

    pub fn reset_window(&self) {
        self.lines.reset_window();
        self.drops.reset_window();
        self.read_duration.reset_window();
    }
}

/// Counters owned by the writer task.
#[derive(Debug, Default)]
pub struct WriterCounters {
    pub lines: Counter,
    pub failures: Counter,
    /// microseconds
    pub write_duration: Counter,
}

impl WriterCounters {
    pub fn apply(&self, command: CounterCommand) {
        match command {
            CounterCommand::ResetWindow => self.reset_window(),
        }
    }

    pub fn reset_window(&self) {
        self.lines.reset_window();
        self.failures.reset_window();
        self.write_duration.reset_window();
    }
}

/// Saturating microsecond count of `elapsed`.
#[must_use]
pub fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// `duration / lines`, or 0 when nothing was processed.
#[must_use]
pub fn average(duration_micros: u64, lines: u64) -> f64 {
    if lines == 0 {
        return 0.0;
    }
    duration_micros as f64 / lines as f64
}

/// Point-in-time view of both counter groups, serialized as one JSON object
/// per reporting tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// seconds since the unix epoch
    pub timestamp: u64,

    pub input_lines: u64,
    pub input_lines_total: u64,
    pub input_drops: u64,
    pub input_drops_total: u64,
    pub input_read_duration: u64,
    pub input_read_duration_total: u64,
    pub input_avg_read_latency: f64,
    pub input_avg_read_latency_total: f64,

    pub output_lines: u64,
    pub output_lines_total: u64,
    pub output_failures: u64,
    pub output_failures_total: u64,
    pub output_write_duration: u64,
    pub output_write_duration_total: u64,
    pub output_avg_write_latency: f64,
    pub output_avg_write_latency_total: f64,
}

impl StatsSnapshot {
    #[must_use]
    pub fn capture(reader: &ReaderCounters, writer: &WriterCounters) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let input_lines = reader.lines.window();
        let input_lines_total = reader.lines.lifetime();
        let input_read_duration = reader.read_duration.window();
        let input_read_duration_total = reader.read_duration.lifetime();

        let output_lines = writer.lines.window();
        let output_lines_total = writer.lines.lifetime();
        let output_write_duration = writer.write_duration.window();
        let output_write_duration_total = writer.write_duration.lifetime();

        Self {
            timestamp,
            input_lines,
            input_lines_total,
            input_drops: reader.drops.window(),
            input_drops_total: reader.drops.lifetime(),
            input_read_duration,
            input_read_duration_total,
            input_avg_read_latency: average(input_read_duration, input_lines),
            input_avg_read_latency_total: average(input_read_duration_total, input_lines_total),
            output_lines,
            output_lines_total,
            output_failures: writer.failures.window(),
            output_failures_total: writer.failures.lifetime(),
            output_write_duration,
            output_write_duration_total,
            output_avg_write_latency: average(output_write_duration, output_lines),
            output_avg_write_latency_total: average(output_write_duration_total, output_lines_total),
        }
    }
}

/// Reads both counter groups and coordinates window resets with their owners.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    reader: Arc<ReaderCounters>,
    writer: Arc<WriterCounters>,
    reader_tx: CounterCommandSender,
    writer_tx: CounterCommandSender,
    windowed: bool,
}

impl StatsAggregator {
    #[must_use]
    pub fn new(
        reader: Arc<ReaderCounters>,
        writer: Arc<WriterCounters>,
        reader_tx: CounterCommandSender,
        writer_tx: CounterCommandSender,
        windowed: bool,
    ) -> Self {
        Self {
            reader,
            writer,
            reader_tx,
            writer_tx,
            windowed,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::capture(&self.reader, &self.writer)
    }

    /// Asks the reader and the writer to zero their window counters. A no-op
    /// in lifetime-only mode.
    ///
    /// An owner that already exited has dropped its receiver and will never
    /// touch its counters again, so its windows are zeroed here directly.
    pub fn reset_windows(&self) {
        if !self.windowed {
            return;
        }
        if self.reader_tx.send(CounterCommand::ResetWindow).is_err() {
            trace!("reader gone, resetting its window directly");
            self.reader.reset_window();
        }
        if self.writer_tx.send(CounterCommand::ResetWindow).is_err() {
            trace!("writer gone, resetting its window directly");
            self.writer.reset_window();
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// File that receives one JSON snapshot per line.
    pub destination: PathBuf,
    pub interval: Duration,
    /// Reset window counters after each snapshot.
    pub windowed: bool,
}

/// Periodic task that appends a snapshot to the stats destination on every
/// tick. Failures to open or write the destination are logged and never
/// reach the pipeline.
pub struct StatsReporter {
    aggregator: StatsAggregator,
    config: StatsConfig,
    cancel_token: CancellationToken,
    file: Option<File>,
}

impl StatsReporter {
    #[must_use]
    pub fn new(
        aggregator: StatsAggregator,
        config: StatsConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            config,
            cancel_token,
            file: None,
        }
    }

    pub async fn run(mut self) {
        debug!(
            "Stats reporter started, writing to {} every {:?}",
            self.config.destination.display(),
            self.config.interval
        );

        let mut ticker = interval(self.config.interval);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.aggregator.snapshot();
                    self.report(&snapshot).await;
                    self.aggregator.reset_windows();
                }
                () = self.cancel_token.cancelled() => break,
            }
        }

        debug!("Stats reporter stopped");
    }

    async fn report(&mut self, snapshot: &StatsSnapshot) {
        let mut line = match serde_json::to_vec(snapshot) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize stats snapshot: {e}");
                return;
            }
        };
        line.push(b'\n');

        let Some(file) = self.destination().await else {
            return;
        };
        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!(
                "Failed to write stats to {}: {e}",
                self.config.destination.display()
            );
            // reopen on the next tick
            self.file = None;
        }
    }

    async fn destination(&mut self) -> Option<&mut File> {
        if self.file.is_none() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.config.destination)
                .await
            {
                Ok(file) => self.file = Some(file),
                Err(e) => {
                    warn!(
                        "Failed to open stats file {}: {e}",
                        self.config.destination.display()
                    );
                    return None;
                }
            }
        }
        self.file.as_mut()
    }
}
