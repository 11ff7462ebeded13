// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline orchestration.
//!
//! ```text
//! Idle ──run()──▶ Running ──reader done──▶ Draining ──writer done──▶ Stopped
//! ```
//!
//! [`Shifter::run`] consumes the shifter, so a pipeline runs exactly one
//! cycle. The writer is spawned before the reader; it simply waits on the
//! empty queue until the first record shows up, so the order cannot lose
//! records.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::PipelineError;
use crate::queue::BoundedLossyQueue;
use crate::reader::{ReadOutcome, Reader};
use crate::sink::Sink;
use crate::stats::{
    ReaderCounters, StatsAggregator, StatsConfig, StatsReporter, StatsSnapshot, WriterCounters,
};
use crate::writer::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ShifterConfig {
    pub queue_size: usize,
    pub input_buffer_size: usize,
    /// Periodic stats reporting; `None` disables it along with latency
    /// measurement.
    pub stats: Option<StatsConfig>,
}

impl ShifterConfig {
    #[must_use]
    pub fn from_config(config: &Config, stats: Option<StatsConfig>) -> Self {
        Self {
            queue_size: config.queue_size,
            input_buffer_size: config.input_buffer_size,
            stats,
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.queue_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue size must be greater than 0".to_string(),
            ));
        }
        if self.input_buffer_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "input buffer size must be greater than 0".to_string(),
            ));
        }
        if let Some(stats) = &self.stats {
            if stats.interval.is_zero() {
                return Err(PipelineError::InvalidConfig(
                    "stats interval must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub struct Shifter {
    config: ShifterConfig,
    state_tx: watch::Sender<PipelineState>,
}

impl Shifter {
    #[must_use]
    pub fn new(config: ShifterConfig) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        Self { config, state_tx }
    }

    /// Observes state transitions, including those made while `run` is in
    /// progress.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state_tx.borrow()
    }

    fn transition(&self, state: PipelineState) {
        debug!("Pipeline state: {:?}", state);
        self.state_tx.send_replace(state);
    }

    /// Runs one full cycle: relays `input` into `sink` until the input ends
    /// (or `cancel_token` fires), drains what is still buffered and returns
    /// the final stats.
    ///
    /// Only startup problems (invalid config, sink init failure) and internal
    /// faults are errors. On a startup error nothing has been spawned.
    pub async fn run<R, S>(
        self,
        input: R,
        mut sink: S,
        cancel_token: CancellationToken,
    ) -> Result<StatsSnapshot, PipelineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        S: Sink + 'static,
    {
        self.config.validate()?;
        let queue = Arc::new(BoundedLossyQueue::new(self.config.queue_size)?);
        sink.init().await.map_err(PipelineError::SinkInit)?;

        let stats_enabled = self.config.stats.is_some();
        let reader_counters = Arc::new(ReaderCounters::default());
        let writer_counters = Arc::new(WriterCounters::default());
        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let aggregator = StatsAggregator::new(
            Arc::clone(&reader_counters),
            Arc::clone(&writer_counters),
            reader_tx,
            writer_tx,
            self.config.stats.as_ref().is_some_and(|s| s.windowed),
        );

        self.transition(PipelineState::Running);

        let writer = Writer::new(
            sink,
            Arc::clone(&queue),
            Arc::clone(&writer_counters),
            writer_rx,
            stats_enabled,
        );
        let writer_task = tokio::spawn(writer.run());

        let reader = Reader::new(
            input,
            self.config.input_buffer_size,
            Arc::clone(&queue),
            Arc::clone(&reader_counters),
            reader_rx,
            cancel_token,
            stats_enabled,
        );
        let reader_task = tokio::spawn(reader.run());

        let stats_cancel = CancellationToken::new();
        let reporter_task = self.config.stats.clone().map(|stats| {
            info!(
                "Reporting stats to {} every {:?}",
                stats.destination.display(),
                stats.interval
            );
            let reporter = StatsReporter::new(aggregator.clone(), stats, stats_cancel.clone());
            tokio::spawn(reporter.run())
        });

        // Close the queue no matter how the reader ended, so the writer can
        // always finish its drain.
        let read_result = reader_task.await;
        self.transition(PipelineState::Draining);
        let close_result = queue.close();
        debug!("Queue closed with {} records left to drain", queue.len());

        let write_result = writer_task.await;

        stats_cancel.cancel();
        if let Some(task) = reporter_task {
            if let Err(e) = task.await {
                debug!("Stats reporter ended abnormally: {e}");
            }
        }
        self.transition(PipelineState::Stopped);

        match read_result {
            Ok(Ok(ReadOutcome::Failed(e))) => debug!("Upstream read error ended the pipeline: {e}"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(PipelineError::Task(format!("reader: {e}"))),
        }
        close_result?;
        write_result.map_err(|e| PipelineError::Task(format!("writer: {e}")))?;

        let snapshot = aggregator.snapshot();
        info!(
            "Pipeline stopped: {} lines read, {} evicted, {} written, {} failed",
            snapshot.input_lines_total,
            snapshot.input_drops_total,
            snapshot.output_lines_total,
            snapshot.output_failures_total
        );
        Ok(snapshot)
    }
}
