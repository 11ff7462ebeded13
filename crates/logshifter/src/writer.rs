// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream side of the pipeline: drains the queue into a [`Sink`] until
//! the queue is closed and empty.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::queue::BoundedLossyQueue;
use crate::record::Record;
use crate::sink::Sink;
use crate::stats::{micros, CounterCommandReceiver, WriterCounters};

pub struct Writer<S> {
    sink: S,
    queue: Arc<BoundedLossyQueue>,
    counters: Arc<WriterCounters>,
    commands: CounterCommandReceiver,
    stats_enabled: bool,
}

impl<S: Sink> Writer<S> {
    pub fn new(
        sink: S,
        queue: Arc<BoundedLossyQueue>,
        counters: Arc<WriterCounters>,
        commands: CounterCommandReceiver,
        stats_enabled: bool,
    ) -> Self {
        Self {
            sink,
            queue,
            counters,
            commands,
            stats_enabled,
        }
    }

    /// Writes every record handed out by the queue and returns the sink once
    /// the queue reports end-of-stream. A failed write is counted and the
    /// record skipped; it never stops the drain.
    pub async fn run(mut self) -> S {
        info!("Writer started");

        loop {
            let next = tokio::select! {
                biased;
                Some(command) = self.commands.recv() => {
                    self.counters.apply(command);
                    continue;
                }
                next = self.queue.dequeue() => next,
            };

            match next {
                Some(record) => self.write(record).await,
                None => break,
            }
        }

        info!("Writer shutting down: queue drained");
        debug!(
            "Writer totals: {} lines written, {} failed",
            self.counters.lines.lifetime(),
            self.counters.failures.lifetime()
        );

        self.sink
    }

    async fn write(&mut self, record: Record) {
        let start = self.stats_enabled.then(Instant::now);

        match self.sink.write(&record).await {
            Ok(_) => {
                self.counters.lines.incr();
                if let Some(start) = start {
                    self.counters.write_duration.add(micros(start.elapsed()));
                }
            }
            Err(e) => {
                self.counters.failures.incr();
                error!("Failed to write {} byte record, skipping it: {e}", record.len());
            }
        }
    }
}
