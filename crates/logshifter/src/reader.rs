// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Upstream side of the pipeline: turns a byte stream into [`Record`]s and
//! pushes them into the queue without ever waiting on it.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::constants::EVICTION_WARN_EVERY;
use crate::errors::QueueError;
use crate::queue::{BoundedLossyQueue, Enqueued};
use crate::record::Record;
use crate::stats::{micros, CounterCommandReceiver, ReaderCounters};

/// Newline-delimited reads with a hard cap on line length.
///
/// A line longer than `max_len` comes back as several records of at most
/// `max_len` bytes each. A `\r` directly before the `\n` is stripped; any
/// other `\r` is data. A final line without a terminator is still returned
/// before end-of-stream.
///
/// [`next_line`](Self::next_line) is cancel safe: partial progress is kept in
/// `self` and resumed by the next call.
pub struct LineReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            inner: BufReader::with_capacity(max_len, inner),
            line: Vec::with_capacity(max_len),
            max_len,
        }
    }

    /// Returns the next line without its terminator, or `None` at
    /// end-of-stream. Empty lines are returned as empty vectors.
    pub async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let room = self.max_len - self.line.len();
            let window = &available[..available.len().min(room)];

            if let Some(pos) = window.iter().position(|&b| b == b'\n') {
                self.line.extend_from_slice(&window[..pos]);
                self.inner.consume(pos + 1);
                let mut line = self.take_line();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            let taken = window.len();
            self.line.extend_from_slice(window);
            self.inner.consume(taken);

            if self.line.len() >= self.max_len {
                let mut line = self.take_line();
                // a `\r\n` may straddle the boundary: hold the `\r` back so
                // the next call can tell a terminator from data
                if line.len() > 1 && line.last() == Some(&b'\r') {
                    line.pop();
                    self.line.push(b'\r');
                }
                return Ok(Some(line));
            }
        }
    }

    fn take_line(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.line, Vec::with_capacity(self.max_len))
    }
}

/// Why the read loop ended.
#[derive(Debug)]
pub enum ReadOutcome {
    EndOfStream,
    Failed(io::Error),
    Cancelled,
}

pub struct Reader<R> {
    lines: LineReader<R>,
    queue: Arc<BoundedLossyQueue>,
    counters: Arc<ReaderCounters>,
    commands: CounterCommandReceiver,
    cancel_token: CancellationToken,
    stats_enabled: bool,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    pub fn new(
        input: R,
        input_buffer_size: usize,
        queue: Arc<BoundedLossyQueue>,
        counters: Arc<ReaderCounters>,
        commands: CounterCommandReceiver,
        cancel_token: CancellationToken,
        stats_enabled: bool,
    ) -> Self {
        Self {
            lines: LineReader::new(input, input_buffer_size),
            queue,
            counters,
            commands,
            cancel_token,
            stats_enabled,
        }
    }

    /// Reads until end-of-stream, a read error or cancellation. None of those
    /// is a pipeline failure: they all mean "reading is done". The only error
    /// returned is queue misuse.
    pub async fn run(mut self) -> Result<ReadOutcome, QueueError> {
        info!("Reader started");

        let outcome = loop {
            let start = Instant::now();
            let next = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break ReadOutcome::Cancelled,
                Some(command) = self.commands.recv() => {
                    self.counters.apply(command);
                    continue;
                }
                next = self.lines.next_line() => next,
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break ReadOutcome::EndOfStream,
                Err(e) => break ReadOutcome::Failed(e),
            };
            if line.is_empty() {
                continue;
            }

            self.counters.lines.incr();
            if self.queue.enqueue(Record::from(line))? == Enqueued::EvictedOldest {
                self.counters.drops.incr();
                self.log_eviction();
            }

            if self.stats_enabled {
                self.counters.read_duration.add(micros(start.elapsed()));
            }
        };

        match &outcome {
            ReadOutcome::EndOfStream => info!("Reader shutting down: end of stream"),
            ReadOutcome::Failed(e) => info!("Reader shutting down: {e}"),
            ReadOutcome::Cancelled => info!("Reader shutting down: cancelled"),
        }
        debug!(
            "Reader totals: {} lines, {} evictions",
            self.counters.lines.lifetime(),
            self.counters.drops.lifetime()
        );

        Ok(outcome)
    }

    fn log_eviction(&self) {
        let drops = self.counters.drops.lifetime();
        if drops == 1 || drops % EVICTION_WARN_EVERY == 0 {
            warn!(
                "Queue full (capacity {}), evicted oldest record; {} evictions so far",
                self.queue.capacity(),
                drops
            );
        } else {
            trace!("Queue full, evicted oldest record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CounterCommand;
    use proptest::prelude::*;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    async fn collect_lines(input: &[u8], max_len: usize) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new(input, max_len);
        let mut out = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            out.push(line);
        }
        out
    }

    struct Harness {
        queue: Arc<BoundedLossyQueue>,
        counters: Arc<ReaderCounters>,
        commands: mpsc::UnboundedSender<CounterCommand>,
        cancel_token: CancellationToken,
    }

    fn reader<R: AsyncRead + Unpin>(
        input: R,
        buffer_size: usize,
        queue_size: usize,
    ) -> (Reader<R>, Harness) {
        let queue = Arc::new(BoundedLossyQueue::new(queue_size).unwrap());
        let counters = Arc::new(ReaderCounters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let reader = Reader::new(
            input,
            buffer_size,
            Arc::clone(&queue),
            Arc::clone(&counters),
            rx,
            cancel_token.clone(),
            true,
        );
        (
            reader,
            Harness {
                queue,
                counters,
                commands: tx,
                cancel_token,
            },
        )
    }

    #[tokio::test]
    async fn test_line_reader_strips_terminators() {
        let lines = collect_lines(b"one\ntwo\r\nthree", 64).await;
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[tokio::test]
    async fn test_line_reader_splits_at_buffer_boundary() {
        let mut input = vec![b'x'; 250];
        input.push(b'\n');
        let lines = collect_lines(&input, 100).await;

        let sizes: Vec<usize> = lines.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_line_reader_keeps_carriage_return_at_boundary() {
        // `\rdef` fills the buffer, so its terminator comes back as an empty line
        let lines = collect_lines(b"abc\rdef\n", 4).await;
        assert_eq!(lines, vec![b"abc".to_vec(), b"\rdef".to_vec(), Vec::new()]);
        assert_eq!(lines.concat(), b"abc\rdef".to_vec());
    }

    #[tokio::test]
    async fn test_line_reader_crlf_straddling_boundary_is_a_terminator() {
        let lines = collect_lines(b"abc\r\nxyz\n", 4).await;
        assert_eq!(lines, vec![b"abc".to_vec(), Vec::new(), b"xyz".to_vec()]);
    }

    #[tokio::test]
    async fn test_line_reader_keeps_carriage_return_without_newline() {
        let lines = collect_lines(b"one\r", 64).await;
        assert_eq!(lines, vec![b"one\r".to_vec()]);
    }

    proptest! {
        #[test]
        fn test_line_reader_split_lines_reassemble_to_input(
            input in proptest::collection::vec(
                prop_oneof![Just(b'\r'), Just(b'x'), any::<u8>().prop_filter("newline", |b| *b != b'\n')],
                0..512,
            ),
            max_len in 1usize..32,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let lines = runtime.block_on(collect_lines(&input, max_len));

            prop_assert!(lines.iter().all(|l| !l.is_empty() && l.len() <= max_len));
            prop_assert_eq!(lines.concat(), input);
        }
    }

    #[tokio::test]
    async fn test_line_reader_line_exactly_buffer_size() {
        // the terminator spills into its own (empty) line
        let mut input = vec![b'y'; 10];
        input.push(b'\n');
        let lines = collect_lines(&input, 10).await;
        assert_eq!(lines, vec![vec![b'y'; 10], Vec::new()]);
    }

    #[tokio::test]
    async fn test_reader_skips_empty_lines() {
        let (reader, harness) = reader(&b"a\n\n\r\nb\n"[..], 16, 8);
        let outcome = reader.run().await.unwrap();

        assert!(matches!(outcome, ReadOutcome::EndOfStream));
        assert_eq!(harness.counters.lines.lifetime(), 2);
        assert_eq!(harness.queue.len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_reader_evicts_without_blocking() {
        let (reader, harness) = reader(&b"1\n2\n3\n4\n5\n"[..], 16, 2);
        reader.run().await.unwrap();

        assert_eq!(harness.counters.lines.lifetime(), 5);
        assert_eq!(harness.counters.drops.lifetime(), 3);
        assert_eq!(harness.queue.evicted(), 3);
        assert_eq!(harness.queue.try_dequeue(), Some(Some(Record::from("4"))));
        assert!(logs_contain("evicted oldest record"));
    }

    #[tokio::test]
    async fn test_reader_stops_on_read_error() {
        let input = failing_input();
        let (reader, harness) = reader(input, 16, 4);

        let outcome = reader.run().await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Failed(_)));
        assert_eq!(harness.counters.lines.lifetime(), 0);
    }

    #[tokio::test]
    async fn test_reader_stops_on_cancel() {
        let (client, _server) = tokio::io::duplex(64);
        let (reader, harness) = reader(client, 16, 4);
        harness.cancel_token.cancel();

        let outcome = reader.run().await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_reader_applies_reset_while_blocked_on_input() {
        use tokio::io::AsyncWriteExt;

        let (client, mut server) = tokio::io::duplex(64);
        let (reader, harness) = reader(client, 16, 4);
        let task = tokio::spawn(reader.run());

        server.write_all(b"first\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(harness.counters.lines.window(), 1);

        harness.commands.send(CounterCommand::ResetWindow).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(harness.counters.lines.window(), 0);
        assert_eq!(harness.counters.lines.lifetime(), 1);

        drop(server);
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, ReadOutcome::EndOfStream));
    }

    #[tokio::test]
    async fn test_reader_reports_queue_misuse() {
        let (reader, harness) = reader(&b"late\n"[..], 16, 4);
        harness.queue.close().unwrap();

        assert!(matches!(reader.run().await, Err(QueueError::Closed(_))));
    }

    fn failing_input() -> impl AsyncRead + Unpin {
        struct Failing;

        impl AsyncRead for Failing {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
            }
        }

        Failing
    }
}
