// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity ring of [`Record`]s between the reader and the writer.
//!
//! Enqueue never blocks: when the ring is full the oldest record is evicted
//! and the new one is appended ("drop oldest, keep newest"). Dequeue waits
//! until a record is available, or returns `None` once the queue has been
//! closed and fully drained.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::errors::QueueError;
use crate::record::Record;

/// Outcome of a successful [`BoundedLossyQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Appended,
    /// The queue was full and its oldest record was discarded to make room.
    EvictedOldest,
}

#[derive(Debug)]
struct State {
    records: VecDeque<Record>,
    closed: bool,
    evicted: u64,
}

#[derive(Debug)]
pub struct BoundedLossyQueue {
    capacity: usize,
    state: Mutex<State>,
    not_empty: Notify,
}

impl BoundedLossyQueue {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        Ok(Self {
            capacity,
            state: Mutex::new(State {
                records: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
            }),
            not_empty: Notify::new(),
        })
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    /// Appends `record`, evicting the oldest buffered record if the queue is
    /// full. Only fails if the queue has already been closed.
    pub fn enqueue(&self, record: Record) -> Result<Enqueued, QueueError> {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed(record));
            }

            let outcome = if state.records.len() >= self.capacity {
                state.records.pop_front();
                state.evicted += 1;
                Enqueued::EvictedOldest
            } else {
                Enqueued::Appended
            };
            state.records.push_back(record);
            outcome
        };

        // Single consumer: a stored permit covers the case where the writer
        // is not waiting yet.
        self.not_empty.notify_one();
        Ok(outcome)
    }

    /// Waits for the next record. Returns `None` once the queue is closed and
    /// empty. Cancel safe: a record is only removed when this returns it.
    pub async fn dequeue(&self) -> Option<Record> {
        loop {
            let notified = self.not_empty.notified();
            if let Some(next) = self.try_dequeue() {
                return next;
            }
            notified.await;
        }
    }

    /// Non-blocking dequeue. `None` means "nothing yet", `Some(None)` means
    /// closed and drained.
    pub fn try_dequeue(&self) -> Option<Option<Record>> {
        let mut state = self.lock();
        match state.records.pop_front() {
            Some(record) => Some(Some(record)),
            None if state.closed => Some(None),
            None => None,
        }
    }

    /// Rejects further enqueues. Buffered records stay available to
    /// [`dequeue`](Self::dequeue) until drained.
    pub fn close(&self) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::AlreadyClosed);
            }
            state.closed = true;
        }

        self.not_empty.notify_one();
        Ok(())
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total number of records evicted since creation.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}
