// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use logshifter::errors::SinkError;
use logshifter::record::Record;
use logshifter::sink::Sink;

/// In-memory sink. Clones share the same storage so a test can inspect what
/// the pipeline wrote after handing the sink over.
#[derive(Clone, Default)]
pub struct MemorySink {
    written: Arc<Mutex<Vec<Record>>>,
    write_delay: Option<Duration>,
    fail_every: Option<usize>,
    attempts: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Default::default()
        }
    }

    /// Fails every `n`th write attempt (1-based).
    pub fn failing_every(n: usize) -> Self {
        Self {
            fail_every: Some(n),
            ..Default::default()
        }
    }

    pub fn written(&self) -> Vec<Record> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn init(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<usize, SinkError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if self.fail_every.is_some_and(|n| attempt % n == 0) {
            return Err(SinkError::Write(std::io::Error::other("downstream rejected")));
        }

        self.written.lock().unwrap().push(record.clone());
        Ok(record.len())
    }
}
