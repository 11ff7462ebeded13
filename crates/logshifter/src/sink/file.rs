// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::OutputType;
use crate::errors::SinkError;
use crate::record::Record;
use crate::sink::{chunks, Sink};

/// Appends records to a file, one chunk per line: every chunk, including the
/// last, is followed by `\n` so the output stays line oriented.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    chunk_size: usize,
    file: Option<File>,
}

impl FileSink {
    #[must_use]
    pub fn new(path: PathBuf, chunk_size: usize) -> Self {
        Self {
            path,
            chunk_size,
            file: None,
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn init(&mut self) -> Result<(), SinkError> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| SinkError::Init {
                kind: OutputType::File,
                source,
            })?;
        debug!("File sink writing to {}", self.path.display());

        self.file = Some(file);
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<usize, SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::NotInitialized)?;

        for chunk in chunks(record, self.chunk_size) {
            file.write_all(chunk).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;

        Ok(record.len())
    }
}
