// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream destinations for records.
//!
//! A sink owns its transport and is responsible for splitting records longer
//! than its chunk size into consecutive chunks, each written as an
//! independent transport write.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::{Config, OutputType};
use crate::errors::SinkError;
use crate::record::Record;

pub mod file;
#[cfg(unix)]
pub mod syslog;

pub use file::FileSink;
#[cfg(unix)]
pub use syslog::SyslogSink;

#[async_trait]
pub trait Sink: Send {
    /// Sets up the transport. Calling it again on an initialized sink is a
    /// no-op. A failure here is fatal to pipeline startup.
    async fn init(&mut self) -> Result<(), SinkError>;

    /// Writes `record`, chunked to the sink's limit. Returns the number of
    /// record bytes written.
    async fn write(&mut self, record: &Record) -> Result<usize, SinkError>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    async fn init(&mut self) -> Result<(), SinkError> {
        (**self).init().await
    }

    async fn write(&mut self, record: &Record) -> Result<usize, SinkError> {
        (**self).write(record).await
    }
}

/// Splits `bytes` into consecutive chunks of exactly `chunk_size` bytes, the
/// last one possibly shorter. A `chunk_size` of 0 disables splitting.
pub fn chunks(bytes: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    let size = if chunk_size == 0 {
        bytes.len().max(1)
    } else {
        chunk_size
    };
    bytes.chunks(size)
}

/// Builds the sink selected by the configured (or environment-overridden)
/// output type. The sink is returned uninitialized.
pub fn build(config: &Config, output_type: OutputType, tag: &str) -> Box<dyn Sink> {
    match output_type {
        OutputType::File => {
            let path: PathBuf = config.file_writer_dir().join(tag);
            Box::new(FileSink::new(path, config.file_chunk_size))
        }
        #[cfg(unix)]
        OutputType::Syslog => Box::new(SyslogSink::new(
            config.syslog_socket.clone(),
            tag,
            config.syslog_chunk_size,
        )),
        #[cfg(not(unix))]
        OutputType::Syslog => {
            tracing::warn!("syslog is unavailable on this platform, writing to a file instead");
            let path: PathBuf = config.file_writer_dir().join(tag);
            Box::new(FileSink::new(path, config.file_chunk_size))
        }
    }
}
