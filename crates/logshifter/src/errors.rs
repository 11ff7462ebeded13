// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the relay, one enum per concern.

use std::io;
use std::path::PathBuf;

use crate::config::OutputType;
use crate::record::Record;

/// Misuse of the bounded queue. These are programming errors; the shifter
/// guarantees it never triggers them.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,
    #[error("enqueue after close ({} byte record rejected)", .0.len())]
    Closed(Record),
    #[error("queue closed twice")]
    AlreadyClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to initialize {kind} sink: {source}")]
    Init {
        kind: OutputType,
        #[source]
        source: io::Error,
    },
    #[error("sink write failed: {0}")]
    Write(#[from] io::Error),
    #[error("sink used before init")]
    NotInitialized,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Startup-fatal and internal failures surfaced by [`crate::shifter::Shifter::run`].
/// Steady-state conditions (evictions, write failures, stats output) are never
/// reported here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    SinkInit(SinkError),
    #[error("queue misuse: {0}")]
    Queue(#[from] QueueError),
    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("queuesize must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "invalid configuration: queuesize must be greater than 0"
        );

        let error = QueueError::Closed(Record::from(&b"abc"[..]));
        assert_eq!(error.to_string(), "enqueue after close (3 byte record rejected)");
    }

    #[test]
    fn test_sink_init_error_keeps_source() {
        use std::error::Error;

        let error = SinkError::Init {
            kind: OutputType::File,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(error.to_string(), "failed to initialize file sink: denied");
        assert!(error.source().is_some());

        let pipeline = PipelineError::SinkInit(error);
        assert_eq!(pipeline.to_string(), "failed to initialize file sink: denied");
    }

    #[test]
    fn test_config_error_converts_to_invalid_config() {
        let pipeline: PipelineError = ConfigError::Invalid("bad".into()).into();
        assert!(matches!(pipeline, PipelineError::InvalidConfig(_)));
    }
}
