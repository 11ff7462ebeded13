// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::net::UnixDatagram;
use tracing::debug;

use crate::config::OutputType;
use crate::constants::SYSLOG_PRIORITY;
use crate::errors::SinkError;
use crate::record::Record;
use crate::sink::{chunks, Sink};

/// Sends records to the local syslog daemon over its unix datagram socket.
/// Each chunk becomes its own message; the datagram frames it, so no
/// delimiter is added.
#[derive(Debug)]
pub struct SyslogSink {
    socket_path: PathBuf,
    /// `<PRI>tag[pid]: ` prepended to every message
    header: Vec<u8>,
    chunk_size: usize,
    socket: Option<UnixDatagram>,
}

impl SyslogSink {
    #[must_use]
    pub fn new(socket_path: PathBuf, tag: &str, chunk_size: usize) -> Self {
        let header = format!("<{}>{}[{}]: ", SYSLOG_PRIORITY, tag, std::process::id());
        Self {
            socket_path,
            header: header.into_bytes(),
            chunk_size,
            socket: None,
        }
    }

    fn init_error(source: std::io::Error) -> SinkError {
        SinkError::Init {
            kind: OutputType::Syslog,
            source,
        }
    }
}

#[async_trait]
impl Sink for SyslogSink {
    async fn init(&mut self) -> Result<(), SinkError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = UnixDatagram::unbound().map_err(Self::init_error)?;
        socket
            .connect(&self.socket_path)
            .map_err(Self::init_error)?;
        debug!("Syslog sink connected to {}", self.socket_path.display());

        self.socket = Some(socket);
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<usize, SinkError> {
        let socket = self.socket.as_ref().ok_or(SinkError::NotInitialized)?;

        let mut message = Vec::with_capacity(self.header.len() + record.len());
        for chunk in chunks(record, self.chunk_size) {
            message.clear();
            message.extend_from_slice(&self.header);
            message.extend_from_slice(chunk);
            socket.send(&message).await?;
        }

        Ok(record.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(datagram: &[u8]) -> &[u8] {
        let start = datagram
            .windows(2)
            .position(|w| w == b": ")
            .expect("missing syslog header")
            + 2;
        &datagram[start..]
    }

    #[tokio::test]
    async fn test_sends_one_datagram_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sock");
        let server = UnixDatagram::bind(&path).unwrap();

        let mut sink = SyslogSink::new(path, "app", 4);
        sink.init().await.unwrap();
        assert_eq!(sink.write(&Record::from("abcdefghij")).await.unwrap(), 10);

        let mut buf = [0u8; 256];
        let mut received = Vec::new();
        for _ in 0..3 {
            let n = server.recv(&mut buf).await.unwrap();
            received.push(buf[..n].to_vec());
        }

        let header = format!("<14>app[{}]: ", std::process::id());
        assert!(received[0].starts_with(header.as_bytes()));
        let payloads: Vec<&[u8]> = received.iter().map(|d| payload(d)).collect();
        assert_eq!(payloads, vec![&b"abcd"[..], &b"efgh"[..], &b"ij"[..]]);
        assert!(payloads.iter().all(|p| !p.ends_with(b"\n")));
    }

    #[tokio::test]
    async fn test_init_fails_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SyslogSink::new(dir.path().join("absent.sock"), "app", 0);

        assert!(matches!(
            sink.init().await,
            Err(SinkError::Init {
                kind: OutputType::Syslog,
                ..
            })
        ));
        assert!(matches!(
            sink.write(&Record::from("x")).await,
            Err(SinkError::NotInitialized)
        ));
    }
}
