// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};

pub mod mocks;

/// `count` lines of `line_len - 1` zeros, each followed by `\n`.
pub fn synthetic_input(count: usize, line_len: usize) -> Vec<u8> {
    let mut line = vec![b'0'; line_len - 1];
    line.push(b'\n');
    line.repeat(count)
}

/// A slow producer: feeds `input` through an in-memory pipe `chunk_size`
/// bytes at a time, pausing `delay` before each write. Must be called from
/// within a runtime.
pub fn trickle(input: Vec<u8>, chunk_size: usize, delay: Duration) -> DuplexStream {
    let (client, mut server) = tokio::io::duplex(chunk_size.max(1) * 4);
    tokio::spawn(async move {
        for chunk in input.chunks(chunk_size.max(1)) {
            tokio::time::sleep(delay).await;
            if server.write_all(chunk).await.is_err() {
                return;
            }
        }
    });
    client
}
