// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log-shipping relay: reads newline-delimited records from an upstream byte
//! stream and forwards them to syslog or a file through a bounded, lossy queue,
//! so a slow sink never stalls the producer.
//!
//! ```text
//! upstream ──▶ Reader ──▶ BoundedLossyQueue ──▶ Writer ──▶ Sink
//!                 ▲                                ▲
//!                 └──── ResetWindow ── Stats ──────┘
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod errors;
pub mod queue;
pub mod reader;
pub mod record;
pub mod shifter;
pub mod sink;
pub mod stats;
pub mod writer;
