// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/openshift/logshifter.conf";

pub const DEFAULT_TAG: &str = "logshifter";

pub const DEFAULT_SYSLOG_SOCKET: &str = "/dev/log";

/// Overrides `outputtype` when `outputtypefromenviron=true`.
pub const OUTPUT_TYPE_ENV_VAR: &str = "LOGSHIFTER_OUTPUT_TYPE";

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

/// facility `user` (1) * 8 + severity `info` (6)
pub const SYSLOG_PRIORITY: u8 = 14;

/// Evictions are logged at warn level once, then every this many drops.
pub const EVICTION_WARN_EVERY: u64 = 1_000;
