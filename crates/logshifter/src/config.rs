// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `key=value` configuration file.
//!
//! ```text
//! queuesize=1000
//! inputbuffersize=2048
//! outputtype=syslog
//! syslogbuffersize=2048
//! filebuffersize=2048
//! outputtypefromenviron=true
//! filewriterdir=~/app-root/logs
//! ```
//!
//! Malformed values fall back to zero / false / syslog; [`Config::validate`]
//! then rejects the ones the pipeline cannot run with.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

use crate::constants::{DEFAULT_SYSLOG_SOCKET, OUTPUT_TYPE_ENV_VAR};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    #[default]
    Syslog,
    File,
}

impl FromStr for OutputType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syslog" => Ok(OutputType::Syslog),
            "file" => Ok(OutputType::File),
            other => Err(ConfigError::Invalid(format!(
                "unknown output type '{other}', expected 'syslog' or 'file'"
            ))),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputType::Syslog => write!(f, "syslog"),
            OutputType::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub queue_size: usize,
    /// Longest line read as a single record.
    pub input_buffer_size: usize,
    pub output_type: OutputType,
    /// 0 disables chunking
    pub syslog_chunk_size: usize,
    /// 0 disables chunking
    pub file_chunk_size: usize,
    pub output_type_from_environ: bool,
    pub file_writer_dir: PathBuf,
    pub syslog_socket: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_size: 0,
            input_buffer_size: 0,
            output_type: OutputType::Syslog,
            syslog_chunk_size: 0,
            file_chunk_size: 0,
            output_type_from_environ: false,
            file_writer_dir: PathBuf::from("."),
            syslog_socket: PathBuf::from(DEFAULT_SYSLOG_SOCKET),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    /// Parses `key=value` lines. Parsing stops at the first line without a
    /// `=`; unknown keys are ignored.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut config = Self::default();

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                break;
            };
            let key = key.trim_matches(' ');
            let value = value.trim_matches(' ');

            match key {
                "queuesize" => config.queue_size = parse_or_default(key, value),
                "inputbuffersize" => config.input_buffer_size = parse_or_default(key, value),
                "outputtype" => config.output_type = parse_or_default(key, value),
                "syslogbuffersize" => config.syslog_chunk_size = parse_or_default(key, value),
                "filebuffersize" => config.file_chunk_size = parse_or_default(key, value),
                "outputtypefromenviron" => {
                    config.output_type_from_environ = parse_or_default(key, value);
                }
                "filewriterdir" => config.file_writer_dir = PathBuf::from(value),
                "syslogsocket" => config.syslog_socket = PathBuf::from(value),
                _ => debug!("Ignoring unknown config key '{key}'"),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "queuesize must be greater than 0".to_string(),
            ));
        }
        if self.input_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "inputbuffersize must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured output type, replaced by the environment override
    /// when `outputtypefromenviron` is set.
    #[must_use]
    pub fn effective_output_type(&self) -> OutputType {
        self.output_type_with_override(env::var(OUTPUT_TYPE_ENV_VAR).ok().as_deref())
    }

    fn output_type_with_override(&self, from_env: Option<&str>) -> OutputType {
        if !self.output_type_from_environ {
            return self.output_type;
        }
        match from_env.map(OutputType::from_str) {
            Some(Ok(output_type)) => output_type,
            Some(Err(e)) => {
                warn!("Ignoring {OUTPUT_TYPE_ENV_VAR}: {e}");
                self.output_type
            }
            None => self.output_type,
        }
    }

    /// `filewriterdir` with a leading `~/` expanded against `$HOME`.
    #[must_use]
    pub fn file_writer_dir(&self) -> PathBuf {
        match (self.file_writer_dir.strip_prefix("~"), env::var_os("HOME")) {
            (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
            _ => self.file_writer_dir.clone(),
        }
    }
}

fn parse_or_default<T: FromStr + Default>(key: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        warn!("Invalid value '{value}' for config key '{key}', using default");
        T::default()
    })
}
