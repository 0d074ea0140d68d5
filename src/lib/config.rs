//! ## Pool Client Configuration
//!
//! Defines [`ClientConfig`], deserialized from the TOML file given on the command line.
//!
//! Every tunable has a default, so a configuration only needs its `[[pools]]` entries:
//!
//! ```toml
//! [[pools]]
//! address = "pool.example.com"
//! port = 3333
//! user = "wallet"
//! ```
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    client::{
        ClientSettings, DEFAULT_KEEPALIVE_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRY_PAUSE,
    },
    endpoint::PoolEndpoint,
    error::{ClientError, ClientResult},
    frame::DEFAULT_RECV_BUFFER_SIZE,
};

fn default_agent() -> String {
    ClientSettings::default().agent
}

fn default_retry_pause_ms() -> u64 {
    DEFAULT_RETRY_PAUSE.as_millis() as u64
}

fn default_response_timeout_secs() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT.as_secs()
}

fn default_keepalive_timeout_secs() -> u64 {
    DEFAULT_KEEPALIVE_TIMEOUT.as_secs()
}

fn default_recv_buffer_size() -> usize {
    DEFAULT_RECV_BUFFER_SIZE
}

/// Configuration for the pool client.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// User-agent sent with every login.
    #[serde(default = "default_agent")]
    pub agent: String,
    /// Silences connection warnings and errors.
    #[serde(default)]
    pub quiet: bool,
    /// Pause between a lost connection and the next attempt.
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
    /// How long a sent request may stay without any message from the pool.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    /// Idle time before a keepalive ping, for pools with `keepalive = true`.
    #[serde(default = "default_keepalive_timeout_secs")]
    pub keepalive_timeout_secs: u64,
    /// Receive buffer size, which is also the longest accepted line.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
    /// One connection is opened per entry.
    pub pools: Vec<PoolEndpoint>,
    /// The path to the log file.
    log_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(pools: Vec<PoolEndpoint>) -> Self {
        Self {
            agent: default_agent(),
            quiet: false,
            retry_pause_ms: default_retry_pause_ms(),
            response_timeout_secs: default_response_timeout_secs(),
            keepalive_timeout_secs: default_keepalive_timeout_secs(),
            recv_buffer_size: default_recv_buffer_size(),
            pools,
            log_file: None,
        }
    }

    pub fn set_log_file(&mut self, log_file: Option<PathBuf>) {
        if let Some(file) = log_file {
            self.log_file = Some(file);
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Rejects configurations no connection could run with.
    pub fn validate(&self) -> ClientResult<()> {
        if self.pools.is_empty() {
            return Err(ClientError::InvalidEndpoint("no pools configured".to_string()));
        }
        if let Some(pool) = self.pools.iter().find(|pool| !pool.is_valid()) {
            return Err(ClientError::InvalidEndpoint(pool.to_string()));
        }
        let zero = [
            ("response_timeout_secs", self.response_timeout_secs == 0),
            ("keepalive_timeout_secs", self.keepalive_timeout_secs == 0),
            ("recv_buffer_size", self.recv_buffer_size == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ClientError::InvalidConfig(format!("`{field}` must be greater than 0")));
        }
        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            agent: self.agent.clone(),
            quiet: self.quiet,
            retry_pause: Duration::from_millis(self.retry_pause_ms),
            response_timeout: Duration::from_secs(self.response_timeout_secs),
            keepalive_timeout: Duration::from_secs(self.keepalive_timeout_secs),
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}
