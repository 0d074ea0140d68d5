//! ## Error Module
//!
//! Defines [`ClientError`], the error type shared by the configuration layer, the connection
//! driver and the runner, together with the [`ClientResult`] alias.
//!
//! Errors raised while a connection is live never cross the listener boundary: the client core
//! logs them and turns them into a close or a dropped message. `ClientError` is what the
//! surrounding plumbing (config loading, the resolver hookup, channel sends) reports.
use std::fmt;

use crate::{frame::FrameError, job::JobError};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug)]
pub enum ClientError {
    /// I/O-related error.
    Io(std::io::Error),
    /// Error while loading or deserializing the TOML configuration.
    Config(ext_config::ConfigError),
    /// Configuration loaded, but holds a value no connection can run with.
    InvalidConfig(String),
    /// Errors on bad CLI argument input.
    BadCliArgs,
    /// Endpoint description could not be parsed or failed validation.
    InvalidEndpoint(String),
    /// Hostname lookup failed.
    Resolve(String, std::io::Error),
    /// Hostname resolved, but not to any IPv4 address.
    NoIpv4Address(String),
    /// Receive buffer overflow: a line longer than the buffer capacity.
    Frame(FrameError),
    /// Line is not a well-formed JSON value.
    Json(serde_json::Error),
    /// Job fields missing or malformed.
    Job(JobError),
    /// Server rejected the login request.
    Login(String),
    /// Command could not be delivered to a connection task.
    ChannelSend,
    /// Connection task is gone.
    Shutdown,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ClientError::*;
        match self {
            Io(e) => write!(f, "I/O error: `{e:?}`"),
            Config(e) => write!(f, "Config error: {e:?}"),
            InvalidConfig(e) => write!(f, "Invalid configuration: {e}"),
            BadCliArgs => write!(f, "Bad CLI arg input"),
            InvalidEndpoint(e) => write!(f, "Invalid pool endpoint: `{e}`"),
            Resolve(host, e) => write!(f, "DNS error for `{host}`: {e}"),
            NoIpv4Address(host) => write!(f, "No IPv4 address found for `{host}`"),
            Frame(e) => write!(f, "Framing error: {e}"),
            Json(e) => write!(f, "JSON decode failed: `{e}`"),
            Job(e) => write!(f, "Job error: {e}"),
            Login(message) => write!(f, "Login rejected: `{message}`"),
            ChannelSend => write!(f, "Channel sender error"),
            Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<ext_config::ConfigError> for ClientError {
    fn from(e: ext_config::ConfigError) -> Self {
        ClientError::Config(e)
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        ClientError::Frame(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Json(e)
    }
}

impl From<JobError> for ClientError {
    fn from(e: JobError) -> Self {
        ClientError::Job(e)
    }
}

impl<T> From<async_channel::SendError<T>> for ClientError {
    fn from(_e: async_channel::SendError<T>) -> Self {
        ClientError::ChannelSend
    }
}
