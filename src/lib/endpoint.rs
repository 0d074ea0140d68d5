//! Pool endpoint descriptor: where to connect and with which credentials.
use serde::Deserialize;
use std::{fmt, str::FromStr};

use crate::error::ClientError;

const SCHEME: &str = "stratum+tcp://";

fn default_credential() -> String {
    "x".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PoolEndpoint {
    /// Hostname or IPv4 address of the pool.
    pub address: String,
    pub port: u16,
    #[serde(default = "default_credential")]
    pub user: String,
    #[serde(default = "default_credential")]
    pub password: String,
    /// Send `keepalived` pings after an idle period.
    #[serde(default)]
    pub keepalive: bool,
    /// Pool hands out jobs with a fixed nonce prefix.
    #[serde(default)]
    pub nicehash: bool,
}

impl PoolEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            user: default_credential(),
            password: default_credential(),
            keepalive: false,
            nicehash: false,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_nicehash(mut self, nicehash: bool) -> Self {
        self.nicehash = nicehash;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.address.is_empty() && self.port > 0 && !self.address.contains(char::is_whitespace)
    }
}

impl fmt::Display for PoolEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Parses `host:port`, optionally prefixed with `stratum+tcp://`.
impl FromStr for PoolEndpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = match s.find("://") {
            Some(_) => s
                .strip_prefix(SCHEME)
                .ok_or_else(|| ClientError::InvalidEndpoint(s.to_string()))?,
            None => s,
        };
        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| ClientError::InvalidEndpoint(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ClientError::InvalidEndpoint(s.to_string()))?;

        let endpoint = PoolEndpoint::new(host, port);
        if !endpoint.is_valid() {
            return Err(ClientError::InvalidEndpoint(s.to_string()));
        }
        Ok(endpoint)
    }
}
