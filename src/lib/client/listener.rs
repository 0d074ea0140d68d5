//! The outward interface of a connection.
//!
//! A [`ClientListener`] is told about logins, jobs, submission outcomes and closures. The
//! implementation for `async_channel::Sender<ClientEvent>` turns every callback into a
//! [`ClientEvent`] so that the owner of many connections can consume them from one place.
use async_channel::Sender;
use std::{fmt, net::Ipv4Addr};
use tracing::warn;

use crate::job::Job;

/// Identity of the connection a callback comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: u32,
    pub host: String,
    pub port: u16,
    /// Address the host resolved to on the last lookup.
    pub ip: Option<Ipv4Addr>,
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub trait ClientListener {
    fn on_login_success(&mut self, client: &ClientInfo);

    fn on_job_received(&mut self, client: &ClientInfo, job: &Job);

    /// Outcome of a submission. `error` is `None` when the pool accepted the result.
    fn on_result_accepted(
        &mut self,
        client: &ClientInfo,
        difficulty: u64,
        elapsed_ms: u64,
        error: Option<&str>,
    );

    /// `failures` is the number of consecutive failed attempts, or `-1` after a deliberate
    /// disconnect (no retry follows).
    fn on_close(&mut self, client: &ClientInfo, failures: i32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    LoginSuccess {
        client_id: u32,
    },
    JobReceived {
        client_id: u32,
        job: Job,
    },
    ResultAccepted {
        client_id: u32,
        difficulty: u64,
        elapsed_ms: u64,
        error: Option<String>,
    },
    Closed {
        client_id: u32,
        failures: i32,
    },
}

impl ClientEvent {
    pub fn client_id(&self) -> u32 {
        match self {
            ClientEvent::LoginSuccess { client_id }
            | ClientEvent::JobReceived { client_id, .. }
            | ClientEvent::ResultAccepted { client_id, .. }
            | ClientEvent::Closed { client_id, .. } => *client_id,
        }
    }
}

/// Collects events in order. Handy to inspect a connection without a runtime.
impl ClientListener for Vec<ClientEvent> {
    fn on_login_success(&mut self, client: &ClientInfo) {
        self.push(ClientEvent::LoginSuccess {
            client_id: client.id,
        });
    }

    fn on_job_received(&mut self, client: &ClientInfo, job: &Job) {
        self.push(ClientEvent::JobReceived {
            client_id: client.id,
            job: job.clone(),
        });
    }

    fn on_result_accepted(
        &mut self,
        client: &ClientInfo,
        difficulty: u64,
        elapsed_ms: u64,
        error: Option<&str>,
    ) {
        self.push(ClientEvent::ResultAccepted {
            client_id: client.id,
            difficulty,
            elapsed_ms,
            error: error.map(str::to_string),
        });
    }

    fn on_close(&mut self, client: &ClientInfo, failures: i32) {
        self.push(ClientEvent::Closed {
            client_id: client.id,
            failures,
        });
    }
}

impl ClientListener for Sender<ClientEvent> {
    fn on_login_success(&mut self, client: &ClientInfo) {
        forward(
            self,
            ClientEvent::LoginSuccess {
                client_id: client.id,
            },
        );
    }

    fn on_job_received(&mut self, client: &ClientInfo, job: &Job) {
        forward(
            self,
            ClientEvent::JobReceived {
                client_id: client.id,
                job: job.clone(),
            },
        );
    }

    fn on_result_accepted(
        &mut self,
        client: &ClientInfo,
        difficulty: u64,
        elapsed_ms: u64,
        error: Option<&str>,
    ) {
        forward(
            self,
            ClientEvent::ResultAccepted {
                client_id: client.id,
                difficulty,
                elapsed_ms,
                error: error.map(str::to_string),
            },
        );
    }

    fn on_close(&mut self, client: &ClientInfo, failures: i32) {
        forward(
            self,
            ClientEvent::Closed {
                client_id: client.id,
                failures,
            },
        );
    }
}

fn forward(sender: &Sender<ClientEvent>, event: ClientEvent) {
    if let Err(e) = sender.try_send(event) {
        warn!("Dropping client event, listener channel unavailable: {e:?}");
    }
}
