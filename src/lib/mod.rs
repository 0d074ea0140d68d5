//! ## Pool Client
//!
//! A mining pool client speaking the CryptoNote flavour of stratum: newline-delimited JSON-RPC
//! over TCP with `login`, `submit` and `keepalived` requests and `job` notifications.
//!
//! The building blocks live in the sub-modules:
//! - [`client`]: the connection state machine, its tokio driver and the listener boundary.
//! - [`frame`], [`json_rpc`], [`protocol`]: line framing, JSON-RPC envelopes and the pool
//!   protocol messages.
//! - [`job`], [`pending`], [`endpoint`]: jobs and results, outstanding submissions and pool
//!   endpoints.
//!
//! [`PoolClient`] ties them together for the binary: one connection per configured pool, every
//! [`ClientEvent`] logged, and a graceful disconnect on Ctrl+C.
use async_channel::unbounded;
use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    client::{listener::ClientEvent, Client, ClientHandle, Connection, FAILURES_DISCONNECTED},
    config::ClientConfig,
    error::ClientResult,
    task_manager::TaskManager,
};

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod job;
pub mod json_rpc;
pub mod logging;
pub mod pending;
pub mod protocol;
mod task_manager;

/// How long shutdown waits for every pool to report its final closure.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one connection per configured pool.
#[derive(Clone, Debug)]
pub struct PoolClient {
    config: ClientConfig,
}

impl PoolClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Runs until Ctrl+C.
    pub async fn start(self) -> ClientResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Ctrl+C received, disconnecting from pools...");
        })
        .await
    }

    /// Runs until `shutdown` completes, then disconnects every pool.
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> ClientResult<()> {
        info!("Starting pool client...");
        self.config.validate()?;

        let task_manager = Arc::new(TaskManager::new());
        let (event_sender, event_receiver) = unbounded::<ClientEvent>();
        let settings = self.config.client_settings();

        let mut handles: Vec<ClientHandle> = Vec::with_capacity(self.config.pools.len());
        for (id, endpoint) in self.config.pools.iter().enumerate() {
            let id = id as u32;
            let client = Client::new(id, endpoint.clone(), settings.clone(), event_sender.clone());
            let (connection, handle) = Connection::new(client);
            task_manager.spawn(id, async move {
                connection.run().await;
            });
            handle.connect().await?;
            info!("Pool #{id}: {endpoint}");
            handles.push(handle);
        }
        drop(event_sender);

        let mut log = EventLog::default();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = event_receiver.recv() => match event {
                    Ok(event) => log.record(&event),
                    Err(_) => {
                        warn!("All pool connections stopped.");
                        break;
                    }
                }
            }
        }

        let mut open: HashSet<u32> = HashSet::new();
        for handle in &handles {
            match handle.shutdown().await {
                Ok(()) => {
                    open.insert(handle.id());
                }
                Err(e) => debug!("Pool #{} already stopped: {e}", handle.id()),
            }
        }

        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            while !open.is_empty() {
                let Ok(event) = event_receiver.recv().await else {
                    break;
                };
                if let ClientEvent::Closed {
                    client_id,
                    failures: FAILURES_DISCONNECTED,
                } = event
                {
                    open.remove(&client_id);
                }
                log.record(&event);
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!("Joining connection tasks...");
                task_manager.join_all().await;
            }
            Err(_) => {
                warn!("Graceful shutdown timed out after {SHUTDOWN_TIMEOUT:?}, forcing shutdown.");
                task_manager.abort_all();
            }
        }
        info!(
            "Pool client stopped: {} accepted, {} rejected.",
            log.accepted, log.rejected
        );
        Ok(())
    }
}

/// Logs connection events and keeps the share tally.
#[derive(Debug, Default)]
struct EventLog {
    accepted: u64,
    rejected: u64,
}

impl EventLog {
    fn record(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::LoginSuccess { client_id } => {
                info!("Pool #{client_id}: login succeeded");
            }
            ClientEvent::JobReceived { client_id, job } => {
                info!(
                    "Pool #{client_id}: new job {} diff {}",
                    job.id(),
                    job.difficulty()
                );
            }
            ClientEvent::ResultAccepted {
                client_id,
                difficulty,
                elapsed_ms,
                error: None,
            } => {
                self.accepted += 1;
                info!(
                    "Pool #{client_id}: accepted ({}/{}) diff {difficulty} ({elapsed_ms} ms)",
                    self.accepted, self.rejected
                );
            }
            ClientEvent::ResultAccepted {
                client_id,
                difficulty,
                elapsed_ms,
                error: Some(error),
            } => {
                self.rejected += 1;
                warn!(
                    "Pool #{client_id}: rejected ({}/{}) diff {difficulty} \"{error}\" ({elapsed_ms} ms)",
                    self.accepted, self.rejected
                );
            }
            ClientEvent::Closed {
                client_id,
                failures: FAILURES_DISCONNECTED,
            } => {
                info!("Pool #{client_id}: disconnected");
            }
            ClientEvent::Closed {
                client_id,
                failures,
            } => {
                warn!("Pool #{client_id}: connection lost, failed attempts: {failures}");
            }
        }
    }
}
