//! Tokio driver for a [`Client`].
//!
//! A [`Connection`] owns one client together with its socket and runs as a single task. It
//! executes the actions the client queues (lookups, connects, writes, teardown), feeds socket
//! reads and timer expiries back into it and accepts commands from any number of
//! [`ClientHandle`]s.
//!
//! Writes go through an unbounded channel to a dedicated writer task, so queuing a line never
//! waits on the socket.
use async_channel::{unbounded, Receiver, Sender};
use std::{
    future::{pending, Future},
    io,
    net::{Ipv4Addr, SocketAddr},
    pin::Pin,
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
    net::{
        lookup_host,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    task::JoinHandle,
    time::{sleep_until, timeout, Instant},
};
use tracing::{debug, info, warn};

use super::{listener::ClientListener, Action, Client, ClientState};
use crate::{
    error::{ClientError, ClientResult},
    job::JobResult,
};

/// How long teardown waits for queued lines to be flushed.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Submit(JobResult),
    /// Disconnect, then stop the connection task once the socket is gone.
    Shutdown,
}

/// Cloneable remote control of a running [`Connection`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: u32,
    commands: Sender<Command>,
}

impl ClientHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub async fn connect(&self) -> ClientResult<()> {
        self.send(Command::Connect).await
    }

    pub async fn disconnect(&self) -> ClientResult<()> {
        self.send(Command::Disconnect).await
    }

    pub async fn submit(&self, result: JobResult) -> ClientResult<()> {
        self.send(Command::Submit(result)).await
    }

    pub async fn shutdown(&self) -> ClientResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> ClientResult<()> {
        if self.commands.is_closed() {
            return Err(ClientError::Shutdown);
        }
        self.commands.send(command).await?;
        Ok(())
    }
}

pub struct Connection<L> {
    client: Client<L>,
    commands: Receiver<Command>,
    resolving: Option<BoxedFuture<ClientResult<Ipv4Addr>>>,
    connecting: Option<BoxedFuture<io::Result<TcpStream>>>,
    reader: Option<OwnedReadHalf>,
    outgoing: Option<Sender<String>>,
    writer: Option<JoinHandle<io::Result<()>>>,
    stopping: bool,
}

impl<L: ClientListener + Send + 'static> Connection<L> {
    pub fn new(client: Client<L>) -> (Self, ClientHandle) {
        let (sender, receiver) = unbounded();
        let handle = ClientHandle {
            id: client.id(),
            commands: sender,
        };
        let connection = Self {
            client,
            commands: receiver,
            resolving: None,
            connecting: None,
            reader: None,
            outgoing: None,
            writer: None,
            stopping: false,
        };
        (connection, handle)
    }

    /// Runs until a [`Command::Shutdown`] completes or every handle is dropped. Returns the
    /// client so its final state can be inspected.
    pub async fn run(mut self) -> Client<L> {
        loop {
            self.execute_actions().await;
            if self.stopping && self.is_idle() {
                break;
            }

            let timers = *self.client.timers();
            let response = timers.response.deadline();
            let keepalive = timers.keepalive.deadline();
            let retry = timers.retry.deadline();

            tokio::select! {
                command = self.commands.recv(), if !self.stopping => match command {
                    Ok(command) => self.on_command(command),
                    Err(_) => {
                        debug!("[{}] all handles dropped", self.client.info());
                        self.stop();
                    }
                },
                resolved = poll_slot(&mut self.resolving) => {
                    self.resolving = None;
                    self.client.on_resolved(resolved);
                }
                connected = poll_slot(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connected(connected);
                }
                read = read_into(self.reader.as_mut(), self.client.read_buffer()) => match read {
                    Ok(0) => self.client.on_read_error(None),
                    Ok(n) => self.client.on_read(n),
                    Err(e) => self.client.on_read_error(Some(e)),
                },
                written = join_writer(&mut self.writer) => {
                    self.writer = None;
                    let error = match written {
                        Ok(Ok(())) => io::Error::from(io::ErrorKind::BrokenPipe),
                        Ok(Err(e)) => e,
                        Err(e) => io::Error::other(e),
                    };
                    self.client.on_write_error(error);
                }
                _ = expire(response) => self.client.on_response_timeout(),
                _ = expire(keepalive) => self.client.on_keepalive_timeout(),
                _ = expire(retry) => self.client.on_retry_timeout(),
            }
        }
        info!("[{}] connection task stopped", self.client.info());
        self.client
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.client.connect(),
            Command::Disconnect => self.client.disconnect(),
            Command::Submit(result) => {
                self.client.submit(&result);
            }
            Command::Shutdown => self.stop(),
        }
    }

    fn stop(&mut self) {
        self.stopping = true;
        self.client.disconnect();
    }

    fn is_idle(&self) -> bool {
        self.client.state() == ClientState::Unconnected
            && self.resolving.is_none()
            && self.connecting.is_none()
            && self.reader.is_none()
    }

    fn on_connected(&mut self, result: io::Result<TcpStream>) {
        match result {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("[{}] failed to set TCP_NODELAY: {e}", self.client.info());
                }
                let (reader, writer) = stream.into_split();
                let (sender, receiver) = unbounded();
                self.writer = Some(tokio::spawn(write_lines(BufWriter::new(writer), receiver)));
                self.outgoing = Some(sender);
                self.reader = Some(reader);
                self.client.on_connected(Ok(()));
            }
            Err(e) => self.client.on_connected(Err(e)),
        }
    }

    async fn execute_actions(&mut self) {
        while let Some(action) = self.client.poll_action() {
            match action {
                Action::Resolve { host, port } => {
                    self.resolving = Some(Box::pin(resolve(host, port)));
                }
                Action::Connect(address) => {
                    self.connecting = Some(Box::pin(TcpStream::connect(address)));
                }
                Action::Send(line) => match &self.outgoing {
                    Some(outgoing) => {
                        if outgoing.send(line).await.is_err() {
                            self.client
                                .on_write_error(io::Error::from(io::ErrorKind::BrokenPipe));
                        }
                    }
                    None => debug!("[{}] no socket, line dropped", self.client.info()),
                },
                Action::Close => {
                    self.teardown().await;
                    self.client.on_closed();
                }
            }
        }
    }

    /// Drops the socket, giving the writer a short window to flush what is already queued.
    async fn teardown(&mut self) {
        self.connecting = None;
        self.reader = None;
        if let Some(outgoing) = self.outgoing.take() {
            outgoing.close();
        }
        if let Some(mut writer) = self.writer.take() {
            if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
                warn!("[{}] writer did not drain in time", self.client.info());
                writer.abort();
            }
        }
    }
}

/// First IPv4 address of `host`.
pub async fn resolve(host: String, port: u16) -> ClientResult<Ipv4Addr> {
    let addresses = lookup_host((host.as_str(), port))
        .await
        .map_err(|e| ClientError::Resolve(host.clone(), e))?;
    addresses
        .filter_map(|address| match address {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ClientError::NoIpv4Address(host.clone()))
}

async fn write_lines(
    mut writer: BufWriter<OwnedWriteHalf>,
    receiver: Receiver<String>,
) -> io::Result<()> {
    while let Ok(line) = receiver.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

async fn poll_slot<T>(slot: &mut Option<BoxedFuture<T>>) -> T {
    match slot {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn read_into(reader: Option<&mut OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => pending().await,
    }
}

async fn join_writer(
    writer: &mut Option<JoinHandle<io::Result<()>>>,
) -> Result<io::Result<()>, tokio::task::JoinError> {
    match writer {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
