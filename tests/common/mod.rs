//! Scripted fake pool used by the integration tests.
#![allow(dead_code)]

use async_channel::Receiver;
use pool_client::{
    client::{listener::ClientEvent, Client, ClientHandle, ClientSettings, Connection},
    endpoint::PoolEndpoint,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener,
    },
    task::JoinHandle,
    time::timeout,
};

pub const WAIT: Duration = Duration::from_secs(5);
pub const TARGET: &str = "b88d0600";

/// Job parameters with a 76-byte blob whose first byte is `fill`.
pub fn job(job_id: &str, fill: u8) -> Value {
    let mut blob = vec![0u8; 76];
    blob[0] = fill;
    json!({ "job_id": job_id, "blob": hex::encode(blob), "target": TARGET })
}

pub struct FakePool {
    listener: TcpListener,
}

impl FakePool {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub fn endpoint(&self) -> PoolEndpoint {
        PoolEndpoint::new("127.0.0.1", self.port()).with_credentials("wallet", "rig")
    }

    pub async fn accept(&self) -> PoolSession {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("no connection attempt")
            .unwrap();
        let (reader, writer) = stream.into_split();
        PoolSession {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn expect_no_connection(&self, wait: Duration) {
        assert!(
            timeout(wait, self.listener.accept()).await.is_err(),
            "client reconnected"
        );
    }

    /// Accepts a connection, checks the login request and answers it with `job`.
    pub async fn accept_login(&self, session_id: &str, job: Value) -> PoolSession {
        let mut session = self.accept().await;
        let login = session.recv().await;
        assert_eq!(login["id"], 1);
        assert_eq!(login["method"], "login");
        session
            .reply(1, json!({ "id": session_id, "job": job, "status": "OK" }))
            .await;
        session
    }
}

pub struct PoolSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl PoolSession {
    pub async fn recv(&mut self) -> Value {
        let line = timeout(WAIT, self.lines.next_line())
            .await
            .expect("no request from client")
            .unwrap()
            .expect("client closed the connection");
        serde_json::from_str(&line).unwrap()
    }

    pub async fn send_raw(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
    }

    pub async fn send(&mut self, message: Value) {
        self.send_raw(&(message.to_string() + "\n")).await;
    }

    pub async fn reply(&mut self, id: u64, result: Value) {
        self.send(json!({ "id": id, "jsonrpc": "2.0", "error": null, "result": result }))
            .await;
    }

    pub async fn reply_error(&mut self, id: u64, message: &str) {
        self.send(json!({
            "id": id,
            "jsonrpc": "2.0",
            "error": { "code": -1, "message": message }
        }))
        .await;
    }

    pub async fn notify_job(&mut self, job: Value) {
        self.send(json!({ "jsonrpc": "2.0", "method": "job", "params": job }))
            .await;
    }

    /// Waits until the client closes its side.
    pub async fn expect_closed(&mut self) {
        let line = timeout(WAIT, self.lines.next_line())
            .await
            .expect("client kept the connection open");
        assert!(matches!(line, Ok(None) | Err(_)), "unexpected line {line:?}");
    }
}

pub struct Spawned {
    pub handle: ClientHandle,
    pub events: Receiver<ClientEvent>,
    pub task: JoinHandle<Client<async_channel::Sender<ClientEvent>>>,
}

pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        retry_pause: Duration::from_millis(50),
        ..Default::default()
    }
}

pub async fn spawn_client(id: u32, endpoint: PoolEndpoint, settings: ClientSettings) -> Spawned {
    let (sender, events) = async_channel::unbounded();
    let client = Client::new(id, endpoint, settings, sender);
    let (connection, handle) = Connection::new(client);
    let task = tokio::spawn(connection.run());
    handle.connect().await.unwrap();
    Spawned {
        handle,
        events,
        task,
    }
}

pub async fn next_event(events: &Receiver<ClientEvent>) -> ClientEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("no client event")
        .unwrap()
}
