//! ## Pool Connection
//!
//! [`Client`] is the state machine of one pool connection: it resolves the pool host, connects,
//! logs in, tracks the current job, submits results and reconnects with a fixed pause when the
//! connection is lost.
//!
//! The client performs no I/O itself. Every asynchronous completion is delivered through one of
//! the `on_*` methods and every side effect the client wants is queued as an [`Action`] for the
//! owner to execute, in order, through [`Client::poll_action`]. [`driver::Connection`] is the
//! tokio owner used by the binary; tests drive the client directly.
//!
//! State flow:
//!
//! ```text
//! Unconnected -> HostLookup -> Connecting -> Connected -> Closing -> Unconnected
//!       ^            |             |                                    |
//!       +-- retry <--+-------------+------------------------------------+
//! ```
//!
//! Request ids: the login request is always id `1` and every submit takes the next id. The
//! `keepalived` ping borrows the next id without consuming it.
pub mod driver;
pub mod listener;
pub mod timer;

use std::{collections::VecDeque, io, net::Ipv4Addr, net::SocketAddrV4, time::Duration};
use tracing::{debug, error, info, trace, warn};

use crate::{
    endpoint::PoolEndpoint,
    error::{ClientError, ClientResult},
    frame::{FrameReader, DEFAULT_RECV_BUFFER_SIZE},
    job::{Job, JobResult},
    json_rpc::{Message, Notification, Response},
    pending::{PendingRequests, PendingSubmission},
    protocol::{self, LOGIN_REQUEST_ID},
};
pub use driver::{ClientHandle, Command, Connection};
use listener::{ClientInfo, ClientListener};
use timer::Timers;

/// Failure count reported once a deliberate disconnect has been requested.
pub const FAILURES_DISCONNECTED: i32 = -1;
/// Error reported for submissions still unanswered when the connection closes.
pub const CONNECTION_CLOSED: &str = "connection closed";

pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(5000);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unconnected,
    HostLookup,
    Connecting,
    Connected,
    Closing,
}

/// Side effects requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Look up the first IPv4 address of `host`. Completion: [`Client::on_resolved`].
    Resolve { host: String, port: u16 },
    /// Open a TCP stream. Completion: [`Client::on_connected`].
    Connect(SocketAddrV4),
    /// Write one newline-terminated line.
    Send(String),
    /// Tear down the socket. Completion: [`Client::on_closed`].
    Close,
}

/// Tunables shared by every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// User-agent string sent with the login request.
    pub agent: String,
    /// Suppresses warnings and errors.
    pub quiet: bool,
    pub retry_pause: Duration,
    pub response_timeout: Duration,
    pub keepalive_timeout: Duration,
    pub recv_buffer_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            quiet: false,
            retry_pause: DEFAULT_RETRY_PAUSE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

pub struct Client<L> {
    info: ClientInfo,
    endpoint: PoolEndpoint,
    settings: ClientSettings,
    listener: L,
    state: ClientState,
    has_socket: bool,
    frames: FrameReader,
    /// Id of the next request.
    sequence: u64,
    /// Id carried by the last unanswered `keepalived` ping.
    keepalive_id: Option<u64>,
    failures: i32,
    session_id: String,
    job: Job,
    pending: PendingRequests,
    timers: Timers,
    actions: VecDeque<Action>,
}

impl<L: ClientListener> Client<L> {
    pub fn new(id: u32, endpoint: PoolEndpoint, settings: ClientSettings, listener: L) -> Self {
        Self {
            info: ClientInfo {
                id,
                host: endpoint.address.clone(),
                port: endpoint.port,
                ip: None,
            },
            frames: FrameReader::new(settings.recv_buffer_size),
            job: Job::new(id, endpoint.nicehash),
            endpoint,
            settings,
            listener,
            state: ClientState::Unconnected,
            has_socket: false,
            sequence: LOGIN_REQUEST_ID,
            keepalive_id: None,
            failures: 0,
            session_id: String::new(),
            pending: PendingRequests::new(),
            timers: Timers::default(),
            actions: VecDeque::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.info.id
    }

    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    pub fn endpoint(&self) -> &PoolEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn failures(&self) -> i32 {
        self.failures
    }

    /// Id the next submit will use.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Next side effect to execute, oldest first.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Where the next socket read must be stored before calling [`Client::on_read`].
    pub fn read_buffer(&mut self) -> &mut [u8] {
        self.frames.spare_mut()
    }

    /// Starts a connection attempt from scratch.
    ///
    /// During a host lookup that a disconnect has already doomed, the lookup is kept and the
    /// disconnect is withdrawn instead.
    pub fn connect(&mut self) {
        if self.state == ClientState::HostLookup && self.failures == FAILURES_DISCONNECTED {
            debug!("[{}] disconnect withdrawn, lookup in progress", self.info);
            self.failures = 0;
            return;
        }
        if self.state != ClientState::Unconnected {
            debug!("[{}] connect ignored, state {:?}", self.info, self.state);
            return;
        }
        self.timers.retry.stop();
        if self.failures == FAILURES_DISCONNECTED {
            self.failures = 0;
        }
        self.frames.clear();
        self.set_state(ClientState::HostLookup);
        self.actions.push_back(Action::Resolve {
            host: self.endpoint.address.clone(),
            port: self.endpoint.port,
        });
    }

    /// Closes the connection for good: no retry follows and the closure reports
    /// [`FAILURES_DISCONNECTED`].
    pub fn disconnect(&mut self) {
        self.timers.retry.stop();
        let already_requested = self.failures == FAILURES_DISCONNECTED;
        self.failures = FAILURES_DISCONNECTED;

        if self.state == ClientState::Unconnected {
            if !already_requested {
                self.listener.on_close(&self.info, FAILURES_DISCONNECTED);
            }
            return;
        }
        self.close();
    }

    /// Submits a result to the pool. Returns the request id, or `None` when nothing was sent.
    pub fn submit(&mut self, result: &JobResult) -> Option<u64> {
        if self.state != ClientState::Connected {
            debug!("[{}] submit dropped, state {:?}", self.info, self.state);
            return None;
        }
        if !self.job.is_valid() {
            debug!("[{}] submit dropped, not logged in", self.info);
            return None;
        }
        if self.keepalive_id == Some(self.sequence) {
            self.sequence += 1;
        }
        let id = self.sequence;

        let line = match protocol::submit_request(id, &self.session_id, result) {
            Ok(line) => line,
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] failed to encode submit: {e}", self.info);
                }
                return None;
            }
        };
        self.sequence += 1;
        self.pending
            .insert(id, PendingSubmission::new(result.difficulty));
        self.send(line);
        Some(id)
    }

    /// Resolver completion.
    pub fn on_resolved(&mut self, result: ClientResult<Ipv4Addr>) {
        if self.state != ClientState::HostLookup {
            debug!("[{}] stale resolve completion ignored", self.info);
            return;
        }
        let ip = match result {
            Ok(ip) => ip,
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] {e}", self.info);
                }
                return self.reconnect();
            }
        };
        self.info.ip = Some(ip);
        if self.failures == FAILURES_DISCONNECTED {
            return self.reconnect();
        }

        let address = SocketAddrV4::new(ip, self.endpoint.port);
        debug!("[{}] connecting to {address}", self.info);
        self.set_state(ClientState::Connecting);
        self.has_socket = true;
        self.actions.push_back(Action::Connect(address));
    }

    /// Connect completion.
    pub fn on_connected(&mut self, result: io::Result<()>) {
        if self.state != ClientState::Connecting {
            debug!("[{}] stale connect completion ignored", self.info);
            return;
        }
        if let Err(e) = result {
            if !self.settings.quiet {
                error!("[{}] connect error: \"{e}\"", self.info);
            }
            return self.close();
        }

        self.set_state(ClientState::Connected);
        self.login();
    }

    /// `n` bytes were read into [`Client::read_buffer`].
    pub fn on_read(&mut self, n: usize) {
        if self.state != ClientState::Connected {
            return;
        }
        let lines = match self.frames.commit(n) {
            Ok(lines) => lines,
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] {}", self.info, ClientError::from(e));
                }
                return self.close();
            }
        };
        for line in lines {
            if self.state != ClientState::Connected {
                break;
            }
            self.parse(&line);
        }
    }

    /// The socket reported end of stream (`None`) or a read error.
    pub fn on_read_error(&mut self, error: Option<io::Error>) {
        if let Some(e) = error {
            if !self.settings.quiet {
                error!("[{}] read error: \"{e}\"", self.info);
            }
        } else {
            debug!("[{}] connection closed by peer", self.info);
        }
        self.close();
    }

    pub fn on_write_error(&mut self, error: io::Error) {
        if !self.settings.quiet {
            error!("[{}] write error: \"{error}\"", self.info);
        }
        self.close();
    }

    /// Socket teardown completion.
    pub fn on_closed(&mut self) {
        if !self.has_socket {
            return;
        }
        self.has_socket = false;
        self.set_state(ClientState::Unconnected);

        for (id, entry) in self.pending.drain() {
            debug!("[{}] submit #{id} unanswered at close", self.info);
            self.listener.on_result_accepted(
                &self.info,
                entry.difficulty,
                entry.elapsed_ms(),
                Some(CONNECTION_CLOSED),
            );
        }
        self.reconnect();
    }

    pub fn on_response_timeout(&mut self) {
        if !self.timers.response.fire() {
            return;
        }
        if !self.settings.quiet {
            warn!("[{}] response timeout", self.info);
        }
        self.close();
    }

    pub fn on_keepalive_timeout(&mut self) {
        if self.timers.keepalive.fire() && self.state == ClientState::Connected {
            self.ping();
        }
    }

    pub fn on_retry_timeout(&mut self) {
        if self.timers.retry.fire() {
            self.connect();
        }
    }

    fn set_state(&mut self, state: ClientState) {
        if self.state != state {
            debug!("[{}] state {:?} -> {:?}", self.info, self.state, state);
            self.state = state;
        }
    }

    fn close(&mut self) {
        if matches!(
            self.state,
            ClientState::Unconnected | ClientState::Closing
        ) || !self.has_socket
        {
            return;
        }
        self.set_state(ClientState::Closing);
        self.actions.push_back(Action::Close);
    }

    fn reconnect(&mut self) {
        self.set_state(ClientState::Unconnected);
        self.timers.response.stop();
        self.timers.keepalive.stop();
        self.keepalive_id = None;

        if self.failures == FAILURES_DISCONNECTED {
            return self
                .listener
                .on_close(&self.info, FAILURES_DISCONNECTED);
        }

        self.failures += 1;
        self.listener.on_close(&self.info, self.failures);
        self.timers.retry.start(self.settings.retry_pause);
    }

    fn login(&mut self) {
        self.sequence = LOGIN_REQUEST_ID;
        self.keepalive_id = None;
        self.pending.clear();

        match protocol::login_request(
            &self.endpoint.user,
            &self.endpoint.password,
            &self.settings.agent,
        ) {
            Ok(line) => {
                self.sequence += 1;
                self.send(line);
            }
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] failed to encode login: {e}", self.info);
                }
                self.close();
            }
        }
    }

    fn ping(&mut self) {
        let id = self.sequence;
        match protocol::keepalive_request(id, &self.session_id) {
            Ok(line) => {
                if self.send(line) {
                    self.keepalive_id = Some(id);
                }
            }
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] failed to encode keepalive: {e}", self.info);
                }
            }
        }
    }

    fn send(&mut self, line: String) -> bool {
        if self.state != ClientState::Connected {
            debug!("[{}] send failed, invalid state {:?}", self.info, self.state);
            return false;
        }
        debug!("[{}] send ({} bytes): {}", self.info, line.len(), line.trim_end());
        self.actions.push_back(Action::Send(line));
        self.timers.response.start(self.settings.response_timeout);
        true
    }

    /// Any complete line counts as a sign of life.
    fn on_message_received(&mut self) {
        self.timers.response.stop();
        if self.endpoint.keepalive {
            self.timers.keepalive.start(self.settings.keepalive_timeout);
        }
    }

    fn parse(&mut self, line: &str) {
        self.on_message_received();
        if line.trim().is_empty() {
            debug!("[{}] empty line skipped", self.info);
            return;
        }
        debug!("[{}] received ({} bytes): {line}", self.info, line.len());

        match Message::parse(line) {
            Ok(message) => {
                trace!("[{}] decoded {message}", self.info);
                match message {
                    Message::Response(response) => self.parse_response(response),
                    Message::Notification(notification) => self.parse_notification(notification),
                }
            }
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] {}", self.info, ClientError::from(e));
                }
            }
        }
    }

    fn parse_notification(&mut self, notification: Notification) {
        if let Some(error) = notification.error {
            if !self.settings.quiet {
                error!("[{}] error: {error}", self.info);
            }
            return;
        }
        let Some(method) = notification.method else {
            return;
        };

        if method != protocol::METHOD_JOB {
            if !self.settings.quiet {
                warn!("[{}] unsupported method: \"{method}\"", self.info);
            }
            return;
        }

        match protocol::parse_job(
            notification.params.as_ref(),
            self.info.id,
            self.endpoint.nicehash,
        ) {
            Ok(job) if job == self.job => {
                if !self.settings.quiet {
                    warn!("[{}] duplicate job received, ignore", self.info);
                }
            }
            Ok(job) => {
                self.job = job;
                self.listener.on_job_received(&self.info, &self.job);
            }
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] {}", self.info, ClientError::from(e));
                }
            }
        }
    }

    fn parse_response(&mut self, response: Response) {
        let id = u64::try_from(response.id).ok();
        if id.is_some() && id == self.keepalive_id {
            self.keepalive_id = None;
            if response.error.is_none() {
                debug!("[{}] keepalive acknowledged", self.info);
                return;
            }
        }

        if let Some(error) = response.error {
            let message = error.message.as_deref().unwrap_or("unknown error");
            match id.and_then(|id| self.pending.take(id)) {
                Some(entry) => self.listener.on_result_accepted(
                    &self.info,
                    entry.difficulty,
                    entry.elapsed_ms(),
                    Some(message),
                ),
                None if self.settings.quiet => {}
                None if id == Some(LOGIN_REQUEST_ID) => {
                    error!("[{}] {}", self.info, ClientError::Login(message.to_string()));
                }
                None => error!("[{}] error: {error}", self.info),
            }
            if id == Some(LOGIN_REQUEST_ID) || protocol::is_auth_failure(message) {
                self.close();
            }
            return;
        }

        let Some(result) = response.result.filter(|r| r.is_object()) else {
            return;
        };

        if id == Some(LOGIN_REQUEST_ID) {
            return self.on_login_result(&result);
        }

        if let Some(entry) = id.and_then(|id| self.pending.take(id)) {
            self.listener
                .on_result_accepted(&self.info, entry.difficulty, entry.elapsed_ms(), None);
        }
    }

    fn on_login_result(&mut self, result: &serde_json::Value) {
        match protocol::parse_login(result, self.info.id, self.endpoint.nicehash) {
            Ok((session_id, job)) => {
                info!("[{}] logged in, session {session_id}", self.info);
                self.failures = 0;
                self.session_id = session_id;
                self.job = job;
                self.listener.on_login_success(&self.info);
                self.listener.on_job_received(&self.info, &self.job);
            }
            Err(e) => {
                if !self.settings.quiet {
                    error!("[{}] login error code: {}", self.info, e.code());
                }
                self.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listener::ClientEvent;

    const TARGET: &str = "b88d0600";

    fn blob(fill: u8) -> String {
        hex::encode(vec![fill; 76])
    }

    fn login_ok(job_id: &str) -> String {
        format!(
            r#"{{"id":1,"jsonrpc":"2.0","error":null,"result":{{"id":"sess-1","job":{{"job_id":"{job_id}","blob":"{}","target":"{TARGET}"}},"status":"OK"}}}}"#,
            blob(0x11)
        ) + "\n"
    }

    fn job_notification(job_id: &str, fill: u8) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","method":"job","params":{{"job_id":"{job_id}","blob":"{}","target":"{TARGET}"}}}}"#,
            blob(fill)
        ) + "\n"
    }

    fn client(endpoint: PoolEndpoint) -> Client<Vec<ClientEvent>> {
        let settings = ClientSettings {
            agent: "test-agent/1.0".to_string(),
            ..Default::default()
        };
        Client::new(0, endpoint, settings, Vec::new())
    }

    fn actions(client: &mut Client<Vec<ClientEvent>>) -> Vec<Action> {
        std::iter::from_fn(|| client.poll_action()).collect()
    }

    fn feed(client: &mut Client<Vec<ClientEvent>>, data: &str) {
        let bytes = data.as_bytes();
        client.read_buffer()[..bytes.len()].copy_from_slice(bytes);
        client.on_read(bytes.len());
    }

    /// Connects and logs in, leaving the event and action queues empty.
    fn logged_in(endpoint: PoolEndpoint) -> Client<Vec<ClientEvent>> {
        let mut client = client(endpoint);
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        actions(&mut client);
        feed(&mut client, &login_ok("job-1"));
        client.listener_mut().clear();
        client
    }

    fn result_for(client: &Client<Vec<ClientEvent>>, nonce: u32) -> JobResult {
        JobResult::new(client.job(), nonce, [0xab; 32])
    }

    #[test]
    fn connect_resolves_then_connects_then_logs_in() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333).with_credentials("wallet", "w1"));
        client.connect();
        assert_eq!(client.state(), ClientState::HostLookup);
        assert_eq!(
            actions(&mut client),
            vec![Action::Resolve {
                host: "pool.example".to_string(),
                port: 3333
            }]
        );

        client.on_resolved(Ok(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(client.state(), ClientState::Connecting);
        assert_eq!(client.info().ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(
            actions(&mut client),
            vec![Action::Connect(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 3333))]
        );

        client.on_connected(Ok(()));
        assert_eq!(client.state(), ClientState::Connected);
        assert_eq!(
            actions(&mut client),
            vec![Action::Send(
                r#"{"id":1,"jsonrpc":"2.0","method":"login","params":{"login":"wallet","pass":"w1","agent":"test-agent/1.0"}}"#
                    .to_string()
                    + "\n"
            )]
        );
        assert!(client.timers().response.is_armed());
    }

    #[test]
    fn login_success_notifies_login_then_job() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        feed(&mut client, &login_ok("job-1"));

        assert_eq!(client.session_id(), "sess-1");
        assert_eq!(client.failures(), 0);
        assert_eq!(client.job().id(), "job-1");
        assert!(!client.timers().response.is_armed());
        let events = client.listener();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ClientEvent::LoginSuccess { client_id: 0 });
        assert!(matches!(&events[1], ClientEvent::JobReceived { job, .. } if job.id() == "job-1"));
    }

    #[test]
    fn duplicate_job_is_notified_once() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        feed(&mut client, &job_notification("job-2", 0x22));
        feed(&mut client, &job_notification("job-2", 0x22));
        assert_eq!(client.listener().len(), 1);

        feed(&mut client, &job_notification("job-2", 0x23));
        assert_eq!(client.listener().len(), 2);
    }

    #[test]
    fn invalid_job_keeps_the_current_one() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        feed(
            &mut client,
            "{\"jsonrpc\":\"2.0\",\"method\":\"job\",\"params\":{\"job_id\":\"j\",\"blob\":\"00\",\"target\":\"b88d0600\"}}\n",
        );
        assert!(client.listener().is_empty());
        assert_eq!(client.job().id(), "job-1");
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[test]
    fn submit_ids_increase_from_two_and_reset_on_login() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        let result = result_for(&client, 1);
        assert_eq!(client.submit(&result), Some(2));
        assert_eq!(client.submit(&result), Some(3));
        assert_eq!(client.submit(&result), Some(4));
        assert_eq!(client.pending_submissions(), 3);

        // reconnect and log in again
        client.on_read_error(None);
        client.on_closed();
        client.on_retry_timeout();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        feed(&mut client, &login_ok("job-9"));
        assert_eq!(client.pending_submissions(), 0);
        assert_eq!(client.submit(&result), Some(2));
    }

    #[test]
    fn submit_wire_format() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        let result = result_for(&client, 0xdeadbeef);
        client.submit(&result);
        let expected = format!(
            r#"{{"id":2,"jsonrpc":"2.0","method":"submit","params":{{"id":"sess-1","job_id":"job-1","nonce":"efbeadde","result":"{}"}}}}"#,
            "ab".repeat(32)
        ) + "\n";
        assert_eq!(actions(&mut client), vec![Action::Send(expected)]);
    }

    #[test]
    fn submit_outcomes_reach_the_listener() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        let result = result_for(&client, 1);
        client.submit(&result);
        client.submit(&result);

        feed(&mut client, "{\"id\":2,\"jsonrpc\":\"2.0\",\"error\":null,\"result\":{\"status\":\"OK\"}}\n");
        feed(
            &mut client,
            "{\"id\":3,\"jsonrpc\":\"2.0\",\"error\":{\"code\":-1,\"message\":\"Low difficulty share\"}}\n",
        );

        let events = client.listener();
        assert!(matches!(
            &events[0],
            ClientEvent::ResultAccepted { difficulty, error: None, .. } if *difficulty == result.difficulty
        ));
        assert!(matches!(
            &events[1],
            ClientEvent::ResultAccepted { error: Some(e), .. } if e == "Low difficulty share"
        ));
        assert_eq!(client.pending_submissions(), 0);
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[test]
    fn unknown_response_ids_are_ignored() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        feed(&mut client, "{\"id\":42,\"jsonrpc\":\"2.0\",\"result\":{\"status\":\"OK\"}}\n");
        feed(&mut client, "{\"id\":43,\"jsonrpc\":\"2.0\",\"result\":\"OK\"}\n");
        assert!(client.listener().is_empty());
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[test]
    fn login_error_closes_and_schedules_retry() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        actions(&mut client);

        feed(
            &mut client,
            "{\"id\":1,\"jsonrpc\":\"2.0\",\"error\":{\"code\":-1,\"message\":\"Invalid address\"}}\n",
        );
        assert_eq!(client.state(), ClientState::Closing);
        assert_eq!(actions(&mut client), vec![Action::Close]);

        client.on_closed();
        assert_eq!(client.state(), ClientState::Unconnected);
        assert_eq!(
            client.listener().last(),
            Some(&ClientEvent::Closed { client_id: 0, failures: 1 })
        );
        assert!(client.timers().retry.is_armed());
    }

    #[test]
    fn malformed_login_result_closes() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        feed(&mut client, "{\"id\":1,\"jsonrpc\":\"2.0\",\"result\":{\"job\":{}}}\n");
        assert_eq!(client.state(), ClientState::Closing);
        assert!(client
            .listener()
            .iter()
            .all(|e| !matches!(e, ClientEvent::LoginSuccess { .. })));
    }

    #[test]
    fn auth_failure_on_submit_closes() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        let result = result_for(&client, 1);
        client.submit(&result);
        feed(
            &mut client,
            "{\"id\":2,\"jsonrpc\":\"2.0\",\"error\":{\"code\":-1,\"message\":\"unauthenticated\"}}\n",
        );
        assert_eq!(client.state(), ClientState::Closing);
        assert!(matches!(
            &client.listener()[0],
            ClientEvent::ResultAccepted { error: Some(e), .. } if e == "unauthenticated"
        ));
    }

    #[test]
    fn lines_after_close_are_not_dispatched() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        let data = "{\"id\":7,\"jsonrpc\":\"2.0\",\"error\":{\"code\":-1,\"message\":\"Unauthenticated\"}}\n".to_string()
            + &job_notification("job-2", 0x22);
        feed(&mut client, &data);
        assert_eq!(client.state(), ClientState::Closing);
        assert_eq!(client.job().id(), "job-1");
        assert!(client.listener().is_empty());
    }

    #[test]
    fn response_timeout_closes_and_counts_a_failure() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        let result = result_for(&client, 1);
        client.submit(&result);
        actions(&mut client);
        assert!(client.timers().response.is_armed());

        client.on_response_timeout();
        assert_eq!(actions(&mut client), vec![Action::Close]);
        client.on_closed();

        let events = client.listener();
        assert!(matches!(
            &events[0],
            ClientEvent::ResultAccepted { error: Some(e), .. } if e == CONNECTION_CLOSED
        ));
        assert_eq!(events[1], ClientEvent::Closed { client_id: 0, failures: 1 });
        assert_eq!(client.pending_submissions(), 0);
    }

    #[test]
    fn stale_response_timeout_is_ignored() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        assert!(!client.timers().response.is_armed());
        client.on_response_timeout();
        assert_eq!(client.state(), ClientState::Connected);
        assert!(actions(&mut client).is_empty());
    }

    #[test]
    fn disconnect_reports_minus_one_and_never_retries() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        client.disconnect();
        assert_eq!(actions(&mut client), vec![Action::Close]);
        client.on_closed();

        assert_eq!(
            client.listener().as_slice(),
            &[ClientEvent::Closed { client_id: 0, failures: -1 }]
        );
        assert!(!client.timers().retry.is_armed());
        assert_eq!(client.state(), ClientState::Unconnected);
    }

    #[test]
    fn disconnect_while_waiting_for_retry_cancels_it() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.on_resolved(Err(ClientError::NoIpv4Address(
            "pool.example".to_string(),
        )));
        assert!(client.timers().retry.is_armed());

        client.disconnect();
        assert!(!client.timers().retry.is_armed());
        client.on_retry_timeout();
        assert_eq!(client.state(), ClientState::Unconnected);
        assert_eq!(
            client.listener().as_slice(),
            &[
                ClientEvent::Closed { client_id: 0, failures: 1 },
                ClientEvent::Closed { client_id: 0, failures: -1 },
            ]
        );
    }

    #[test]
    fn late_resolve_after_disconnect_does_not_connect() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        actions(&mut client);
        client.disconnect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));

        assert!(actions(&mut client).is_empty());
        assert_eq!(client.state(), ClientState::Unconnected);
        assert_eq!(
            client.listener().as_slice(),
            &[ClientEvent::Closed { client_id: 0, failures: -1 }]
        );
    }

    #[test]
    fn connect_failures_accumulate_until_login() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        for attempt in 1..=3 {
            client.connect();
            client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
            client.on_connected(Err(io::Error::from(io::ErrorKind::ConnectionRefused)));
            assert_eq!(client.state(), ClientState::Closing);
            client.on_closed();
            assert_eq!(client.failures(), attempt);
        }

        client.on_retry_timeout();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        feed(&mut client, &login_ok("job-1"));
        assert_eq!(client.failures(), 0);
    }

    #[test]
    fn keepalive_ping_borrows_the_next_id() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333).with_keepalive(true));
        assert!(client.timers().keepalive.is_armed());

        client.on_keepalive_timeout();
        assert_eq!(
            actions(&mut client),
            vec![Action::Send(
                r#"{"id":2,"jsonrpc":"2.0","method":"keepalived","params":{"id":"sess-1"}}"#.to_string() + "\n"
            )]
        );
        assert_eq!(client.sequence(), 2);

        // a submit while the ping is unanswered must not reuse its id
        let result = result_for(&client, 1);
        assert_eq!(client.submit(&result), Some(3));

        feed(&mut client, "{\"id\":2,\"jsonrpc\":\"2.0\",\"result\":{\"status\":\"KEEPALIVED\"}}\n");
        assert!(client.listener().is_empty());
        assert_eq!(client.pending_submissions(), 1);
    }

    #[test]
    fn keepalive_is_not_armed_without_the_option() {
        let client = logged_in(PoolEndpoint::new("pool.example", 3333));
        assert!(!client.timers().keepalive.is_armed());
    }

    #[test]
    fn oversized_line_closes() {
        let settings = ClientSettings {
            recv_buffer_size: 32,
            ..Default::default()
        };
        let mut client = Client::new(0, PoolEndpoint::new("pool.example", 3333), settings, Vec::new());
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        actions(&mut client);

        feed(&mut client, &"x".repeat(32));
        assert_eq!(actions(&mut client), vec![Action::Close]);
    }

    #[test]
    fn notification_errors_and_unknown_methods_are_ignored() {
        let mut client = logged_in(PoolEndpoint::new("pool.example", 3333));
        feed(&mut client, "{\"jsonrpc\":\"2.0\",\"method\":\"job\",\"error\":{\"code\":1,\"message\":\"x\"}}\n");
        feed(&mut client, "{\"jsonrpc\":\"2.0\",\"method\":\"mining.set_extranonce\",\"params\":[]}\n");
        feed(&mut client, "\n");
        feed(&mut client, "not json\n");
        assert!(client.listener().is_empty());
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[test]
    fn connect_during_a_cancelled_lookup_revives_it() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.disconnect();
        client.connect();
        assert_eq!(client.failures(), 0);
        assert_eq!(
            actions(&mut client),
            vec![Action::Resolve {
                host: "pool.example".to_string(),
                port: 3333
            }]
        );

        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        assert_eq!(client.state(), ClientState::Connecting);
        assert_eq!(
            actions(&mut client),
            vec![Action::Connect(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3333))]
        );
        assert!(client.listener().is_empty());
    }

    #[test]
    fn disconnect_while_connecting_drops_the_late_completion() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        actions(&mut client);

        client.disconnect();
        assert_eq!(client.state(), ClientState::Closing);
        assert_eq!(actions(&mut client), vec![Action::Close]);
        client.on_connected(Ok(()));
        assert!(actions(&mut client).is_empty());

        client.on_closed();
        assert_eq!(
            client.listener().as_slice(),
            &[ClientEvent::Closed { client_id: 0, failures: -1 }]
        );
    }

    #[test]
    fn submit_before_login_is_dropped() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        client.connect();
        client.on_resolved(Ok(Ipv4Addr::LOCALHOST));
        client.on_connected(Ok(()));
        actions(&mut client);

        let result = JobResult::new(&Job::new(0, false), 1, [0; 32]);
        assert_eq!(client.submit(&result), None);
        assert!(actions(&mut client).is_empty());
        assert_eq!(client.pending_submissions(), 0);
    }

    #[test]
    fn submit_requires_a_connection() {
        let mut client = client(PoolEndpoint::new("pool.example", 3333));
        let result = JobResult::new(&Job::new(0, false), 1, [0; 32]);
        assert_eq!(client.submit(&result), None);
        assert!(actions(&mut client).is_empty());
    }
}
