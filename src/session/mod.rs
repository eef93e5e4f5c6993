//! Transport session - one broker connection over a [`Connector`].
//!
//! [`StompClient`] owns the transport, the writer task, the heartbeat timers
//! and the subscription table. Every public operation is synchronous and
//! returns immediately; outcomes arrive through the callbacks given to
//! [`connect`](StompClient::connect) and to subscriptions.
//!
//! # Lifecycle
//!
//! ```text
//! DISCONNECTED ──connect──► CONNECTING ──CONNECTED frame──► CONNECTED
//!       ▲                       │                               │
//!       └──── disconnect / transport failure / ERROR / timeout ─┘
//! ```
//!
//! Leaving through anything but [`disconnect`](StompClient::disconnect)
//! calls the error callback exactly once.
//!
//! # Example
//!
//! ```ignore
//! let client = StompClient::new(connector, Endpoint::new("ws://host/realtime"), SessionConfig::default());
//! client.connect(
//!     Headers::new(),
//!     |frame| println!("connected to {:?}", frame.header("server")),
//!     |failure| eprintln!("session ended: {}", failure),
//! )?;
//! ```

mod config;
mod heartbeat;
mod state;
mod subscription;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{LockstreamError, Result};
use crate::protocol::{
    fragment, headers as names, marshal, unmarshal, versions, Command, Frame, Headers, LF, NULL,
};
use crate::transport::{Connector, Endpoint, TransportHalves};
use crate::writer::{spawn_writer_task, WriterHandle};

pub use config::{SessionConfig, DEFAULT_HEARTBEAT_MS, DEFAULT_MAX_PROTOCOL_VIOLATIONS};
pub use heartbeat::{negotiate, ActivityClock, NegotiatedHeartbeat};
pub use state::{ConnectionState, SessionFailure};
pub use subscription::{Message, MessageHandler};

use subscription::SubscriptionTable;

/// Called once with the `CONNECTED` frame.
pub type ConnectedCallback = Box<dyn FnOnce(&Frame) + Send>;

/// Called once when the session ends through the error path.
pub type ErrorCallback = Box<dyn FnOnce(SessionFailure) + Send>;

/// Called for every `RECEIPT` frame.
pub type ReceiptHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// A single broker session.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct StompClient {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    config: SessionConfig,
    clock: ActivityClock,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    /// Bumped on every connect; tasks from older connections are ignored.
    epoch: u64,
    writer: Option<WriterHandle>,
    tasks: Vec<JoinHandle<()>>,
    subscriptions: SubscriptionTable,
    next_transaction: u64,
    heartbeat: NegotiatedHeartbeat,
    violations: u32,
    version: Option<String>,
    on_connected: Option<ConnectedCallback>,
    on_error: Option<ErrorCallback>,
    receipt_handler: Option<ReceiptHandler>,
}

impl SessionState {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.connection != ConnectionState::Disconnected
    }

    /// Release everything tied to the current connection.
    fn teardown(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.on_connected = None;
        self.heartbeat = NegotiatedHeartbeat::default();
        self.violations = 0;
        self.version = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.close();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.subscriptions.clear();
    }
}

impl StompClient {
    /// Create a disconnected session.
    pub fn new(connector: Arc<dyn Connector>, endpoint: Endpoint, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                endpoint,
                config,
                clock: ActivityClock::new(),
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Open the transport and send `CONNECT`.
    ///
    /// `headers` carries credentials (`login`, `passcode`, `host`);
    /// `accept-version` and `heart-beat` are added. Returns
    /// `Err(AlreadyConnected)` unless the session is disconnected.
    pub fn connect<C, E>(&self, headers: Headers, on_connected: C, on_error: E) -> Result<()>
    where
        C: FnOnce(&Frame) + Send + 'static,
        E: FnOnce(SessionFailure) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.connection != ConnectionState::Disconnected {
            return Err(LockstreamError::AlreadyConnected);
        }

        state.connection = ConnectionState::Connecting;
        state.epoch += 1;
        state.violations = 0;
        state.on_connected = Some(Box::new(on_connected));
        state.on_error = Some(Box::new(on_error));
        self.inner.clock.touch();

        let epoch = state.epoch;
        let task = tokio::spawn(run_session(self.clone(), epoch, headers));
        state.tasks.push(task);
        Ok(())
    }

    /// Send `DISCONNECT`, close the transport, stop the timers and call
    /// `callback`.
    ///
    /// The error callback is detached first, so a deliberate disconnect
    /// never reports a failure. The callback runs even if the session was
    /// not connected.
    pub fn disconnect<F: FnOnce()>(&self, callback: F) {
        {
            let mut state = self.inner.state.lock();
            if state.connection != ConnectionState::Disconnected {
                if let Some(writer) = &state.writer {
                    let wire = marshal(Command::Disconnect.as_str(), &Headers::new(), "");
                    let _ = writer.try_send(wire);
                }
                state.on_error = None;
                state.teardown();
                tracing::debug!("Disconnected from {}", self.inner.endpoint.address);
            }
        }
        callback();
    }

    /// Send a message to `destination`.
    pub fn send(&self, destination: &str, mut headers: Headers, body: &str) -> Result<()> {
        headers.insert(names::DESTINATION, destination);
        self.transmit(Command::Send, headers, body)
    }

    /// Subscribe to `destination` and route its messages to `handler`.
    ///
    /// Uses the `id` header if the caller set one, otherwise generates
    /// `sub-N`. Returns the subscription id.
    pub fn subscribe<F>(&self, destination: &str, mut headers: Headers, handler: F) -> Result<String>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let id = {
            let mut state = self.inner.state.lock();
            if state.connection != ConnectionState::Connected {
                return Err(LockstreamError::NotConnected);
            }
            let id = match headers.get(names::ID) {
                Some(id) => id.to_string(),
                None => state.subscriptions.generate_id(),
            };
            state.subscriptions.insert(id.clone(), Arc::new(handler));
            id
        };

        headers.insert(names::DESTINATION, destination);
        headers.insert(names::ID, id.as_str());
        if let Err(e) = self.transmit(Command::Subscribe, headers, "") {
            self.inner.state.lock().subscriptions.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Remove a subscription and tell the server.
    pub fn unsubscribe(&self, id: &str) -> Result<()> {
        self.inner.state.lock().subscriptions.remove(id);
        self.transmit(Command::Unsubscribe, Headers::new().with(names::ID, id), "")
    }

    /// Acknowledge a message. Extra `headers` (e.g. `transaction`) are kept.
    pub fn ack(&self, message_id: &str, subscription: &str, headers: Headers) -> Result<()> {
        self.transmit(Command::Ack, ack_headers(message_id, subscription, headers), "")
    }

    /// Reject a message. Extra `headers` (e.g. `transaction`) are kept.
    pub fn nack(&self, message_id: &str, subscription: &str, headers: Headers) -> Result<()> {
        self.transmit(Command::Nack, ack_headers(message_id, subscription, headers), "")
    }

    /// Start a transaction, generating `tx-N` when no id is given.
    pub fn begin(&self, transaction: Option<&str>) -> Result<Transaction> {
        let id = match transaction {
            Some(id) => id.to_string(),
            None => {
                let mut state = self.inner.state.lock();
                let id = format!("tx-{}", state.next_transaction);
                state.next_transaction += 1;
                id
            }
        };
        self.transmit(
            Command::Begin,
            Headers::new().with(names::TRANSACTION, id.as_str()),
            "",
        )?;
        Ok(Transaction {
            id,
            client: self.clone(),
        })
    }

    /// Commit a transaction by id.
    pub fn commit(&self, transaction: &str) -> Result<()> {
        self.transmit(
            Command::Commit,
            Headers::new().with(names::TRANSACTION, transaction),
            "",
        )
    }

    /// Abort a transaction by id.
    pub fn abort(&self, transaction: &str) -> Result<()> {
        self.transmit(
            Command::Abort,
            Headers::new().with(names::TRANSACTION, transaction),
            "",
        )
    }

    /// Route `RECEIPT` frames to `handler`.
    pub fn set_receipt_handler<F>(&self, handler: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.inner.state.lock().receipt_handler = Some(Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Negotiated heartbeat; zero intervals before `CONNECTED`.
    pub fn heartbeat(&self) -> NegotiatedHeartbeat {
        self.inner.state.lock().heartbeat
    }

    /// Protocol version from `CONNECTED`, if any.
    pub fn version(&self) -> Option<String> {
        self.inner.state.lock().version.clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Encode and queue a frame, fragmenting at the configured size.
    fn transmit(&self, command: Command, headers: Headers, body: &str) -> Result<()> {
        let writer = {
            let state = self.inner.state.lock();
            if state.connection != ConnectionState::Connected {
                return Err(LockstreamError::NotConnected);
            }
            state.writer.clone().ok_or(LockstreamError::NotConnected)?
        };
        tracing::trace!(">>> {}", command);
        let wire = marshal(command.as_str(), &headers, body);
        writer.try_send_all(fragment(&wire, self.inner.config.max_frame_size))
    }

    /// Handle one transport payload. Returns false once the session is over.
    fn handle_payload(&self, epoch: u64, payload: &str) -> bool {
        self.inner.clock.touch();

        if payload
            .trim_matches(|c| c == NULL || c == LF || c == '\r')
            .is_empty()
        {
            tracing::trace!("<<< heartbeat");
            return true;
        }

        for item in unmarshal(payload) {
            let keep_going = match item {
                Ok(frame) => {
                    {
                        let mut state = self.inner.state.lock();
                        if !state.is_current(epoch) {
                            return false;
                        }
                        state.violations = 0;
                    }
                    self.dispatch(epoch, frame)
                }
                Err(e) => self.record_violation(epoch, e),
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    fn record_violation(&self, epoch: u64, error: LockstreamError) -> bool {
        let count = {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return false;
            }
            state.violations += 1;
            state.violations
        };
        tracing::warn!("Dropped malformed frame ({} in a row): {}", count, error);

        if count >= self.inner.config.max_protocol_violations {
            self.fail(epoch, SessionFailure::ProtocolViolations(count));
            return false;
        }
        true
    }

    fn dispatch(&self, epoch: u64, frame: Frame) -> bool {
        tracing::trace!("<<< {}", frame.command);
        match frame.kind() {
            Command::Connected => {
                self.on_connected_frame(epoch, frame);
                true
            }
            Command::Message => {
                let handler = {
                    let state = self.inner.state.lock();
                    frame
                        .header(names::SUBSCRIPTION)
                        .and_then(|id| state.subscriptions.get(id))
                };
                match handler {
                    Some(handler) => handler(Message::new(frame, self.clone())),
                    None => tracing::warn!(
                        "Unhandled message for subscription {:?}",
                        frame.header(names::SUBSCRIPTION)
                    ),
                }
                true
            }
            Command::Receipt => {
                let handler = self.inner.state.lock().receipt_handler.clone();
                match handler {
                    Some(handler) => handler(&frame),
                    None => tracing::debug!(
                        "Unhandled receipt {:?}",
                        frame.header(names::RECEIPT_ID)
                    ),
                }
                true
            }
            Command::Error => {
                tracing::error!(
                    "Server error: {}",
                    frame.header("message").unwrap_or(frame.body.as_str())
                );
                self.fail(epoch, SessionFailure::ServerError(frame));
                false
            }
            other => {
                tracing::debug!("Unhandled frame: {}", other);
                true
            }
        }
    }

    fn on_connected_frame(&self, epoch: u64, frame: Frame) {
        let callback = {
            let mut state = self.inner.state.lock();
            if state.connection != ConnectionState::Connecting {
                tracing::debug!("Ignoring CONNECTED in state {}", state.connection);
                return;
            }
            state.connection = ConnectionState::Connected;

            let version = frame.header(names::VERSION);
            let heartbeat = negotiate(
                version,
                self.inner.config.local_heartbeat(),
                frame.header(names::HEART_BEAT),
            );
            state.heartbeat = heartbeat;
            state.version = version.map(str::to_string);
            tracing::debug!(
                "Connected (version {}), heartbeat out {:?} in {:?}",
                version.unwrap_or(versions::V1_0),
                heartbeat.outgoing,
                heartbeat.incoming
            );

            if !heartbeat.outgoing.is_zero() {
                if let Some(writer) = state.writer.clone() {
                    let pinger = heartbeat::spawn_pinger(writer, heartbeat.outgoing);
                    state.tasks.push(pinger);
                }
            }
            if !heartbeat.incoming.is_zero() {
                let weak = Arc::downgrade(&self.inner);
                let checker = heartbeat::spawn_checker(
                    self.inner.clock.clone(),
                    heartbeat.incoming,
                    move |elapsed| {
                        tracing::warn!("No server activity for {:?}, closing", elapsed);
                        if let Some(client) = upgrade(&weak) {
                            client.fail(epoch, SessionFailure::HeartbeatTimeout);
                        }
                    },
                );
                state.tasks.push(checker);
            }

            state.on_connected.take()
        };

        if let Some(callback) = callback {
            callback(&frame);
        }
    }

    /// Tear down the connection and report `failure` once.
    fn fail(&self, epoch: u64, failure: SessionFailure) {
        let on_error = {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return;
            }
            let on_error = state.on_error.take();
            state.teardown();
            on_error
        };

        tracing::warn!("Session to {} ended: {}", self.inner.endpoint.address, failure);
        if let Some(on_error) = on_error {
            on_error(failure);
        }
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<StompClient> {
    weak.upgrade().map(|inner| StompClient { inner })
}

fn ack_headers(message_id: &str, subscription: &str, mut headers: Headers) -> Headers {
    headers.insert(names::MESSAGE_ID, message_id);
    headers.insert(names::SUBSCRIPTION, subscription);
    headers
}

/// Connect task: open the transport, send `CONNECT`, then read until the
/// session ends.
async fn run_session(client: StompClient, epoch: u64, headers: Headers) {
    let inner = &client.inner;

    let TransportHalves { sink, mut stream } = match inner.connector.connect(&inner.endpoint).await {
        Ok(halves) => halves,
        Err(e) => {
            client.fail(epoch, SessionFailure::ConnectFailed(e.to_string()));
            return;
        }
    };
    let (writer, mut writer_task) = spawn_writer_task(sink, inner.config.writer_config());

    {
        let mut state = inner.state.lock();
        if !state.is_current(epoch) {
            let _ = writer.close();
            return;
        }
        state.writer = Some(writer.clone());
    }
    inner.clock.touch();

    let mut connect_headers = headers;
    connect_headers.insert(names::ACCEPT_VERSION, versions::SUPPORTED);
    connect_headers.insert(names::HEART_BEAT, inner.config.local_heartbeat().to_header());
    let wire = marshal(Command::Connect.as_str(), &connect_headers, "");
    tracing::debug!(">>> CONNECT {}", inner.endpoint.address);
    if let Err(e) = writer.try_send_all(fragment(&wire, inner.config.max_frame_size)) {
        client.fail(epoch, SessionFailure::TransportClosed(e.to_string()));
        return;
    }
    drop(writer);

    loop {
        tokio::select! {
            payload = stream.next_payload() => match payload {
                Some(Ok(payload)) => {
                    if !client.handle_payload(epoch, &payload) {
                        return;
                    }
                }
                Some(Err(LockstreamError::Protocol(msg))) => {
                    if !client.record_violation(epoch, LockstreamError::Protocol(msg)) {
                        return;
                    }
                }
                Some(Err(e)) => {
                    client.fail(epoch, SessionFailure::TransportClosed(e.to_string()));
                    return;
                }
                None => {
                    client.fail(epoch, SessionFailure::TransportClosed("closed by peer".to_string()));
                    return;
                }
            },
            result = &mut writer_task => {
                let reason = match result {
                    Ok(Ok(())) => "writer stopped".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                client.fail(epoch, SessionFailure::TransportClosed(reason));
                return;
            }
        }
    }
}

/// A transaction started with [`StompClient::begin`].
pub struct Transaction {
    id: String,
    client: StompClient,
}

impl Transaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send a message inside this transaction.
    pub fn send(&self, destination: &str, headers: Headers, body: &str) -> Result<()> {
        self.client
            .send(destination, headers.with(names::TRANSACTION, self.id.as_str()), body)
    }

    pub fn commit(self) -> Result<()> {
        self.client.commit(&self.id)
    }

    pub fn abort(self) -> Result<()> {
        self.client.abort(&self.id)
    }
}
