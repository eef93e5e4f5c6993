//! Session lifecycle controller.
//!
//! ```text
//! IDLE ──identity ready──► LOGGING_IN ──login ok──► CONNECTING ──subscribed──► ACTIVE
//!                             ▲    │                    │                         │
//!                             └────┴── fixed delay ◄────┴─────── failure ─────────┘
//! ```
//!
//! Retries are unbounded and never back off. Every new session starts with
//! an empty command table and an unready `stream` series.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::auth::{Authenticator, Credentials, HttpAuthenticator};
use super::cache::{DeviceCache, OnlineStatus};
use super::command::CommandEnvelope;
use super::message::{DeviceMessage, SensorMap};
use super::DeviceConfig;
use crate::codec::JsonCodec;
use crate::correlation::CommandTracker;
use crate::error::{LockstreamError, Result};
use crate::events::EventBus;
use crate::protocol::{headers as names, Headers};
use crate::readiness::{flags, series, Readiness};
use crate::session::{Message, SessionFailure, StompClient};
use crate::transport::{Connector, Endpoint};

/// Event names used on the client's [`EventBus`].
pub mod event_names {
    /// [`DeviceEvent::OnlineStatus`](super::DeviceEvent::OnlineStatus)
    pub const ONLINE_STATUS: &str = "onlineStatusChange";
    /// [`DeviceEvent::SensorData`](super::DeviceEvent::SensorData), also
    /// raised for feedback.
    pub const SENSOR_DATA: &str = "sensorData";
    /// [`DeviceEvent::Feedback`](super::DeviceEvent::Feedback)
    pub const FEEDBACK: &str = "feedback";
    /// [`DeviceEvent::Event`](super::DeviceEvent::Event)
    pub const DEVICE_EVENT: &str = "deviceEvent";
    /// [`DeviceEvent::Connectivity`](super::DeviceEvent::Connectivity)
    pub const CONNECTIVITY: &str = "connectivity";
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Idle,
    LoggingIn,
    Connecting,
    Active,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Idle => "idle",
            ControllerState::LoggingIn => "logging-in",
            ControllerState::Connecting => "connecting",
            ControllerState::Active => "active",
        };
        f.write_str(s)
    }
}

/// Link notices raised on [`event_names::CONNECTIVITY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    /// A login attempt started.
    Connecting,
    /// Subscribed and ready for commands.
    Active,
    /// The session failed; a relogin is scheduled.
    Lost(String),
    /// The client was shut down.
    Offline,
}

/// Payload of every event the client raises.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    OnlineStatus(OnlineStatus),
    SensorData(SensorMap),
    Feedback(SensorMap),
    Event(Value),
    Connectivity(Connectivity),
}

/// Builder for [`DeviceClient`].
pub struct DeviceClientBuilder {
    config: DeviceConfig,
    connector: Option<Arc<dyn Connector>>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl DeviceClientBuilder {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            connector: None,
            authenticator: None,
        }
    }

    /// Override the transport. Defaults to the configured [`TransportKind`](crate::transport::TransportKind).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Override login. Defaults to [`HttpAuthenticator`].
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn build(self) -> Result<DeviceClient> {
        let DeviceClientBuilder {
            config,
            connector,
            authenticator,
        } = self;
        config.validate()?;

        let connector = connector.unwrap_or_else(|| config.transport.connector());
        let authenticator = match authenticator {
            Some(authenticator) => authenticator,
            None => Arc::new(HttpAuthenticator::from_config(&config)),
        };

        Ok(DeviceClient {
            inner: Arc::new(Inner {
                config,
                connector,
                authenticator,
                readiness: Readiness::for_device(),
                tracker: CommandTracker::new(),
                events: EventBus::new(),
                state: Mutex::new(ControllerInner::default()),
            }),
        })
    }
}

/// Device-control client: login, realtime stream, commands.
///
/// Cheap to clone; clones drive the same device.
///
/// # Example
///
/// ```ignore
/// let client = DeviceClient::builder(DeviceConfig::new("lock.example:8080")).build()?;
/// client.on_state_change(|status| println!("device is {}", status));
/// client.set_device_id("dev-1")?;
/// client.set_token("secret")?;
/// client.start()?;
///
/// client.wait_ready().await?;
/// client.issue_command(&DeviceCommand::unlock("user-7"), || println!("sent"), || println!("done"));
/// ```
#[derive(Clone)]
pub struct DeviceClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    authenticator: Arc<dyn Authenticator>,
    readiness: Readiness,
    tracker: CommandTracker,
    events: EventBus<DeviceEvent>,
    state: Mutex<ControllerInner>,
}

#[derive(Default)]
struct ControllerInner {
    state: ControllerState,
    device_id: Option<String>,
    token: Option<String>,
    started: bool,
    /// Bumped on start and shutdown; login tasks of older runs stop.
    generation: u64,
    /// Bumped per session; callbacks of older sessions are ignored.
    attempt: u64,
    session: Option<StompClient>,
    login_task: Option<JoinHandle<()>>,
    /// Runtime captured by `start`; identity may be reported from any thread.
    runtime: Option<Handle>,
    cache: DeviceCache,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.login_task.take() {
            task.abort();
        }
        if let Some(session) = state.session.take() {
            session.disconnect(|| {});
        }
    }
}

impl DeviceClient {
    pub fn builder(config: DeviceConfig) -> DeviceClientBuilder {
        DeviceClientBuilder::new(config)
    }

    /// Build with the default transport and HTTP login.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        DeviceClientBuilder::new(config).build()
    }

    /// Report the device id. Completes half of the `identity` series.
    pub fn set_device_id(&self, device_id: impl Into<String>) -> Result<()> {
        self.inner.state.lock().device_id = Some(device_id.into());
        self.inner
            .readiness
            .mark_ready(series::IDENTITY, flags::DEVICE_ID)
    }

    /// Report the subscription token. Completes half of the `identity` series.
    pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
        self.inner.state.lock().token = Some(token.into());
        self.inner.readiness.mark_ready(series::IDENTITY, flags::TOKEN)
    }

    /// Log in as soon as the identity is known, then keep the session up.
    ///
    /// Must be called inside a Tokio runtime. Login and session tasks run on
    /// that runtime even when the identity is set from another thread.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| {
            LockstreamError::Config(format!("start requires a Tokio runtime: {}", e))
        })?;
        let generation = {
            let mut state = self.inner.state.lock();
            if state.started {
                return Err(LockstreamError::AlreadyConnected);
            }
            state.started = true;
            state.runtime = Some(runtime);
            state.generation += 1;
            state.generation
        };

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .readiness
            .bind_when_ready(series::IDENTITY, move || {
                if let Some(client) = upgrade(&weak) {
                    client.spawn_login(generation, None);
                }
            })
    }

    /// Disconnect, stop retrying and return to idle. Pending commands are
    /// dropped without callbacks. [`start`](Self::start) may be called again.
    pub fn shutdown(&self) {
        let (session, login_task, was_started) = {
            let mut state = self.inner.state.lock();
            let was_started = state.started;
            state.started = false;
            state.generation += 1;
            state.attempt += 1;
            state.state = ControllerState::Idle;
            (state.session.take(), state.login_task.take(), was_started)
        };

        if let Some(task) = login_task {
            task.abort();
        }
        if let Some(session) = session {
            session.disconnect(|| tracing::debug!("Device session closed"));
        }
        self.inner.tracker.invalidate();
        self.reset_stream();

        if was_started {
            tracing::info!("Device client stopped");
            self.emit(
                event_names::CONNECTIVITY,
                DeviceEvent::Connectivity(Connectivity::Offline),
            );
        }
    }

    /// Send a command as `{msg_id, body}`.
    ///
    /// Returns false without sending when the client is not active or the
    /// device is known to be offline. `on_sent` fires when the server
    /// accepts the command, `on_response` when the device receives it.
    pub fn issue_command<T, S, R>(&self, payload: &T, on_sent: S, on_response: R) -> bool
    where
        T: Serialize,
        S: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let session = {
            let state = self.inner.state.lock();
            if state.state != ControllerState::Active {
                tracing::debug!("Command refused, client is {}", state.state);
                return false;
            }
            if state.cache.online().is_offline() {
                tracing::debug!("Command refused, device is offline");
                return false;
            }
            match &state.session {
                Some(session) => session.clone(),
                None => return false,
            }
        };

        let local_id = self
            .inner
            .tracker
            .issue(Some(Box::new(on_sent)), Some(Box::new(on_response)));
        let sent = JsonCodec::encode(&CommandEnvelope {
            msg_id: &local_id,
            body: payload,
        })
        .and_then(|body| {
            session.send(
                &self.inner.config.command_destination,
                Headers::new(),
                &body,
            )
        });

        if let Err(e) = sent {
            tracing::warn!("Command {} not sent: {}", local_id, e);
            self.inner.tracker.cancel(&local_id);
            return false;
        }
        tracing::debug!("Command {} sent", local_id);
        true
    }

    /// Run `callback` once identity and stream are both ready.
    pub fn bind_ready<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .readiness
            .bind_when_ready(series::IDENTITY, move || {
                let Some(client) = upgrade(&weak) else {
                    return;
                };
                if let Err(e) = client
                    .inner
                    .readiness
                    .bind_when_ready(series::STREAM, callback)
                {
                    tracing::warn!("Ready listener dropped: {}", e);
                }
            })
    }

    /// Run `callback` once the device identity is known.
    pub fn bind_app_ready<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .readiness
            .bind_when_ready(series::IDENTITY, callback)
    }

    /// Resolve once identity and stream are both ready.
    pub async fn wait_ready(&self) -> Result<()> {
        self.inner.readiness.wait_ready(series::IDENTITY).await?;
        self.inner.readiness.wait_ready(series::STREAM).await
    }

    /// Called with every online-status change.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(OnlineStatus) + Send + Sync + 'static,
    {
        self.inner
            .events
            .bind(event_names::ONLINE_STATUS, move |event| {
                if let Some(DeviceEvent::OnlineStatus(status)) = event {
                    callback(*status);
                }
            });
    }

    /// Called with every sensor update, feedback included.
    pub fn on_sensor_data<F>(&self, callback: F)
    where
        F: Fn(&SensorMap) + Send + Sync + 'static,
    {
        self.inner.events.bind(event_names::SENSOR_DATA, move |event| {
            if let Some(DeviceEvent::SensorData(sensors)) = event {
                callback(sensors);
            }
        });
    }

    pub fn on_connectivity<F>(&self, callback: F)
    where
        F: Fn(&Connectivity) + Send + Sync + 'static,
    {
        self.inner
            .events
            .bind(event_names::CONNECTIVITY, move |event| {
                if let Some(DeviceEvent::Connectivity(notice)) = event {
                    callback(notice);
                }
            });
    }

    /// Subscribe to any named event, see [`event_names`].
    pub fn bind_push_data<F>(&self, name: &str, callback: F)
    where
        F: Fn(Option<&DeviceEvent>) + Send + Sync + 'static,
    {
        self.inner.events.bind(name, callback);
    }

    pub fn unbind_push_data(&self, name: &str) {
        self.inner.events.unbind(name);
    }

    pub fn state(&self) -> ControllerState {
        self.inner.state.lock().state
    }

    pub fn online_status(&self) -> OnlineStatus {
        self.inner.state.lock().cache.online()
    }

    pub fn sensor(&self, name: &str) -> Option<Value> {
        self.inner.state.lock().cache.sensor(name)
    }

    pub fn sensors(&self, names: &[&str]) -> std::collections::HashMap<String, Value> {
        self.inner.state.lock().cache.sensors(names)
    }

    pub fn all_sensors(&self) -> std::collections::HashMap<String, Value> {
        self.inner.state.lock().cache.all_sensors()
    }

    /// Commands awaiting delivery or response.
    pub fn pending_commands(&self) -> usize {
        self.inner.tracker.pending_count()
    }

    pub fn readiness(&self) -> &Readiness {
        &self.inner.readiness
    }

    pub fn events(&self) -> &EventBus<DeviceEvent> {
        &self.inner.events
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// The current transport session, if one is open.
    pub fn session(&self) -> Option<StompClient> {
        self.inner.state.lock().session.clone()
    }

    /// Schedule a login, after `delay` if given.
    fn spawn_login(&self, generation: u64, delay: Option<Duration>) {
        let mut state = self.inner.state.lock();
        if !state.started || state.generation != generation {
            return;
        }
        let Some(runtime) = state.runtime.clone() else {
            return;
        };
        state.state = ControllerState::LoggingIn;

        let weak = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(client) = upgrade(&weak) {
                client.login(generation).await;
            }
        });
        if let Some(previous) = state.login_task.replace(task) {
            previous.abort();
        }
    }

    async fn login(&self, generation: u64) {
        let credentials = {
            let state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            match (&state.device_id, &state.token) {
                (Some(device_id), Some(token)) => Credentials::new(device_id, token),
                _ => {
                    tracing::warn!("Login skipped, device identity incomplete");
                    return;
                }
            }
        };

        self.emit(
            event_names::CONNECTIVITY,
            DeviceEvent::Connectivity(Connectivity::Connecting),
        );
        tracing::debug!("Logging in device {}", credentials.device_id);

        match self.inner.authenticator.login(&credentials).await {
            Ok(cookie) => self.open_session(generation, cookie),
            Err(e) => {
                let delay = self.inner.config.relogin_interval();
                tracing::warn!("Login failed: {}, retrying in {:?}", e, delay);
                self.spawn_login(generation, Some(delay));
            }
        }
    }

    fn open_session(&self, generation: u64, cookie: Option<String>) {
        let (session, attempt) = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.state = ControllerState::Connecting;
            state.attempt += 1;

            let mut endpoint = Endpoint::new(self.inner.config.realtime_url());
            if let Some(cookie) = cookie {
                endpoint = endpoint.with_cookie(cookie);
            }
            let session = StompClient::new(
                self.inner.connector.clone(),
                endpoint,
                self.inner.config.session.clone(),
            );
            state.session = Some(session.clone());
            (session, state.attempt)
        };

        let on_connected = Arc::downgrade(&self.inner);
        let on_failed = on_connected.clone();
        let headers = Headers::new()
            .with(names::LOGIN, "")
            .with(names::PASSCODE, "");
        let result = session.connect(
            headers,
            move |_frame| {
                if let Some(client) = upgrade(&on_connected) {
                    client.on_session_connected(attempt);
                }
            },
            move |failure| {
                if let Some(client) = upgrade(&on_failed) {
                    client.on_session_failed(attempt, failure);
                }
            },
        );
        if let Err(e) = result {
            self.on_session_failed(attempt, SessionFailure::ConnectFailed(e.to_string()));
        }
    }

    fn on_session_connected(&self, attempt: u64) {
        let session = {
            let state = self.inner.state.lock();
            if state.attempt != attempt {
                return;
            }
            match &state.session {
                Some(session) => session.clone(),
                None => return,
            }
        };

        let config = &self.inner.config;
        let topics = [
            (config.online_topic.as_str(), Some(flags::ONLINE_STATUS)),
            (config.sensor_topic.as_str(), Some(flags::SENSOR_DATA)),
            (config.response_topic.as_str(), None),
        ];
        for (topic, flag) in topics {
            if let Err(e) = session.subscribe(topic, Headers::new(), self.topic_handler(flag)) {
                tracing::warn!("Subscribe to {} failed: {}", topic, e);
                session.disconnect(|| {});
                self.on_session_failed(attempt, SessionFailure::TransportClosed(e.to_string()));
                return;
            }
        }

        {
            let mut state = self.inner.state.lock();
            if state.attempt != attempt {
                return;
            }
            state.state = ControllerState::Active;
        }
        tracing::info!("Device session active on {}", session.endpoint().address);
        self.emit(
            event_names::CONNECTIVITY,
            DeviceEvent::Connectivity(Connectivity::Active),
        );
    }

    fn on_session_failed(&self, attempt: u64, failure: SessionFailure) {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.attempt != attempt || state.session.is_none() {
                return;
            }
            state.session = None;
            state.attempt += 1;
            state.state = ControllerState::LoggingIn;
            state.generation
        };

        let dropped = self.inner.tracker.invalidate();
        self.reset_stream();
        let delay = self.inner.config.relogin_interval();
        tracing::warn!(
            "Device session lost ({}), {} pending command(s) dropped, relogin in {:?}",
            failure,
            dropped,
            delay
        );
        self.emit(
            event_names::CONNECTIVITY,
            DeviceEvent::Connectivity(Connectivity::Lost(failure.to_string())),
        );
        self.spawn_login(generation, Some(delay));
    }

    /// Subscription handler. The first message on a stream topic marks
    /// its flag.
    fn topic_handler(&self, flag: Option<&'static str>) -> impl Fn(Message) + Send + Sync + 'static {
        let weak = Arc::downgrade(&self.inner);
        move |message: Message| {
            let Some(client) = upgrade(&weak) else {
                return;
            };
            if let Some(flag) = flag {
                if let Err(e) = client.inner.readiness.mark_ready(series::STREAM, flag) {
                    tracing::warn!("Stream flag {} not marked: {}", flag, e);
                }
            }
            client.route(message.body());
        }
    }

    /// Route one message body by its `type`.
    fn route(&self, body: &str) {
        if body.trim().is_empty() {
            tracing::error!("Received an empty message");
            return;
        }
        let message = match DeviceMessage::parse(body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropped device message: {}", e);
                return;
            }
        };
        tracing::trace!("Device message type {}", message.kind());

        match message {
            DeviceMessage::Ack(data) => tracing::debug!("Device ack: {}", data),
            DeviceMessage::OnlineStatus(online) => {
                let status = OnlineStatus::from_flag(online);
                self.inner.state.lock().cache.set_online(status);
                tracing::info!("Device is {}", status);
                self.emit(event_names::ONLINE_STATUS, DeviceEvent::OnlineStatus(status));
            }
            DeviceMessage::SensorData(sensors) => {
                self.inner.state.lock().cache.merge_sensors(&sensors);
                self.emit(event_names::SENSOR_DATA, DeviceEvent::SensorData(sensors));
            }
            DeviceMessage::Feedback(feedback) => {
                self.inner.state.lock().cache.merge_sensors(&feedback);
                self.emit(
                    event_names::SENSOR_DATA,
                    DeviceEvent::SensorData(feedback.clone()),
                );
                self.emit(event_names::FEEDBACK, DeviceEvent::Feedback(feedback));
            }
            DeviceMessage::Event(data) => {
                self.emit(event_names::DEVICE_EVENT, DeviceEvent::Event(data));
            }
            DeviceMessage::CommandSent { msg_id, uuid } => {
                if !self.inner.tracker.on_delivery_confirmed(&msg_id, &uuid) {
                    tracing::debug!("Delivery for unknown command {}", msg_id);
                }
            }
            DeviceMessage::CommandDelivered { uuid } => {
                if !self.inner.tracker.on_response_confirmed(&uuid) {
                    tracing::debug!("Response for unknown command {}", uuid);
                }
            }
            DeviceMessage::Unknown { kind, .. } => {
                tracing::debug!("Ignoring device message type {}", kind);
            }
        }
    }

    fn reset_stream(&self) {
        if let Err(e) = self.inner.readiness.reset(series::STREAM) {
            tracing::warn!("Stream readiness not reset: {}", e);
        }
    }

    fn emit(&self, name: &str, event: DeviceEvent) {
        self.inner.events.trigger(name, Some(&event));
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<DeviceClient> {
    weak.upgrade().map(|inner| DeviceClient { inner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoLogin;

    impl Authenticator for NoLogin {
        fn login<'a>(
            &'a self,
            _credentials: &'a Credentials,
        ) -> crate::transport::BoxFuture<'a, Result<Option<String>>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn client() -> DeviceClient {
        let (connector, _listener) = MemoryConnector::new();
        DeviceClient::builder(DeviceConfig::new("lock.test"))
            .connector(Arc::new(connector))
            .authenticator(Arc::new(NoLogin))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_bad_config() {
        assert!(matches!(
            DeviceClient::builder(DeviceConfig::default())
                .authenticator(Arc::new(NoLogin))
                .build(),
            Err(LockstreamError::Config(_))
        ));
    }

    #[test]
    fn test_command_refused_when_idle() {
        let client = client();
        assert_eq!(client.state(), ControllerState::Idle);
        assert!(!client.issue_command(&serde_json::json!({"cmd": 8}), || {}, || {}));
        assert_eq!(client.pending_commands(), 0);
    }

    #[test]
    fn test_route_updates_cache_and_events() {
        let client = client();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sensor_events = Arc::new(AtomicUsize::new(0));
        let feedback_events = Arc::new(AtomicUsize::new(0));

        let seen = statuses.clone();
        client.on_state_change(move |status| seen.lock().push(status));
        let count = sensor_events.clone();
        client.on_sensor_data(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        let count = feedback_events.clone();
        client.bind_push_data(event_names::FEEDBACK, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        client.route(r#"{"type":1,"data":{"online":true}}"#);
        client.route(r#"{"type":2,"data":{"body":{"lock":0,"battery":50}}}"#);
        client.route(r#"{"type":5,"data":{"body":{"cmd":3,"content":"4321"}}}"#);
        client.route(r#"{"type":1,"data":{"online":false}}"#);
        client.route("");
        client.route("not json");
        client.route(r#"{"type":99}"#);

        assert_eq!(
            *statuses.lock(),
            vec![OnlineStatus::Online, OnlineStatus::Offline]
        );
        assert_eq!(client.online_status(), OnlineStatus::Offline);
        assert_eq!(sensor_events.load(Ordering::SeqCst), 2);
        assert_eq!(feedback_events.load(Ordering::SeqCst), 1);
        assert_eq!(client.sensor("battery"), Some(serde_json::json!(50)));
        assert_eq!(client.sensor("content"), Some(serde_json::json!("4321")));
        assert_eq!(client.sensors(&["lock", "nope"]).len(), 1);
    }

    #[test]
    fn test_route_confirms_commands() {
        let client = client();
        let sent = Arc::new(AtomicUsize::new(0));
        let answered = Arc::new(AtomicUsize::new(0));
        let (s, a) = (sent.clone(), answered.clone());
        let local = client.inner.tracker.issue(
            Some(Box::new(move || {
                s.fetch_add(1, Ordering::SeqCst);
            })),
            Some(Box::new(move || {
                a.fetch_add(1, Ordering::SeqCst);
            })),
        );

        client.route(&format!(
            r#"{{"type":6,"data":{{"msg_id":"{}","uuid":"srv-1"}}}}"#,
            local
        ));
        client.route(r#"{"type":4,"data":{"uuid":"srv-1"}}"#);
        client.route(r#"{"type":4,"data":{"uuid":"srv-1"}}"#);

        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(answered.load(Ordering::SeqCst), 1);
        assert_eq!(client.pending_commands(), 0);
    }

    #[test]
    fn test_bind_ready_needs_both_series() {
        let client = client();
        let fired = Arc::new(AtomicUsize::new(0));
        let count = fired.clone();
        client
            .bind_ready(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let app = Arc::new(AtomicUsize::new(0));
        let count = app.clone();
        client
            .bind_app_ready(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let readiness = client.readiness();
        readiness.mark_ready(series::STREAM, flags::ONLINE_STATUS).unwrap();
        readiness.mark_ready(series::STREAM, flags::SENSOR_DATA).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        client.set_device_id("dev").unwrap();
        client.set_token("tok").unwrap();
        assert_eq!(app.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_callback_after_failure_is_ignored() {
        let client = client();
        let (connector, _listener) = MemoryConnector::new();
        let attempt = {
            let mut state = client.inner.state.lock();
            state.attempt += 1;
            state.session = Some(StompClient::new(
                Arc::new(connector),
                Endpoint::new("memory"),
                client.inner.config.session.clone(),
            ));
            state.attempt
        };
        let notices = Arc::new(Mutex::new(Vec::new()));
        let seen = notices.clone();
        client.on_connectivity(move |notice| seen.lock().push(notice.clone()));

        client.on_session_failed(attempt, SessionFailure::HeartbeatTimeout);
        client.on_session_connected(attempt);

        assert_ne!(client.state(), ControllerState::Active);
        assert!(client.session().is_none());
        assert_eq!(
            *notices.lock(),
            vec![Connectivity::Lost("heartbeat timeout".to_string())]
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_error() {
        let client = client();
        client.start().unwrap();
        assert!(matches!(
            client.start(),
            Err(LockstreamError::AlreadyConnected)
        ));
        client.shutdown();
        assert_eq!(client.state(), ControllerState::Idle);
        client.start().unwrap();
    }
}
