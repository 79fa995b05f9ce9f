//! Connection management
//!
//! Owns the single active transport, its lifecycle and the reconnect policy.
//!
//! Every call to `connect` (or an automatic reconnect) opens a new transport
//! and bumps an epoch counter. Events from transports and reconnect timers
//! belonging to an older epoch are ignored, so a replaced socket or a timer
//! racing a `disconnect` can never act on the current connection.

use std::sync::{Arc, Weak};
use std::time::Duration;

use helpdesk_shared::EventTag;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use url::Url;
use uuid::Uuid;

use crate::config::{ConnectionConfig, RealtimeSettings};
use crate::endpoint::EndpointStrategy;
use crate::error::{RealtimeError, RealtimeResult};
use crate::identity::IdentityStore;
use crate::message::Envelope;
use crate::transport::{Connector, TransportCommand, TransportEvent};

pub type ConnectedCallback = Arc<dyn Fn() + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(Envelope) + Send + Sync>;
pub type ExhaustedCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// State of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Lifecycle notifications broadcast to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { session_id: Uuid },
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    /// Terminal: no further reconnect will be attempted
    ReconnectFailed { attempts: u32 },
}

/// Why a frame could not be transmitted right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Connecting,
    Closed,
}

#[derive(Debug, Default)]
struct ReconnectState {
    attempts: u32,
    timer: Option<JoinHandle<()>>,
}

impl ReconnectState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    config: Option<ConnectionConfig>,
    state: ConnectionState,
    session_id: Uuid,
    epoch: u64,
    commands: Option<mpsc::UnboundedSender<TransportCommand>>,
    reconnect: ReconnectState,
    closed_by_caller: bool,
}

#[derive(Default)]
struct Hooks {
    connected: Vec<ConnectedCallback>,
    message: Option<MessageCallback>,
    exhausted: Vec<ExhaustedCallback>,
}

struct Shared {
    inner: Mutex<Inner>,
    hooks: RwLock<Hooks>,
    connector: Box<dyn Connector>,
    endpoint: Box<dyn EndpointStrategy>,
    identity: Arc<dyn IdentityStore>,
    settings: RealtimeSettings,
    lifecycle: broadcast::Sender<ConnectionEvent>,
}

/// Owns the transport socket, connection lifecycle and reconnection policy
///
/// Cheap to clone; all clones share the same connection. Must be used inside
/// a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

/// Non-owning handle, for callbacks stored inside the manager itself
#[derive(Clone)]
pub struct WeakConnectionManager {
    shared: Weak<Shared>,
}

impl WeakConnectionManager {
    /// Returns None once every strong handle has been dropped
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.shared.upgrade().map(|shared| ConnectionManager { shared })
    }
}

impl ConnectionManager {
    pub fn new(
        connector: impl Connector,
        endpoint: Box<dyn EndpointStrategy>,
        identity: Arc<dyn IdentityStore>,
        settings: RealtimeSettings,
    ) -> Self {
        let (lifecycle, _) = broadcast::channel(settings.lifecycle_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    config: None,
                    state: ConnectionState::Disconnected,
                    session_id: Uuid::nil(),
                    epoch: 0,
                    commands: None,
                    reconnect: ReconnectState::default(),
                    closed_by_caller: false,
                }),
                hooks: RwLock::new(Hooks::default()),
                connector: Box::new(connector),
                endpoint,
                identity,
                settings,
                lifecycle,
            }),
        }
    }

    /// Handle that does not keep the connection alive
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Run `callback` every time a connection opens (initial or reconnect)
    pub fn on_connected(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared.hooks.write().connected.push(Arc::new(callback));
    }

    /// Set the consumer of parsed inbound envelopes
    pub fn on_message(&self, callback: impl Fn(Envelope) + Send + Sync + 'static) {
        self.shared.hooks.write().message = Some(Arc::new(callback));
    }

    /// Run `callback` when reconnect attempts are exhausted
    pub fn on_reconnect_exhausted(&self, callback: impl Fn(u32) + Send + Sync + 'static) {
        self.shared.hooks.write().exhausted.push(Arc::new(callback));
    }

    /// Subscribe to lifecycle events from now on
    pub fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.lifecycle.subscribe()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Returns true only while the transport is open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Id of the current (or last) connection, nil before the first connect
    pub fn session_id(&self) -> Uuid {
        self.shared.inner.lock().session_id
    }

    /// Config of the current connection, including any back-filled identity
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.shared.inner.lock().config.clone()
    }

    /// Reconnect attempts made since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect.attempts
    }

    /// Tuning this manager was built with
    pub fn settings(&self) -> &RealtimeSettings {
        &self.shared.settings
    }

    /// Open a new transport, replacing any existing one
    ///
    /// Returns once the transport is being opened; `Connected` is broadcast
    /// when it actually opens.
    pub fn connect(&self, mut config: ConnectionConfig) -> RealtimeResult<()> {
        if config.caller_id.is_none() {
            config.caller_id = self.shared.identity.load();
        }
        let url = self.shared.endpoint.build_url(&config)?;

        let mut inner = self.shared.inner.lock();
        inner.closed_by_caller = false;
        inner.reconnect.cancel_timer();
        inner.reconnect.attempts = 0;
        inner.config = Some(config);

        let replaced = (inner.state == ConnectionState::Open).then_some(inner.session_id);
        self.open_locked(&mut inner, url);
        drop(inner);

        // observers saw the old session open, so report it closing
        if let Some(session_id) = replaced {
            tracing::info!(session_id = %session_id, "Realtime connection replaced");
            let _ = self.shared.lifecycle.send(ConnectionEvent::Disconnected {
                reason: "replaced by new connection".to_string(),
            });
        }
        Ok(())
    }

    /// Close the transport and cancel any pending reconnect
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        inner.closed_by_caller = true;
        inner.epoch += 1;
        inner.reconnect.cancel_timer();
        inner.reconnect.attempts = 0;

        let previous = std::mem::replace(&mut inner.state, ConnectionState::Disconnected);
        if let Some(commands) = inner.commands.take() {
            let _ = commands.send(TransportCommand::Close);
        }
        let session_id = inner.session_id;
        drop(inner);

        if previous != ConnectionState::Disconnected {
            tracing::info!(session_id = %session_id, "Realtime connection closed by client");
            let _ = self.shared.lifecycle.send(ConnectionEvent::Disconnected {
                reason: "closed by client".to_string(),
            });
        }
    }

    /// Transmit an envelope
    ///
    /// - Open: sent immediately.
    /// - Connecting: retried on a fixed interval until the socket opens or the
    ///   retry ceiling is reached. The frame goes out at most once.
    /// - Disconnected: fails with [`RealtimeError::NotConnected`]. No reconnect
    ///   is started; reconnecting is the caller's decision.
    pub async fn send(&self, envelope: &Envelope) -> RealtimeResult<()> {
        let frame = envelope.to_wire()?;
        let retries = self.shared.settings.max_send_retries;
        let strategy = FixedInterval::new(self.shared.settings.send_retry_delay).take(retries);

        let result = RetryIf::spawn(
            strategy,
            || std::future::ready(self.try_transmit(&frame)),
            |pending: &Pending| *pending == Pending::Connecting,
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(Pending::Connecting) => {
                tracing::warn!(event = %envelope.event, retries, "Send gave up waiting for connection to open");
                Err(RealtimeError::SendRetriesExhausted(retries))
            }
            Err(Pending::Closed) => {
                tracing::debug!(event = %envelope.event, "Send attempted while disconnected");
                Err(RealtimeError::NotConnected)
            }
        }
    }

    /// Transmit an envelope only if the connection is open right now
    pub fn transmit(&self, envelope: &Envelope) -> RealtimeResult<()> {
        let frame = envelope.to_wire()?;
        self.try_transmit(&frame)
            .map_err(|_| RealtimeError::NotConnected)
    }

    fn try_transmit(&self, frame: &str) -> Result<(), Pending> {
        let inner = self.shared.inner.lock();
        match inner.state {
            ConnectionState::Open => match &inner.commands {
                Some(commands) if commands.send(TransportCommand::Send(frame.to_string())).is_ok() => {
                    Ok(())
                }
                _ => Err(Pending::Closed),
            },
            ConnectionState::Connecting => Err(Pending::Connecting),
            ConnectionState::Disconnected => Err(Pending::Closed),
        }
    }

    fn open_locked(&self, inner: &mut Inner, url: Url) {
        inner.epoch += 1;
        if let Some(previous) = inner.commands.take() {
            let _ = previous.send(TransportCommand::Close);
        }

        let handle = self.shared.connector.open(url);
        inner.commands = Some(handle.commands);
        inner.session_id = Uuid::new_v4();
        inner.state = ConnectionState::Connecting;

        tracing::debug!(session_id = %inner.session_id, epoch = inner.epoch, "Opening realtime connection");
        tokio::spawn(pump(Arc::downgrade(&self.shared), inner.epoch, handle.events));
    }

    fn handle_event(&self, epoch: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_opened(epoch),
            TransportEvent::Frame(text) => self.handle_frame(epoch, &text),
            TransportEvent::Closed { reason } => self.handle_closed(epoch, reason),
        }
    }

    fn handle_opened(&self, epoch: u64) {
        let session_id = {
            let mut inner = self.shared.inner.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.state = ConnectionState::Open;
            inner.reconnect.attempts = 0;
            inner.session_id
        };

        tracing::info!(session_id = %session_id, "Realtime connection opened");
        let _ = self
            .shared
            .lifecycle
            .send(ConnectionEvent::Connected { session_id });

        let callbacks = self.shared.hooks.read().connected.clone();
        for callback in callbacks {
            callback();
        }
    }

    fn handle_frame(&self, epoch: u64, text: &str) {
        if self.shared.inner.lock().epoch != epoch {
            return;
        }

        let envelope = match Envelope::from_wire(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, frame_len = text.len(), "Discarding malformed frame");
                return;
            }
        };

        if envelope.event == EventTag::Connected {
            self.backfill_identity(&envelope);
        }

        let callback = self.shared.hooks.read().message.clone();
        match callback {
            Some(callback) => callback(envelope),
            None => tracing::trace!(event = %envelope.event, "No consumer for inbound envelope"),
        }
    }

    /// Adopt the identity assigned by the server in the handshake frame
    fn backfill_identity(&self, envelope: &Envelope) {
        let mut inner = self.shared.inner.lock();
        let Some(config) = inner.config.as_mut() else {
            return;
        };
        let Some(assigned) = envelope
            .payload
            .get(config.role.identity_key())
            .and_then(id_string)
        else {
            return;
        };
        if !config.backfill_caller_id(&assigned) {
            return;
        }
        drop(inner);

        tracing::info!("Caller identity assigned by server");
        if let Err(e) = self.shared.identity.store(&assigned) {
            tracing::warn!(error = %e, "Failed to persist assigned caller identity");
        }
    }

    fn handle_closed(&self, epoch: u64, reason: String) {
        let mut inner = self.shared.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.commands = None;
        inner.state = ConnectionState::Disconnected;

        tracing::info!(session_id = %inner.session_id, reason = %reason, "Realtime connection lost");
        let _ = self
            .shared
            .lifecycle
            .send(ConnectionEvent::Disconnected { reason });

        if inner.closed_by_caller {
            return;
        }
        self.schedule_reconnect(inner);
    }

    fn schedule_reconnect(&self, mut inner: MutexGuard<'_, Inner>) {
        let policy = self.shared.settings.reconnect;

        if inner.reconnect.attempts >= policy.max_attempts {
            let attempts = inner.reconnect.attempts;
            inner.reconnect.timer = None;
            drop(inner);

            tracing::error!(attempts, "Reconnect attempts exhausted, giving up");
            let _ = self
                .shared
                .lifecycle
                .send(ConnectionEvent::ReconnectFailed { attempts });
            let callbacks = self.shared.hooks.read().exhausted.clone();
            for callback in callbacks {
                callback(attempts);
            }
            return;
        }

        inner.reconnect.attempts += 1;
        let attempt = inner.reconnect.attempts;
        let delay = policy.delay_for(attempt);
        let epoch = inner.epoch;
        let shared = Arc::downgrade(&self.shared);

        inner.reconnect.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                ConnectionManager { shared }.fire_reconnect(epoch);
            }
        }));
        drop(inner);

        tracing::warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduling reconnect"
        );
        let _ = self
            .shared
            .lifecycle
            .send(ConnectionEvent::Reconnecting { attempt, delay });
    }

    fn fire_reconnect(&self, epoch: u64) {
        let mut inner = self.shared.inner.lock();
        if inner.closed_by_caller || inner.epoch != epoch {
            tracing::debug!("Ignoring stale reconnect timer");
            return;
        }
        inner.reconnect.timer = None;

        let Some(config) = inner.config.clone() else {
            return;
        };
        match self.shared.endpoint.build_url(&config) {
            Ok(url) => {
                tracing::info!(attempt = inner.reconnect.attempts, "Reconnecting");
                self.open_locked(&mut inner, url);
            }
            Err(e) => tracing::error!(error = %e, "Cannot rebuild endpoint for reconnect"),
        }
    }
}

/// Forward one transport's events to the manager until it closes
async fn pump(shared: Weak<Shared>, epoch: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let closed = matches!(event, TransportEvent::Closed { .. });
        ConnectionManager { shared }.handle_event(epoch, event);
        if closed {
            return;
        }
    }

    // Transport went away without reporting why
    if let Some(shared) = shared.upgrade() {
        ConnectionManager { shared }.handle_event(
            epoch,
            TransportEvent::Closed {
                reason: "transport dropped".to_string(),
            },
        );
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
