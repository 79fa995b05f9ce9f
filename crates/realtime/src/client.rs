//! Messaging facade
//!
//! [`MessagingClient`] composes the connection manager, subscription manager
//! and event dispatcher into the single object applications depend on. The
//! widget and agent clients differ only in their endpoint strategy and in
//! whether topic subscriptions are available.

use std::sync::Arc;

use helpdesk_shared::{CallerRole, EventTag};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::{ConnectionConfig, RealtimeSettings};
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::dispatcher::{EventDispatcher, Listener};
use crate::endpoint;
use crate::error::{RealtimeError, RealtimeResult};
use crate::handlers::{self, TypeHandlers};
use crate::identity::{IdentityStore, MemoryIdentityStore};
use crate::message::{build, Envelope};
use crate::subscription::SubscriptionManager;
use crate::transport::{Connector, WebSocketConnector};

/// Builder for [`MessagingClient`]
pub struct MessagingClientBuilder {
    role: CallerRole,
    settings: RealtimeSettings,
    connector: Option<Box<dyn Connector>>,
    identity: Option<Arc<dyn IdentityStore>>,
    handlers: TypeHandlers,
}

impl MessagingClientBuilder {
    fn new(role: CallerRole) -> Self {
        Self {
            role,
            settings: RealtimeSettings::default(),
            connector: None,
            identity: None,
            handlers: TypeHandlers::new(),
        }
    }

    pub fn settings(mut self, settings: RealtimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Transport to use instead of the WebSocket connector
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Where the caller id is loaded from and persisted to
    pub fn identity(mut self, identity: Arc<dyn IdentityStore>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Add or replace the type handler for `event`
    pub fn type_handler(
        mut self,
        event: EventTag,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Self {
        self.handlers = self.handlers.on(event, handler);
        self
    }

    /// Merge a whole table of type handlers
    pub fn type_handlers(mut self, handlers: TypeHandlers) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Assemble and wire the client; must be called inside a Tokio runtime
    /// before connecting
    pub fn build(self) -> RealtimeResult<MessagingClient> {
        let connector = self
            .connector
            .unwrap_or_else(|| Box::new(WebSocketConnector));
        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(MemoryIdentityStore::new()));

        let connection = ConnectionManager::new(
            connector,
            endpoint::for_role(self.role),
            identity,
            self.settings,
        );
        let subscriptions = match self.role {
            CallerRole::Agent => Some(SubscriptionManager::attach(&connection)),
            CallerRole::Contact => None,
        };

        let dispatcher = EventDispatcher::new();
        let mut table = handlers::core(subscriptions.as_ref().map(SubscriptionManager::topic_set));
        table.extend(self.handlers);
        dispatcher.register_type_handlers(table)?;

        let inbound = dispatcher.clone();
        connection.on_message(move |envelope| inbound.dispatch(envelope));

        let failures = dispatcher.clone();
        connection.on_reconnect_exhausted(move |attempts| {
            failures.dispatch_local(&build(
                EventTag::ConnectionError,
                json!({
                    "attempts": attempts,
                    "message": format!("Unable to reconnect after {} attempts", attempts),
                }),
            ));
        });

        tracing::debug!(role = %self.role, "Messaging client ready");

        Ok(MessagingClient {
            role: self.role,
            connection,
            subscriptions,
            dispatcher,
        })
    }
}

/// The realtime messaging client
#[derive(Clone)]
pub struct MessagingClient {
    role: CallerRole,
    connection: ConnectionManager,
    subscriptions: Option<SubscriptionManager>,
    dispatcher: EventDispatcher,
}

impl MessagingClient {
    /// Client for the end-user chat widget (no topic subscriptions)
    pub fn widget() -> MessagingClientBuilder {
        MessagingClientBuilder::new(CallerRole::Contact)
    }

    /// Client for the agent portal
    pub fn agent() -> MessagingClientBuilder {
        MessagingClientBuilder::new(CallerRole::Agent)
    }

    /// Which portal this client serves
    pub fn role(&self) -> CallerRole {
        self.role
    }

    /// Underlying connection manager
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Listener registry fed by inbound frames
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Open a connection, replacing any current one
    pub fn connect(&self, config: ConnectionConfig) -> RealtimeResult<()> {
        self.connection.connect(config)
    }

    /// Close the connection and stop reconnecting
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Returns true while the transport is open
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Id of the current transport session
    pub fn session_id(&self) -> Uuid {
        self.connection.session_id()
    }

    /// Receiver for connection lifecycle events
    pub fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.lifecycle()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener for `event`; keep the returned handle to remove it
    pub fn register_handler(
        &self,
        event: EventTag,
        listener: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Listener {
        self.dispatcher.register_handler(event, listener)
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unregister_handler(&self, event: &EventTag, listener: &Listener) -> bool {
        self.dispatcher.unregister_handler(event, listener)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    fn subscription_manager(&self) -> RealtimeResult<&SubscriptionManager> {
        self.subscriptions
            .as_ref()
            .ok_or(RealtimeError::SubscriptionsUnavailable)
    }

    /// Subscribe to a raw topic (agent only)
    pub fn subscribe(&self, topic: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.subscribe(topic)
    }

    /// Unsubscribe from a raw topic (agent only)
    pub fn unsubscribe(&self, topic: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.unsubscribe(topic)
    }

    /// Subscribe to a conversation and its agent channel
    pub fn subscribe_conversation(&self, conversation_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?
            .subscribe_conversation(conversation_id)
    }

    /// Unsubscribe from a conversation and its agent channel
    pub fn unsubscribe_conversation(&self, conversation_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?
            .unsubscribe_conversation(conversation_id)
    }

    /// Subscribe to company-wide notifications
    pub fn subscribe_company(&self, company_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.subscribe_company(company_id)
    }

    /// Counterpart to `subscribe_company`
    pub fn unsubscribe_company(&self, company_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.unsubscribe_company(company_id)
    }

    /// Subscribe to notifications for a single agent
    pub fn subscribe_user(&self, user_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.subscribe_user(user_id)
    }

    /// Counterpart to `subscribe_user`
    pub fn unsubscribe_user(&self, user_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.unsubscribe_user(user_id)
    }

    /// Subscribe to changes on a contact
    pub fn subscribe_contact(&self, contact_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.subscribe_contact(contact_id)
    }

    /// Counterpart to `subscribe_contact`
    pub fn unsubscribe_contact(&self, contact_id: &str) -> RealtimeResult<()> {
        self.subscription_manager()?.unsubscribe_contact(contact_id)
    }

    /// Recorded topics; always empty on a widget client
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .as_ref()
            .map(SubscriptionManager::get_subscriptions)
            .unwrap_or_default()
    }

    // =========================================================================
    // Domain actions
    // =========================================================================

    /// Send an arbitrary event
    pub async fn send(&self, event: EventTag, payload: Value) -> RealtimeResult<()> {
        self.connection.send(&build(event, payload)).await
    }

    pub async fn start_conversation(&self, inbox_id: &str, content: &str) -> RealtimeResult<()> {
        self.send(
            EventTag::StartConversation,
            json!({ "inboxId": inbox_id, "content": content }),
        )
        .await
    }

    pub async fn send_message(&self, conversation_id: &str, content: &str) -> RealtimeResult<()> {
        self.send(
            EventTag::SendMessage,
            json!({ "conversationId": conversation_id, "content": content }),
        )
        .await
    }

    pub async fn close_conversation(&self, conversation_id: &str) -> RealtimeResult<()> {
        self.send(
            EventTag::CloseConversation,
            json!({ "conversationId": conversation_id }),
        )
        .await
    }

    pub async fn send_typing(&self, conversation_id: &str) -> RealtimeResult<()> {
        self.send(EventTag::TypingStart, json!({ "conversationId": conversation_id }))
            .await
    }

    pub async fn stop_typing(&self, conversation_id: &str) -> RealtimeResult<()> {
        self.send(EventTag::TypingStop, json!({ "conversationId": conversation_id }))
            .await
    }
}
