//! Topic subscriptions
//!
//! The topic set outlives individual sockets and is replayed after every
//! successful (re)connection.

use std::sync::Arc;

use helpdesk_shared::{EventTag, Topic};
use parking_lot::{Mutex, MutexGuard};
use serde_json::json;

use crate::connection::ConnectionManager;
use crate::error::{RealtimeError, RealtimeResult};
use crate::message::build;

/// Insertion-ordered, duplicate-free set of subscribed topics
#[derive(Debug, Clone, Default)]
pub(crate) struct TopicSet {
    topics: Arc<Mutex<Vec<String>>>,
}

impl TopicSet {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.topics.lock()
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, topic: &str) {
        self.lock().push(topic.to_string());
    }

    /// Drop a topic the server refused; returns true if it was present
    pub(crate) fn forget(&self, topic: &str) -> bool {
        let mut topics = self.lock();
        let before = topics.len();
        topics.retain(|t| t != topic);
        topics.len() < before
    }
}

/// Tracks topics of interest and issues subscribe/unsubscribe directives
#[derive(Clone)]
pub struct SubscriptionManager {
    connection: ConnectionManager,
    topics: TopicSet,
}

impl SubscriptionManager {
    /// Create a manager and hook its replay into the connection's open event
    pub fn attach(connection: &ConnectionManager) -> Self {
        let manager = Self {
            connection: connection.clone(),
            topics: TopicSet::default(),
        };

        let weak = connection.downgrade();
        let topics = manager.topics.clone();
        connection.on_connected(move || {
            if let Some(connection) = weak.upgrade() {
                SubscriptionManager {
                    connection,
                    topics: topics.clone(),
                }
                .resubscribe_all();
            }
        });

        manager
    }

    pub(crate) fn topic_set(&self) -> TopicSet {
        self.topics.clone()
    }

    /// Subscribe to a topic; requires an open connection
    ///
    /// Fails with [`RealtimeError::NotConnected`] whenever the connection is
    /// not open, even for a topic already recorded. The topic is recorded only
    /// once the directive has been transmitted, so a failed call leaves the
    /// set unchanged. Subscribing to a recorded topic while open is a no-op.
    pub fn subscribe(&self, topic: &str) -> RealtimeResult<()> {
        self.subscribe_topic(topic).map(|_| ())
    }

    /// Returns true if the topic was newly added
    fn subscribe_topic(&self, topic: &str) -> RealtimeResult<bool> {
        let mut topics = self.topics.lock();
        if !self.connection.is_connected() {
            tracing::debug!(topic, "Subscribe attempted while not connected");
            return Err(RealtimeError::NotConnected);
        }
        if topics.iter().any(|t| t == topic) {
            return Ok(false);
        }

        self.connection
            .transmit(&build(EventTag::Subscribe, json!({ "topic": topic })))?;
        topics.push(topic.to_string());

        tracing::debug!(topic, total = topics.len(), "Subscribed to topic");
        Ok(true)
    }

    /// Unsubscribe from a topic; requires an open connection
    pub fn unsubscribe(&self, topic: &str) -> RealtimeResult<()> {
        let mut topics = self.topics.lock();
        if !self.connection.is_connected() {
            tracing::debug!(topic, "Unsubscribe attempted while not connected");
            return Err(RealtimeError::NotConnected);
        }

        self.connection
            .transmit(&build(EventTag::Unsubscribe, json!({ "topic": topic })))?;
        topics.retain(|t| t != topic);

        tracing::debug!(topic, total = topics.len(), "Unsubscribed from topic");
        Ok(())
    }

    /// Replay every recorded topic, in subscription order
    pub fn resubscribe_all(&self) {
        let topics = self.topics.lock();
        if topics.is_empty() {
            return;
        }

        let mut failed = 0;
        for topic in topics.iter() {
            let envelope = build(EventTag::Subscribe, json!({ "topic": topic }));
            if let Err(e) = self.connection.transmit(&envelope) {
                failed += 1;
                tracing::warn!(topic = %topic, error = %e, "Failed to replay subscription");
            }
        }

        tracing::info!(
            session_id = %self.connection.session_id(),
            topics = topics.len(),
            failed,
            "Replayed subscriptions"
        );
    }

    /// Snapshot of the recorded topics, in subscription order
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.topics.snapshot()
    }

    /// Forget every topic locally without notifying the server
    pub fn clear_subscriptions(&self) {
        self.topics.lock().clear();
    }

    // =========================================================================
    // Domain wrappers
    // =========================================================================

    /// Subscribe to a conversation and its private agent channel as a unit
    ///
    /// Neither topic is touched unless the connection is open. If the private
    /// channel fails, a public topic added by this call is rolled back.
    pub fn subscribe_conversation(&self, conversation_id: &str) -> RealtimeResult<()> {
        if !self.connection.is_connected() {
            tracing::debug!(conversation_id, "Conversation subscribe attempted while not connected");
            return Err(RealtimeError::NotConnected);
        }
        let public = Topic::Conversation(conversation_id.to_string()).to_string();
        let private = Topic::ConversationAgent(conversation_id.to_string()).to_string();

        let added = self.subscribe_topic(&public)?;
        if let Err(e) = self.subscribe_topic(&private) {
            if added && self.unsubscribe(&public).is_err() {
                self.topics.forget(&public);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Unsubscribe from a conversation and its private agent channel
    pub fn unsubscribe_conversation(&self, conversation_id: &str) -> RealtimeResult<()> {
        self.unsubscribe(&Topic::Conversation(conversation_id.to_string()).to_string())?;
        self.unsubscribe(&Topic::ConversationAgent(conversation_id.to_string()).to_string())
    }

    /// Subscribe to `company:{id}` change notifications
    pub fn subscribe_company(&self, company_id: &str) -> RealtimeResult<()> {
        self.subscribe(&Topic::Company(company_id.to_string()).to_string())
    }

    /// Unsubscribe from `company:{id}`
    pub fn unsubscribe_company(&self, company_id: &str) -> RealtimeResult<()> {
        self.unsubscribe(&Topic::Company(company_id.to_string()).to_string())
    }

    /// Subscribe to `user:{id}` notifications
    pub fn subscribe_user(&self, user_id: &str) -> RealtimeResult<()> {
        self.subscribe(&Topic::User(user_id.to_string()).to_string())
    }

    /// Unsubscribe from `user:{id}`
    pub fn unsubscribe_user(&self, user_id: &str) -> RealtimeResult<()> {
        self.unsubscribe(&Topic::User(user_id.to_string()).to_string())
    }

    /// Subscribe to `contact:{id}` change notifications
    pub fn subscribe_contact(&self, contact_id: &str) -> RealtimeResult<()> {
        self.subscribe(&Topic::Contact(contact_id.to_string()).to_string())
    }

    /// Unsubscribe from `contact:{id}`
    pub fn unsubscribe_contact(&self, contact_id: &str) -> RealtimeResult<()> {
        self.unsubscribe(&Topic::Contact(contact_id.to_string()).to_string())
    }
}
