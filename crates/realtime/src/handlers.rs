//! Type handler table
//!
//! One fixed business handler per event tag, assembled once when the client is
//! built. Application tables are merged over the built-in ones.

use std::collections::HashMap;
use std::sync::Arc;

use helpdesk_shared::EventTag;

use crate::dispatcher::Listener;
use crate::message::Envelope;
use crate::subscription::TopicSet;

/// Builder for an `event tag -> handler` table
#[derive(Default, Clone)]
pub struct TypeHandlers {
    handlers: HashMap<EventTag, Listener>,
}

impl TypeHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler for `event`, replacing any previous one
    pub fn on(mut self, event: EventTag, handler: impl Fn(&Envelope) + Send + Sync + 'static) -> Self {
        self.handlers.insert(event, Arc::new(handler));
        self
    }

    /// Merge `other` into this table; entries in `other` win
    pub fn extend(&mut self, other: TypeHandlers) {
        self.handlers.extend(other.handlers);
    }

    pub fn contains(&self, event: &EventTag) -> bool {
        self.handlers.contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn into_map(self) -> HashMap<EventTag, Listener> {
        self.handlers
    }
}

/// Built-in handlers every client carries
///
/// With a topic set, a server refusal (`subscription_error`) also removes the
/// topic locally.
pub(crate) fn core(topics: Option<TopicSet>) -> TypeHandlers {
    TypeHandlers::new()
        .on(EventTag::Connected, |_| {
            tracing::info!("Server completed realtime handshake");
        })
        .on(EventTag::Error, |envelope| {
            tracing::warn!(
                message = envelope.payload_str("message").unwrap_or("unspecified"),
                "Server reported an error"
            );
        })
        .on(EventTag::Subscribed, |envelope| {
            tracing::debug!(topic = envelope.payload_str("topic"), "Subscription confirmed");
        })
        .on(EventTag::SubscriptionError, move |envelope| {
            let Some(topic) = envelope.payload_str("topic") else {
                tracing::warn!("Subscription refused without a topic");
                return;
            };
            tracing::warn!(
                topic,
                reason = envelope.payload_str("reason").unwrap_or("unspecified"),
                "Subscription refused by server"
            );
            if let Some(topics) = &topics {
                topics.forget(topic);
            }
        })
        .on(EventTag::ConnectionError, |envelope| {
            tracing::error!(
                attempts = envelope.payload.get("attempts").and_then(|v| v.as_u64()),
                message = envelope.payload_str("message").unwrap_or("unspecified"),
                "Realtime connection failed"
            );
        })
}
