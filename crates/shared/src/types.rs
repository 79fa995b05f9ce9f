//! Common types used across the realtime protocol

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

// =============================================================================
// Event Tags
// =============================================================================

/// Event tag carried in the `event` field of every frame
///
/// The set is closed for the events this client understands. Tags introduced
/// by newer servers are preserved as [`EventTag::Unknown`] so they can be
/// ignored instead of failing the frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTag {
    // Connection lifecycle
    Connected,
    Disconnected,
    ConnectionError,
    Error,
    Ping,
    Pong,

    // Subscriptions
    Subscribe,
    Unsubscribe,
    Subscribed,
    SubscriptionError,

    // Conversation lifecycle
    StartConversation,
    ConversationStarted,
    ConversationUpdated,
    ConversationAssigned,
    CloseConversation,
    ConversationClosed,

    // Messaging
    SendMessage,
    NewMessage,
    MessageUpdated,

    // Typing indicators
    TypingStart,
    TypingStop,

    // Change notifications
    ContactCreated,
    ContactUpdated,
    InboxUpdated,
    CompanyUpdated,
    AgentStatusChanged,

    /// Tag not known to this client version
    Unknown(String),
}

impl EventTag {
    /// Every tag this client understands, in declaration order
    pub const KNOWN: &'static [EventTag] = &[
        Self::Connected,
        Self::Disconnected,
        Self::ConnectionError,
        Self::Error,
        Self::Ping,
        Self::Pong,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Subscribed,
        Self::SubscriptionError,
        Self::StartConversation,
        Self::ConversationStarted,
        Self::ConversationUpdated,
        Self::ConversationAssigned,
        Self::CloseConversation,
        Self::ConversationClosed,
        Self::SendMessage,
        Self::NewMessage,
        Self::MessageUpdated,
        Self::TypingStart,
        Self::TypingStop,
        Self::ContactCreated,
        Self::ContactUpdated,
        Self::InboxUpdated,
        Self::CompanyUpdated,
        Self::AgentStatusChanged,
    ];

    /// Wire name of this tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::ConnectionError => "connection_error",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Subscribed => "subscribed",
            Self::SubscriptionError => "subscription_error",
            Self::StartConversation => "start_conversation",
            Self::ConversationStarted => "conversation_started",
            Self::ConversationUpdated => "conversation_updated",
            Self::ConversationAssigned => "conversation_assigned",
            Self::CloseConversation => "close_conversation",
            Self::ConversationClosed => "conversation_closed",
            Self::SendMessage => "send_message",
            Self::NewMessage => "new_message",
            Self::MessageUpdated => "message_updated",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::ContactCreated => "contact_created",
            Self::ContactUpdated => "contact_updated",
            Self::InboxUpdated => "inbox_updated",
            Self::CompanyUpdated => "company_updated",
            Self::AgentStatusChanged => "agent_status_changed",
            Self::Unknown(tag) => tag,
        }
    }

    /// Whether this tag belongs to the known vocabulary
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for EventTag {
    fn from(s: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|tag| tag.as_str() == s)
            .cloned()
            .unwrap_or_else(|| Self::Unknown(s.to_string()))
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from(tag.as_str()))
    }
}

// =============================================================================
// Caller Role
// =============================================================================

/// Who is on the client end of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    /// End user chatting through the embedded widget
    Contact,
    /// Support agent using the portal
    Agent,
}

impl Default for CallerRole {
    fn default() -> Self {
        Self::Contact
    }
}

impl CallerRole {
    /// Wire name of the role, sent as the `type` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Agent => "agent",
        }
    }

    /// Key carrying the caller's identity in query strings and handshake payloads
    pub fn identity_key(&self) -> &'static str {
        match self {
            Self::Contact => "contact_id",
            Self::Agent => "user_id",
        }
    }

    /// Key carrying the routing scope (inbox for contacts, company for agents)
    pub fn scope_key(&self) -> &'static str {
        match self {
            Self::Contact => "inbox_id",
            Self::Agent => "company_id",
        }
    }
}

impl std::fmt::Display for CallerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallerRole {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contact" => Ok(Self::Contact),
            "agent" => Ok(Self::Agent),
            _ => Err(ProtocolError::UnknownRole(s.to_string())),
        }
    }
}

// =============================================================================
// Topics
// =============================================================================

/// Server-side channel a client can subscribe to
///
/// Topics are colon delimited on the wire, e.g. `conversation:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversation(String),
    /// Private agent-only channel paired with a conversation
    ConversationAgent(String),
    Company(String),
    User(String),
    Contact(String),
}

impl Topic {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Conversation(_) => "conversation",
            Self::ConversationAgent(_) => "conversation-agent",
            Self::Company(_) => "company",
            Self::User(_) => "user",
            Self::Contact(_) => "contact",
        }
    }

    /// Identifier part of the topic
    pub fn id(&self) -> &str {
        match self {
            Self::Conversation(id)
            | Self::ConversationAgent(id)
            | Self::Company(id)
            | Self::User(id)
            | Self::Contact(id) => id,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.prefix(), self.id())
    }
}

impl std::str::FromStr for Topic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidTopic(s.to_string()))?;
        if id.is_empty() || id.contains(':') {
            return Err(ProtocolError::InvalidTopic(s.to_string()));
        }

        let id = id.to_string();
        match prefix {
            "conversation" => Ok(Self::Conversation(id)),
            "conversation-agent" => Ok(Self::ConversationAgent(id)),
            "company" => Ok(Self::Company(id)),
            "user" => Ok(Self::User(id)),
            "contact" => Ok(Self::Contact(id)),
            _ => Err(ProtocolError::InvalidTopic(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_wire_names_round_trip() {
        for tag in EventTag::KNOWN {
            assert_eq!(&EventTag::from(tag.as_str()), tag);
        }
    }

    #[test]
    fn test_unknown_event_tag_is_preserved() {
        let tag: EventTag = serde_json::from_str(r#""agent_went_fishing""#).unwrap();
        assert_eq!(tag, EventTag::Unknown("agent_went_fishing".to_string()));
        assert!(!tag.is_known());
        assert_eq!(
            serde_json::to_string(&tag).unwrap(),
            r#""agent_went_fishing""#
        );
    }

    #[test]
    fn test_event_tag_serialization() {
        let json = serde_json::to_string(&EventTag::SubscriptionError).unwrap();
        assert_eq!(json, r#""subscription_error""#);
    }

    #[test]
    fn test_caller_role_keys() {
        assert_eq!(CallerRole::Contact.identity_key(), "contact_id");
        assert_eq!(CallerRole::Contact.scope_key(), "inbox_id");
        assert_eq!(CallerRole::Agent.identity_key(), "user_id");
        assert_eq!(CallerRole::Agent.scope_key(), "company_id");
        assert_eq!("AGENT".parse::<CallerRole>().unwrap(), CallerRole::Agent);
        assert!("robot".parse::<CallerRole>().is_err());
    }

    #[test]
    fn test_topic_display_and_parse() {
        let topic = Topic::ConversationAgent("42".to_string());
        assert_eq!(topic.to_string(), "conversation-agent:42");
        assert_eq!("conversation-agent:42".parse::<Topic>().unwrap(), topic);
        assert_eq!(
            "company:7".parse::<Topic>().unwrap(),
            Topic::Company("7".to_string())
        );
    }

    #[test]
    fn test_invalid_topics_rejected() {
        for raw in ["conversation", "conversation:", "ticket:1", "user:1:2"] {
            assert!(
                matches!(raw.parse::<Topic>(), Err(ProtocolError::InvalidTopic(_))),
                "{raw} should be rejected"
            );
        }
    }
}
