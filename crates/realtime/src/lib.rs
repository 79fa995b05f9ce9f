//! Helpdesk Realtime Client
//!
//! This crate contains the real-time messaging core shared by the end-user
//! chat widget and the agent portal: a reconnecting connection manager, topic
//! subscriptions that survive reconnects, inbound event dispatch and the
//! [`MessagingClient`] facade that ties them together.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod message;
pub mod subscription;
pub mod transport;

pub use client::{MessagingClient, MessagingClientBuilder};
pub use config::{ConfigError, ConnectionConfig, ReconnectPolicy, RealtimeSettings};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use dispatcher::{EventDispatcher, Listener};
pub use error::{RealtimeError, RealtimeResult};
pub use handlers::TypeHandlers;
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use message::{build, Envelope};
pub use subscription::SubscriptionManager;
pub use transport::{Connector, WebSocketConnector};

pub use helpdesk_shared::{CallerRole, EventTag, Topic};
