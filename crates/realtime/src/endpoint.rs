//! Endpoint URL strategies
//!
//! The widget and the agent portal connect to the same server with different
//! identity and routing parameters. The connection manager is generic over
//! how the URL is assembled.

use helpdesk_shared::CallerRole;
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{RealtimeError, RealtimeResult};

/// Builds the connection URL for a config
pub trait EndpointStrategy: Send + Sync + 'static {
    fn build_url(&self, config: &ConnectionConfig) -> RealtimeResult<Url>;
}

/// End users: `?type=contact&inbox_id=..[&contact_id=..]`
#[derive(Debug, Clone, Copy, Default)]
pub struct WidgetEndpoint;

/// Agents: `?type=agent&company_id=..[&user_id=..]`
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentEndpoint;

impl EndpointStrategy for WidgetEndpoint {
    fn build_url(&self, config: &ConnectionConfig) -> RealtimeResult<Url> {
        role_url(CallerRole::Contact, config)
    }
}

impl EndpointStrategy for AgentEndpoint {
    fn build_url(&self, config: &ConnectionConfig) -> RealtimeResult<Url> {
        role_url(CallerRole::Agent, config)
    }
}

/// Strategy matching a caller role
pub fn for_role(role: CallerRole) -> Box<dyn EndpointStrategy> {
    match role {
        CallerRole::Contact => Box::new(WidgetEndpoint),
        CallerRole::Agent => Box::new(AgentEndpoint),
    }
}

fn role_url(role: CallerRole, config: &ConnectionConfig) -> RealtimeResult<Url> {
    if config.role != role {
        return Err(RealtimeError::InvalidEndpoint(format!(
            "{} endpoint cannot serve a {} connection",
            role, config.role
        )));
    }
    if !matches!(config.endpoint.scheme(), "ws" | "wss") {
        return Err(RealtimeError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            config.endpoint.scheme()
        )));
    }
    if config.scope_id.is_empty() {
        return Err(RealtimeError::InvalidEndpoint(format!(
            "{} is required",
            role.scope_key()
        )));
    }

    let mut url = config.endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("type", role.as_str());
        query.append_pair(role.scope_key(), &config.scope_id);
        if let Some(caller_id) = &config.caller_id {
            query.append_pair(role.identity_key(), caller_id);
        }
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_widget_url_without_identity() {
        let config = ConnectionConfig::contact(endpoint("wss://chat.example.com/ws"), "inbox-1");
        let url = WidgetEndpoint.build_url(&config).unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/ws?type=contact&inbox_id=inbox-1");
    }

    #[test]
    fn test_widget_url_with_identity() {
        let config = ConnectionConfig::contact(endpoint("wss://chat.example.com/ws"), "inbox-1")
            .with_caller_id("contact 9");
        let url = WidgetEndpoint.build_url(&config).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://chat.example.com/ws?type=contact&inbox_id=inbox-1&contact_id=contact+9"
        );
    }

    #[test]
    fn test_agent_url_preserves_existing_query() {
        let config = ConnectionConfig::agent(
            endpoint("ws://localhost:3000/ws?v=2"),
            "company-5",
            "user-3",
        );
        let url = AgentEndpoint.build_url(&config).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:3000/ws?v=2&type=agent&company_id=company-5&user_id=user-3"
        );
    }

    #[test]
    fn test_mismatched_role_and_bad_scheme_rejected() {
        let agent = ConnectionConfig::agent(endpoint("wss://chat.example.com/ws"), "c", "u");
        assert!(matches!(
            WidgetEndpoint.build_url(&agent),
            Err(RealtimeError::InvalidEndpoint(_))
        ));

        let http = ConnectionConfig::contact(endpoint("https://chat.example.com/ws"), "inbox-1");
        assert!(matches!(
            for_role(CallerRole::Contact).build_url(&http),
            Err(RealtimeError::InvalidEndpoint(_))
        ));

        let empty = ConnectionConfig::contact(endpoint("wss://chat.example.com/ws"), "");
        assert!(WidgetEndpoint.build_url(&empty).is_err());
    }
}
