//! Realtime client configuration

use std::env;
use std::time::Duration;

use helpdesk_shared::CallerRole;
use url::Url;

/// Identity and routing data needed to open a connection
///
/// Immutable for the lifetime of a connection attempt, except that a missing
/// caller id may be back-filled once when the server assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Caller identity (contact id for the widget, user id for agents)
    pub caller_id: Option<String>,
    pub role: CallerRole,
    /// Routing scope: inbox id for contacts, company id for agents
    pub scope_id: String,
    /// Base WebSocket endpoint, without identity query parameters
    pub endpoint: Url,
}

impl ConnectionConfig {
    /// Configuration for an end user connecting through the widget
    pub fn contact(endpoint: Url, inbox_id: impl Into<String>) -> Self {
        Self {
            caller_id: None,
            role: CallerRole::Contact,
            scope_id: inbox_id.into(),
            endpoint,
        }
    }

    /// Configuration for a support agent connecting through the portal
    pub fn agent(endpoint: Url, company_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            caller_id: Some(user_id.into()),
            role: CallerRole::Agent,
            scope_id: company_id.into(),
            endpoint,
        }
    }

    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    /// Record the identity assigned by the server
    ///
    /// Only fills an empty slot; returns false if an identity was already set.
    pub fn backfill_caller_id(&mut self, caller_id: &str) -> bool {
        if self.caller_id.is_some() {
            return false;
        }
        self.caller_id = Some(caller_id.to_string());
        true
    }

    /// Load connection configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = env::var("REALTIME_URL").map_err(|_| ConfigError::Missing("REALTIME_URL"))?;
        let endpoint = Url::parse(&raw_url)
            .map_err(|e| ConfigError::Invalid("REALTIME_URL", e.to_string()))?;

        let role = match env::var("REALTIME_ROLE") {
            Ok(raw) => raw
                .parse()
                .map_err(|e: helpdesk_shared::ProtocolError| {
                    ConfigError::Invalid("REALTIME_ROLE", e.to_string())
                })?,
            Err(_) => CallerRole::default(),
        };

        Ok(Self {
            caller_id: env::var("REALTIME_CALLER_ID").ok().filter(|id| !id.is_empty()),
            role,
            scope_id: env::var("REALTIME_SCOPE_ID")
                .map_err(|_| ConfigError::Missing("REALTIME_SCOPE_ID"))?,
            endpoint,
        })
    }
}

/// Linear reconnect backoff: `base_delay * attempt`, up to `max_attempts`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) reconnect attempt, saturating at
    /// `Duration::MAX`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

/// Tuning knobs for the realtime client
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub reconnect: ReconnectPolicy,
    /// Delay between send retries while the socket is still opening
    pub send_retry_delay: Duration,
    /// Retry ceiling for sends issued while connecting
    pub max_send_retries: usize,
    /// Buffer size of the lifecycle event broadcast
    pub lifecycle_capacity: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            send_retry_delay: Duration::from_millis(100),
            max_send_retries: 30,
            lifecycle_capacity: 64,
        }
    }
}

impl RealtimeSettings {
    /// Load settings from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_attempts: u32 = env::var("REALTIME_MAX_RECONNECT_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.reconnect.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "REALTIME_MAX_RECONNECT_ATTEMPTS",
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            reconnect: ReconnectPolicy {
                base_delay: env_millis("REALTIME_RECONNECT_BASE_DELAY_MS")
                    .unwrap_or(defaults.reconnect.base_delay),
                max_attempts,
            },
            send_retry_delay: env_millis("REALTIME_SEND_RETRY_DELAY_MS")
                .unwrap_or(defaults.send_retry_delay),
            max_send_retries: env::var("REALTIME_MAX_SEND_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_send_retries),
            lifecycle_capacity: env::var("REALTIME_LIFECYCLE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.lifecycle_capacity),
        })
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "REALTIME_URL",
            "REALTIME_ROLE",
            "REALTIME_SCOPE_ID",
            "REALTIME_CALLER_ID",
            "REALTIME_RECONNECT_BASE_DELAY_MS",
            "REALTIME_MAX_RECONNECT_ATTEMPTS",
            "REALTIME_SEND_RETRY_DELAY_MS",
            "REALTIME_MAX_SEND_RETRIES",
            "REALTIME_LIFECYCLE_CAPACITY",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_reconnect_delay_is_linear() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(250),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_reconnect_delay_saturates_instead_of_overflowing() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(u64::MAX),
            max_attempts: 2000,
        };
        assert_eq!(policy.delay_for(1001), Duration::MAX);
        assert_eq!(policy.delay_for(1), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_backfill_only_fills_empty_identity() {
        let endpoint = Url::parse("wss://chat.example.com/ws").unwrap();
        let mut config = ConnectionConfig::contact(endpoint.clone(), "inbox-1");
        assert!(config.backfill_caller_id("contact-9"));
        assert!(!config.backfill_caller_id("contact-10"));
        assert_eq!(config.caller_id.as_deref(), Some("contact-9"));

        let mut agent = ConnectionConfig::agent(endpoint, "company-1", "user-1");
        assert!(!agent.backfill_caller_id("user-2"));
        assert_eq!(agent.caller_id.as_deref(), Some("user-1"));
    }

    #[test]
    #[serial]
    fn test_connection_config_from_env() {
        clear_env();

        assert!(matches!(
            ConnectionConfig::from_env(),
            Err(ConfigError::Missing("REALTIME_URL"))
        ));

        env::set_var("REALTIME_URL", "not a url");
        assert!(matches!(
            ConnectionConfig::from_env(),
            Err(ConfigError::Invalid("REALTIME_URL", _))
        ));

        env::set_var("REALTIME_URL", "wss://chat.example.com/ws");
        env::set_var("REALTIME_SCOPE_ID", "company-3");
        env::set_var("REALTIME_ROLE", "agent");
        env::set_var("REALTIME_CALLER_ID", "user-8");
        let config = ConnectionConfig::from_env().unwrap();
        assert_eq!(config.role, CallerRole::Agent);
        assert_eq!(config.scope_id, "company-3");
        assert_eq!(config.caller_id.as_deref(), Some("user-8"));

        env::set_var("REALTIME_ROLE", "robot");
        assert!(matches!(
            ConnectionConfig::from_env(),
            Err(ConfigError::Invalid("REALTIME_ROLE", _))
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_settings_from_env() {
        clear_env();

        let settings = RealtimeSettings::from_env().unwrap();
        assert_eq!(settings.reconnect, ReconnectPolicy::default());
        assert_eq!(settings.max_send_retries, 30);

        env::set_var("REALTIME_RECONNECT_BASE_DELAY_MS", "500");
        env::set_var("REALTIME_MAX_RECONNECT_ATTEMPTS", "3");
        env::set_var("REALTIME_SEND_RETRY_DELAY_MS", "garbage");
        let settings = RealtimeSettings::from_env().unwrap();
        assert_eq!(settings.reconnect.base_delay, Duration::from_millis(500));
        assert_eq!(settings.reconnect.max_attempts, 3);
        assert_eq!(settings.send_retry_delay, Duration::from_millis(100));

        env::set_var("REALTIME_MAX_RECONNECT_ATTEMPTS", "0");
        assert!(RealtimeSettings::from_env().is_err());

        clear_env();
    }
}
