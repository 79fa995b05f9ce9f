//! Realtime event tail
//!
//! Connects to the realtime server with configuration from the environment
//! (or a `.env` file) and logs every event it receives.
//!
//! Usage:
//!   realtime-tail
//!   realtime-tail conversation:42 company:7
//!
//! Topics are only subscribed on agent connections (`REALTIME_ROLE=agent`).
//! Exits on Ctrl-C or once reconnect attempts are exhausted.

use std::sync::Arc;

use anyhow::Context;
use helpdesk_realtime::{
    CallerRole, ConnectionConfig, ConnectionEvent, EventTag, FileIdentityStore, IdentityStore,
    MemoryIdentityStore, MessagingClient, RealtimeSettings, Topic,
};
use tokio::sync::broadcast::error::RecvError;

fn init_subscriber() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("REALTIME_LOG_JSON")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.compact().try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_subscriber();

    let topics = std::env::args()
        .skip(1)
        .map(|raw| raw.parse::<Topic>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid topic argument")?;

    let config = ConnectionConfig::from_env().context("loading connection config")?;
    let settings = RealtimeSettings::from_env().context("loading realtime settings")?;
    let identity: Arc<dyn IdentityStore> = match std::env::var("REALTIME_IDENTITY_FILE") {
        Ok(path) => Arc::new(FileIdentityStore::new(path)),
        Err(_) => Arc::new(MemoryIdentityStore::new()),
    };

    if !topics.is_empty() && config.role != CallerRole::Agent {
        anyhow::bail!("topic subscriptions require REALTIME_ROLE=agent");
    }

    let builder = match config.role {
        CallerRole::Agent => MessagingClient::agent(),
        CallerRole::Contact => MessagingClient::widget(),
    };
    let client = builder.settings(settings).identity(identity).build()?;

    for tag in EventTag::KNOWN {
        client.register_handler(tag.clone(), |envelope| {
            tracing::info!(
                event = %envelope.event,
                payload = %envelope.payload,
                "Received event"
            );
        });
    }

    let mut lifecycle = client.lifecycle();
    client.connect(config)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, disconnecting");
                client.disconnect();
                return Ok(());
            }
            event = lifecycle.recv() => match event {
                Ok(ConnectionEvent::Connected { session_id }) => {
                    tracing::info!(session_id = %session_id, "Connected");
                    for topic in &topics {
                        if let Err(e) = client.subscribe(&topic.to_string()) {
                            tracing::warn!(topic = %topic, error = %e, "Subscribe failed");
                        }
                    }
                }
                Ok(ConnectionEvent::ReconnectFailed { attempts }) => {
                    anyhow::bail!("gave up after {} reconnect attempts", attempts);
                }
                Ok(other) => tracing::debug!(event = ?other, "Connection lifecycle"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Lifecycle receiver lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
