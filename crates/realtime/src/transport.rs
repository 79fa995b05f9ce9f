//! Transport abstraction
//!
//! A [`Connector`] opens a socket and hands back a [`TransportHandle`]
//! immediately. Opening completes asynchronously and is reported through the
//! event channel (`Opened`, or `Closed` on failure). Dropping the command
//! sender closes the socket.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Commands sent from the connection manager to a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Transmit a serialized text frame
    Send(String),
    /// Close the socket
    Close,
}

/// Events reported by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed { reason: String },
}

/// Both ends of an open (or opening) socket, as seen by the connection manager
#[derive(Debug)]
pub struct TransportHandle {
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transports
pub trait Connector: Send + Sync + 'static {
    /// Begin opening a socket to `url`; must not block
    fn open(&self, url: Url) -> TransportHandle;
}

impl Connector for Box<dyn Connector> {
    fn open(&self, url: Url) -> TransportHandle {
        (**self).open(url)
    }
}

/// WebSocket transport backed by tokio-tungstenite
///
/// Each socket runs on its own spawned task. Must be used inside a Tokio
/// runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(&self, url: Url) -> TransportHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(url, command_rx, event_tx));

        TransportHandle {
            commands: command_tx,
            events: event_rx,
        }
    }
}

/// Pump one WebSocket in both directions until either side closes
async fn run_socket(
    url: Url,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(host = ?url.host_str(), error = %e, "WebSocket connect failed");
            let _ = events.send(TransportEvent::Closed {
                reason: e.to_string(),
            });
            return;
        }
    };

    if events.send(TransportEvent::Opened).is_err() {
        // Nobody is listening anymore
        return;
    }

    let (mut sink, mut stream) = stream.split();

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TransportCommand::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break e.to_string();
                    }
                }
                Some(TransportCommand::Close) | None => {
                    let _ = sink.close().await;
                    break "closed by client".to_string();
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                }
                // Binary frames are not part of the protocol; ping/pong is handled by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    let _ = events.send(TransportEvent::Closed { reason });
}
