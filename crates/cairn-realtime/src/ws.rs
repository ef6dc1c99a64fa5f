use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use cairn_types::events::{ProviderCommand, ProviderEvent};

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::transport::{Dialer, ProviderSocket};

/// Dials the realtime provider over a WebSocket and pumps the tagged protocol
/// frames between the socket and the transport's command/event pair.
pub struct WsDialer {
    endpoint: String,
    key: String,
}

impl WsDialer {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(&config.endpoint, &config.key)
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.key)
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self) -> Result<ProviderSocket, RealtimeError> {
        let (stream, _response) = connect_async(self.url())
            .await
            .map_err(|err| RealtimeError::ConnectionFailed(err.to_string()))?;
        debug!(endpoint = %self.endpoint, "provider socket established");

        let (mut sink, mut source) = stream.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ProviderCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<ProviderEvent>(256);

        // Writer: drain commands into the socket; closing the command side
        // closes the socket.
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "unserializable provider command");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: parse events until the socket closes. Dropping `event_tx`
        // is how the transport driver observes the close.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<ProviderEvent>(&text) {
                            Ok(event) => {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(
                                    error = %err,
                                    "bad provider frame: {}",
                                    &text[..text.len().min(200)]
                                );
                            }
                        }
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Ok(ProviderSocket {
            commands: cmd_tx,
            events: event_rx,
        })
    }
}
