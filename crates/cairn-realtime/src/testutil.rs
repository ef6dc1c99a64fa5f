//! In-memory scripted provider for transport/channel/feed tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use cairn_types::events::{ProviderCommand, ProviderEvent};

use crate::error::RealtimeError;
use crate::transport::{Dialer, ProviderSocket};

/// What the scripted provider does with commands.
#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    pub ack_attach: bool,
    pub ack_publish: bool,
    /// Echo published envelopes back as channel messages, as the real
    /// provider does.
    pub echo: bool,
    pub hang_dial: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            ack_attach: true,
            ack_publish: true,
            echo: true,
            hang_dial: false,
        }
    }
}

impl Behavior {
    pub fn hanging() -> Self {
        Self {
            hang_dial: true,
            ..Self::default()
        }
    }

    /// Accepts commands but never responds to anything.
    pub fn silent() -> Self {
        Self {
            ack_attach: false,
            ack_publish: false,
            echo: false,
            hang_dial: false,
        }
    }

    pub fn no_publish_ack() -> Self {
        Self {
            ack_publish: false,
            echo: false,
            ..Self::default()
        }
    }

    pub fn no_echo() -> Self {
        Self {
            echo: false,
            ..Self::default()
        }
    }
}

pub struct ScriptedDialer {
    behavior: Behavior,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    fail_next: AtomicU32,
    current: Mutex<Option<CurrentLink>>,
}

struct CurrentLink {
    events: mpsc::Sender<ProviderEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Test-side handle onto the scripted provider, valid across re-dials.
#[derive(Clone)]
pub struct ProviderHandle {
    shared: Arc<Shared>,
}

impl ScriptedDialer {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn handle(&self) -> ProviderHandle {
        ProviderHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn fail_next_dials(&self, count: u32) {
        self.shared.fail_next.store(count, Ordering::SeqCst);
    }
}

impl ProviderHandle {
    /// Drop the current socket, as a network failure would.
    pub fn kill_link(&self) {
        let mut current = self.shared.current.lock().expect("link table poisoned");
        if let Some(mut link) = current.take() {
            if let Some(shutdown) = link.shutdown.take() {
                let _ = shutdown.send(());
            }
        }
    }

    /// Deliver an event to the client as the provider would.
    pub async fn inject(&self, event: ProviderEvent) {
        let events = {
            let current = self.shared.current.lock().expect("link table poisoned");
            current.as_ref().map(|link| link.events.clone())
        };
        events
            .expect("no live provider link")
            .send(event)
            .await
            .expect("client side dropped");
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self) -> Result<ProviderSocket, RealtimeError> {
        if self.behavior.hang_dial {
            futures_util::future::pending::<()>().await;
        }

        loop {
            let remaining = self.shared.fail_next.load(Ordering::SeqCst);
            if remaining == 0 {
                break;
            }
            if self
                .shared
                .fail_next
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(RealtimeError::ConnectionFailed(
                    "scripted dial failure".to_string(),
                ));
            }
        }

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ProviderCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<ProviderEvent>(256);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        *self.shared.current.lock().expect("link table poisoned") = Some(CurrentLink {
            events: event_tx.clone(),
            shutdown: Some(shutdown_tx),
        });

        let behavior = self.behavior;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    command = cmd_rx.recv() => {
                        let Some(command) = command else { break };
                        match command {
                            ProviderCommand::Attach { channel } => {
                                if behavior.ack_attach {
                                    let _ = event_tx
                                        .send(ProviderEvent::Attached { channel })
                                        .await;
                                }
                            }
                            ProviderCommand::Detach { channel } => {
                                if behavior.ack_attach {
                                    let _ = event_tx
                                        .send(ProviderEvent::Detached { channel })
                                        .await;
                                }
                            }
                            ProviderCommand::Publish { channel, message } => {
                                if behavior.ack_publish {
                                    let _ = event_tx
                                        .send(ProviderEvent::PublishAck {
                                            channel: channel.clone(),
                                            id: message.id.clone(),
                                        })
                                        .await;
                                }
                                if behavior.echo {
                                    let _ = event_tx
                                        .send(ProviderEvent::Message { channel, message })
                                        .await;
                                }
                            }
                        }
                    }
                }
            }
            // event_tx drops here; the transport driver sees the socket close.
        });

        Ok(ProviderSocket {
            commands: cmd_tx,
            events: event_rx,
        })
    }
}
