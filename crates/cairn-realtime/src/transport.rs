use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use cairn_types::events::{ProviderCommand, ProviderEvent};
use cairn_types::wire::WireEnvelope;

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;

/// Connection lifecycle:
/// `initializing → connected ⇄ disconnected → suspended → failed`.
///
/// `connected` is reachable from any non-terminal state on a successful
/// handshake. `failed` is terminal until the reconnect controller explicitly
/// retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Connected,
    Disconnected,
    Suspended,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Suspended | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Suspended => "suspended",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Command/event pair for one dialed provider socket.
pub struct ProviderSocket {
    pub commands: mpsc::Sender<ProviderCommand>,
    pub events: mpsc::Receiver<ProviderEvent>,
}

/// The injectable seam to the realtime provider. Production dials a WebSocket
/// (`ws::WsDialer`); tests dial in-memory sockets.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> Result<ProviderSocket, RealtimeError>;
}

struct ChannelEntry {
    deliver: broadcast::Sender<WireEnvelope>,
    attached: watch::Sender<bool>,
    /// Open `ChannelSession`s on this channel. The entry is removed when the
    /// last session drops.
    refs: usize,
}

/// One shared connection to the realtime provider.
///
/// Constructed once at application startup and passed by clone; all channel
/// sessions multiplex over it. Connection state is only mutated here and by
/// the reconnect controller — consumers just read it.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: RealtimeConfig,
    dialer: Box<dyn Dialer>,
    state_tx: watch::Sender<ConnectionState>,
    /// Command side of the current socket, if any.
    link: Mutex<Option<mpsc::Sender<ProviderCommand>>>,
    channels: RwLock<HashMap<String, ChannelEntry>>,
    /// Publish acknowledgements awaited by envelope id.
    pending_acks: Mutex<HashMap<String, oneshot::Sender<()>>>,
    /// Serializes concurrent connect attempts.
    connect_lock: tokio::sync::Mutex<()>,
    /// Bumped on every successful dial so a superseded driver task can tell
    /// it no longer owns the connection state.
    epoch: AtomicU64,
}

impl Transport {
    /// Fails with `Configuration` when the provider key is absent — the one
    /// fatal startup error in the subsystem.
    pub fn new(
        config: RealtimeConfig,
        dialer: impl Dialer + 'static,
    ) -> Result<Self, RealtimeError> {
        if config.key.trim().is_empty() {
            return Err(RealtimeError::Configuration(
                "realtime provider key is empty".to_string(),
            ));
        }

        let (state_tx, _) = watch::channel(ConnectionState::Initializing);
        Ok(Self {
            inner: Arc::new(TransportInner {
                config,
                dialer: Box::new(dialer),
                state_tx,
                link: Mutex::new(None),
                channels: RwLock::new(HashMap::new()),
                pending_acks: Mutex::new(HashMap::new()),
                connect_lock: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// State transitions for anyone who cares (reconnect controller, status
    /// banners).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Dial the provider and install the new socket. Previously registered
    /// channels are re-attached on the fresh connection.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.state().is_connected() {
            return Ok(());
        }

        // Bump the epoch before dialing so a driver from the previous socket
        // can no longer touch the connection state, whenever it exits.
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let socket = match self.inner.dialer.dial().await {
            Ok(socket) => socket,
            Err(err) => {
                self.inner.set_state(ConnectionState::Suspended);
                return Err(err);
            }
        };

        *self.inner.link.lock().expect("link lock poisoned") = Some(socket.commands.clone());
        tokio::spawn(run_driver(self.inner.clone(), socket.events, epoch));
        self.inner.set_state(ConnectionState::Connected);

        let names: Vec<String> = {
            let channels = self.inner.channels.read().expect("channel registry poisoned");
            channels.keys().cloned().collect()
        };
        for channel in names {
            if socket
                .commands
                .send(ProviderCommand::Attach { channel: channel.clone() })
                .await
                .is_err()
            {
                warn!(%channel, "connection closed while re-attaching");
                break;
            }
        }

        Ok(())
    }

    /// Fast path when already connected; otherwise forces a reconnect attempt
    /// and waits for the `connected` transition, bounded by `timeout`.
    ///
    /// This is the primary blocking point of the subsystem.
    pub async fn ensure_connected(&self, timeout: Duration) -> Result<(), RealtimeError> {
        if self.state().is_connected() {
            debug!("already connected");
            return Ok(());
        }
        if self.state() == ConnectionState::Failed {
            return Err(RealtimeError::ConnectionFailed(
                "connection is in the failed state".to_string(),
            ));
        }

        info!("forcing reconnection");
        match tokio::time::timeout(timeout, self.connect()).await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::ConnectionTimeout(timeout)),
        }
    }

    /// Explicit terminal transition, driven by the reconnect controller once
    /// its attempt bound is hit.
    pub fn fail(&self) {
        self.inner.set_state(ConnectionState::Failed);
    }

    pub(crate) fn register_channel(&self, name: &str) -> watch::Receiver<bool> {
        let mut channels = self.inner.channels.write().expect("channel registry poisoned");
        let entry = channels.entry(name.to_string()).or_insert_with(|| {
            let (deliver, _) = broadcast::channel(256);
            let (attached, _) = watch::channel(false);
            ChannelEntry {
                deliver,
                attached,
                refs: 0,
            }
        });
        entry.refs += 1;
        entry.attached.subscribe()
    }

    /// Drop one session's hold on a channel; detach when it was the last.
    pub(crate) fn release_channel(&self, name: &str) {
        let mut channels = self.inner.channels.write().expect("channel registry poisoned");
        let Some(entry) = channels.get_mut(name) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            channels.remove(name);
            drop(channels);
            self.try_send_command(ProviderCommand::Detach {
                channel: name.to_string(),
            });
            debug!(channel = name, "released last session, detaching");
        }
    }

    pub(crate) fn subscribe_channel(&self, name: &str) -> broadcast::Receiver<WireEnvelope> {
        let channels = self.inner.channels.read().expect("channel registry poisoned");
        channels
            .get(name)
            .expect("channel registered by an open session")
            .deliver
            .subscribe()
    }

    pub(crate) async fn send_command(&self, command: ProviderCommand) -> Result<(), RealtimeError> {
        let link = self.inner.link.lock().expect("link lock poisoned").clone();
        match link {
            Some(commands) => commands
                .send(command)
                .await
                .map_err(|_| RealtimeError::NotConnected),
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Best-effort variant for synchronous teardown paths.
    pub(crate) fn try_send_command(&self, command: ProviderCommand) {
        let link = self.inner.link.lock().expect("link lock poisoned").clone();
        if let Some(commands) = link {
            let _ = commands.try_send(command);
        }
    }

    pub(crate) fn register_ack(&self, id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_acks
            .lock()
            .expect("ack table poisoned")
            .insert(id.to_string(), tx);
        rx
    }

    pub(crate) fn discard_ack(&self, id: &str) {
        self.inner
            .pending_acks
            .lock()
            .expect("ack table poisoned")
            .remove(id);
    }
}

impl TransportInner {
    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(previous = %current, current = %next, "connection state changed");
            *current = next;
            true
        });
        if next.is_degraded() {
            warn!(state = %next, "realtime connection degraded");
        }
    }
}

/// Routes provider events for one socket until it closes.
async fn run_driver(
    inner: Arc<TransportInner>,
    mut events: mpsc::Receiver<ProviderEvent>,
    epoch: u64,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProviderEvent::Attached { channel } => {
                let channels = inner.channels.read().expect("channel registry poisoned");
                match channels.get(&channel) {
                    Some(entry) => {
                        let _ = entry.attached.send(true);
                        debug!(%channel, "channel attached");
                    }
                    None => trace!(%channel, "attach report for an unregistered channel"),
                }
            }
            ProviderEvent::Detached { channel } => {
                let channels = inner.channels.read().expect("channel registry poisoned");
                if let Some(entry) = channels.get(&channel) {
                    let _ = entry.attached.send(false);
                    debug!(%channel, "channel detached");
                }
            }
            ProviderEvent::Message { channel, message } => {
                let channels = inner.channels.read().expect("channel registry poisoned");
                match channels.get(&channel) {
                    // No receivers is fine; sessions come and go.
                    Some(entry) => {
                        let _ = entry.deliver.send(message);
                    }
                    None => trace!(%channel, "dropping event for an unregistered channel"),
                }
            }
            ProviderEvent::PublishAck { id, .. } => {
                let waiter = inner
                    .pending_acks
                    .lock()
                    .expect("ack table poisoned")
                    .remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => trace!(%id, "unmatched publish acknowledgement"),
                }
            }
        }
    }

    // Socket closed. Only the current driver owns the transition; a driver
    // superseded by a newer dial stays quiet.
    if inner.epoch.load(Ordering::SeqCst) == epoch {
        *inner.link.lock().expect("link lock poisoned") = None;
        inner
            .pending_acks
            .lock()
            .expect("ack table poisoned")
            .clear();
        {
            let channels = inner.channels.read().expect("channel registry poisoned");
            for entry in channels.values() {
                let _ = entry.attached.send(false);
            }
        }
        inner.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Behavior, ScriptedDialer};

    fn config() -> RealtimeConfig {
        RealtimeConfig::new("test-key")
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let result = Transport::new(
            RealtimeConfig::new(""),
            ScriptedDialer::new(Behavior::default()),
        );
        assert!(matches!(result, Err(RealtimeError::Configuration(_))));
    }

    #[tokio::test]
    async fn connect_transitions_to_connected() {
        let transport =
            Transport::new(config(), ScriptedDialer::new(Behavior::default())).unwrap();
        assert_eq!(transport.state(), ConnectionState::Initializing);

        transport.connect().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Connected);

        // Fast path: no second dial needed.
        transport
            .ensure_connected(Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dial_failure_suspends() {
        let dialer = ScriptedDialer::new(Behavior::default());
        dialer.fail_next_dials(1);
        let transport = Transport::new(config(), dialer).unwrap();

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, RealtimeError::ConnectionFailed(_)));
        assert_eq!(transport.state(), ConnectionState::Suspended);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_connected_times_out_on_a_hanging_dial() {
        let transport =
            Transport::new(config(), ScriptedDialer::new(Behavior::hanging())).unwrap();

        let err = transport
            .ensure_connected(Duration::from_secs(15))
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::ConnectionTimeout(_)));
    }

    #[tokio::test]
    async fn failed_state_is_terminal_for_ensure_connected() {
        let transport =
            Transport::new(config(), ScriptedDialer::new(Behavior::default())).unwrap();
        transport.fail();

        let err = transport
            .ensure_connected(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn socket_close_transitions_to_disconnected() {
        let dialer = ScriptedDialer::new(Behavior::default());
        let handle = dialer.handle();
        let transport = Transport::new(config(), dialer).unwrap();
        transport.connect().await.unwrap();

        let mut state_rx = transport.watch_state();
        handle.kill_link();
        state_rx.changed().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_reattaches_registered_channels() {
        let dialer = ScriptedDialer::new(Behavior::default());
        let handle = dialer.handle();
        let transport = Transport::new(config(), dialer).unwrap();
        transport.connect().await.unwrap();

        let mut attached = transport.register_channel("chat:c1");
        transport
            .send_command(ProviderCommand::Attach {
                channel: "chat:c1".to_string(),
            })
            .await
            .unwrap();
        attached.wait_for(|a| *a).await.unwrap();

        // Drop the socket, reconnect, and the channel comes back attached
        // without anyone re-opening it.
        let mut state_rx = transport.watch_state();
        handle.kill_link();
        state_rx.changed().await.unwrap();
        assert!(!*attached.borrow());

        transport.connect().await.unwrap();
        attached.wait_for(|a| *a).await.unwrap();
    }
}
