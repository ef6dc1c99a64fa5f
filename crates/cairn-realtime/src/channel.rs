use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use cairn_types::events::ProviderCommand;
use cairn_types::wire::{self, WireEnvelope};

use crate::error::RealtimeError;
use crate::transport::Transport;

/// One logical topic on the realtime provider — a conversation, or a
/// per-recipient notification feed — as an attach/subscribe/publish unit.
///
/// Sessions multiplex over the shared transport. Dropping the session
/// releases its hold on the channel; the transport detaches once the last
/// session on a channel is gone.
pub struct ChannelSession {
    transport: Transport,
    channel: String,
    /// Logical id inbound envelopes must carry; anything else is provider
    /// misrouting and gets dropped.
    filter_id: String,
    attached: watch::Receiver<bool>,
}

impl std::fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("channel", &self.channel)
            .field("filter_id", &self.filter_id)
            .finish_non_exhaustive()
    }
}

impl ChannelSession {
    pub async fn open_conversation(
        transport: &Transport,
        conversation_id: &str,
    ) -> Result<Self, RealtimeError> {
        Self::open(
            transport,
            wire::conversation_channel(conversation_id),
            conversation_id.to_string(),
        )
        .await
    }

    /// Wake envelopes are addressed to the channel itself, so a notification
    /// session filters on the channel name.
    pub async fn open_notifications(
        transport: &Transport,
        recipient_id: &str,
    ) -> Result<Self, RealtimeError> {
        let channel = wire::notification_channel(recipient_id);
        Self::open(transport, channel.clone(), channel).await
    }

    async fn open(
        transport: &Transport,
        channel: String,
        filter_id: String,
    ) -> Result<Self, RealtimeError> {
        let attached = transport.register_channel(&channel);
        let session = Self {
            transport: transport.clone(),
            channel,
            filter_id,
            attached,
        };
        session.attach().await?;
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.channel
    }

    pub fn is_attached(&self) -> bool {
        *self.attached.borrow()
    }

    async fn attach(&self) -> Result<(), RealtimeError> {
        if self.is_attached() {
            return Ok(());
        }
        self.transport
            .send_command(ProviderCommand::Attach {
                channel: self.channel.clone(),
            })
            .await?;

        let mut attached = self.attached.clone();
        let timeout = self.transport.config().attach_timeout;
        match tokio::time::timeout(timeout, attached.wait_for(|a| *a)).await {
            Ok(Ok(_)) => {
                debug!(channel = %self.channel, "attached");
                Ok(())
            }
            Ok(Err(_)) => Err(RealtimeError::ChannelNotAttached(self.channel.clone())),
            Err(_) => Err(RealtimeError::AttachTimeout(self.channel.clone())),
        }
    }

    /// Register `handler` for every inbound envelope on this session's
    /// channel whose logical id matches. Returns the guard that owns the
    /// subscription; releasing it is the unsubscribe.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionGuard
    where
        F: Fn(WireEnvelope) + Send + Sync + 'static,
    {
        let mut deliver = self.transport.subscribe_channel(&self.channel);
        let filter_id = self.filter_id.clone();
        let channel = self.channel.clone();
        let task = tokio::spawn(async move {
            loop {
                match deliver.recv().await {
                    Ok(envelope) => {
                        if envelope.conversation_id != filter_id {
                            // Defensive filter against provider misrouting.
                            warn!(
                                expected = %filter_id,
                                received = %envelope.conversation_id,
                                "dropping misrouted envelope"
                            );
                            continue;
                        }
                        handler(envelope);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%channel, missed, "subscriber lagged, envelopes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SubscriptionGuard { task }
    }

    /// Publish an envelope end-to-end: the call completes once the provider
    /// acknowledges it, bounded by the publish timeout. Two publishes from
    /// the same caller therefore complete in the order they were issued.
    pub async fn publish(&self, envelope: &WireEnvelope) -> Result<(), RealtimeError> {
        if envelope.conversation_id != self.filter_id {
            return Err(RealtimeError::SendFailed(
                "envelope does not belong to this channel".to_string(),
            ));
        }

        // A detached channel gets exactly one inline re-attach before failing.
        if !self.is_attached() {
            debug!(channel = %self.channel, "not attached, re-attaching before publish");
            if self.attach().await.is_err() {
                return Err(RealtimeError::ChannelNotAttached(self.channel.clone()));
            }
        }

        let ack = self.transport.register_ack(&envelope.id);
        let command = ProviderCommand::Publish {
            channel: self.channel.clone(),
            message: envelope.clone(),
        };
        if let Err(err) = self.transport.send_command(command).await {
            self.transport.discard_ack(&envelope.id);
            return Err(err);
        }

        let timeout = self.transport.config().publish_timeout;
        match tokio::time::timeout(timeout, ack).await {
            Ok(Ok(())) => {
                debug!(channel = %self.channel, id = %envelope.id, "published");
                Ok(())
            }
            Ok(Err(_)) => Err(RealtimeError::SendFailed(
                "connection closed before the publish was acknowledged".to_string(),
            )),
            Err(_) => {
                self.transport.discard_ack(&envelope.id);
                Err(RealtimeError::PublishTimeout(timeout))
            }
        }
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.transport.release_channel(&self.channel);
    }
}

/// Scoped handle for an active subscription. Releasing (or dropping) it
/// aborts the forwarding task, so callbacks queued behind a pending
/// suspension become no-ops once the consumer is gone.
pub struct SubscriptionGuard {
    task: tokio::task::JoinHandle<()>,
}

impl SubscriptionGuard {
    pub fn release(self) {}
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealtimeConfig;
    use crate::testutil::{Behavior, ScriptedDialer};
    use cairn_types::events::ProviderEvent;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn connected_transport(behavior: Behavior) -> (Transport, crate::testutil::ProviderHandle) {
        let dialer = ScriptedDialer::new(behavior);
        let handle = dialer.handle();
        let transport = Transport::new(RealtimeConfig::new("test-key"), dialer).unwrap();
        transport.connect().await.unwrap();
        (transport, handle)
    }

    fn collector() -> (
        impl Fn(WireEnvelope) + Send + Sync + 'static,
        mpsc::UnboundedReceiver<WireEnvelope>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |envelope| {
                let _ = tx.send(envelope);
            },
            rx,
        )
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<WireEnvelope>) -> WireEnvelope {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("envelope should arrive")
            .expect("collector closed")
    }

    #[tokio::test]
    async fn open_attaches_the_canonical_channel() {
        let (transport, _handle) = connected_transport(Behavior::default()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();
        assert_eq!(session.name(), "chat:c1");
        assert!(session.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn attach_times_out_against_a_silent_provider() {
        let (transport, _handle) = connected_transport(Behavior::silent()).await;
        let err = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::AttachTimeout(channel) if channel == "chat:c1"));
    }

    #[tokio::test]
    async fn subscribe_delivers_matching_envelopes_only() {
        let (transport, handle) = connected_transport(Behavior::no_echo()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();

        let (handler, mut rx) = collector();
        let guard = session.subscribe(handler);

        // Misrouted: right channel, wrong conversation id. Dropped.
        handle
            .inject(ProviderEvent::Message {
                channel: "chat:c1".to_string(),
                message: WireEnvelope::chat("other-conversation", "bob", "nope"),
            })
            .await;
        handle
            .inject(ProviderEvent::Message {
                channel: "chat:c1".to_string(),
                message: WireEnvelope::chat("c1", "bob", "hi"),
            })
            .await;

        let delivered = recv(&mut rx).await;
        assert_eq!(delivered.message, "hi");
        assert!(rx.try_recv().is_err());

        guard.release();
    }

    #[tokio::test]
    async fn released_guard_stops_delivery() {
        let (transport, handle) = connected_transport(Behavior::no_echo()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();

        let (handler, mut rx) = collector();
        let guard = session.subscribe(handler);
        guard.release();
        // Give the abort a chance to land before injecting.
        tokio::task::yield_now().await;

        handle
            .inject(ProviderEvent::Message {
                channel: "chat:c1".to_string(),
                message: WireEnvelope::chat("c1", "bob", "late"),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_completes_on_acknowledgement() {
        let (transport, _handle) = connected_transport(Behavior::no_echo()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();

        let envelope = WireEnvelope::chat("c1", "alice", "hello");
        session.publish(&envelope).await.unwrap();
    }

    #[tokio::test]
    async fn published_envelope_echoes_back_to_the_subscriber() {
        let (transport, _handle) = connected_transport(Behavior::default()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();

        let (handler, mut rx) = collector();
        let _guard = session.subscribe(handler);

        let envelope = WireEnvelope::chat("c1", "alice", "hello");
        session.publish(&envelope).await.unwrap();

        let echoed = recv(&mut rx).await;
        assert_eq!(echoed.id, envelope.id);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_times_out_without_an_acknowledgement() {
        let (transport, _handle) = connected_transport(Behavior::no_publish_ack()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();

        let envelope = WireEnvelope::chat("c1", "alice", "hello");
        let err = session.publish(&envelope).await.unwrap_err();
        assert!(matches!(err, RealtimeError::PublishTimeout(_)));
    }

    #[tokio::test]
    async fn publish_rejects_a_foreign_envelope() {
        let (transport, _handle) = connected_transport(Behavior::default()).await;
        let session = ChannelSession::open_conversation(&transport, "c1")
            .await
            .unwrap();

        let envelope = WireEnvelope::chat("c2", "alice", "wrong room");
        let err = session.publish(&envelope).await.unwrap_err();
        assert!(matches!(err, RealtimeError::SendFailed(_)));
    }
}
