use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cairn_types::models::{MAX_MESSAGE_LEN, Message};
use cairn_types::wire::WireEnvelope;

use crate::channel::{ChannelSession, SubscriptionGuard};
use crate::config::CatchUp;
use crate::error::RealtimeError;
use crate::merge::{LiveBuffer, merge_messages};
use crate::reconnect::ReconnectController;
use crate::transport::Transport;

const POISONED: &str = "feed state poisoned";

/// Durable message operations the feed needs from the data-access layer.
///
/// The durable copy returned by `persist` carries the envelope's
/// client-generated id, so history re-fetches reconcile against the live list
/// by plain identity.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Full history of a conversation, ascending by creation timestamp.
    async fn fetch_history(&self, conversation_id: &str) -> anyhow::Result<Vec<Message>>;

    /// Messages created strictly after `since`, ascending.
    async fn fetch_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Message>>;

    async fn persist(&self, envelope: &WireEnvelope) -> anyhow::Result<Message>;
}

/// Snapshot for the connection banner: attempts vs. maximum while
/// disconnected, and whether the feed has given up on realtime entirely.
#[derive(Debug, Clone, Copy)]
pub struct FeedStatus {
    pub connected: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub degraded: bool,
}

/// The authoritative, ordered, de-duplicated view of one conversation:
/// durable history merged with the live subscription, kept healthy by the
/// reconnect supervisor.
pub struct ConversationFeed {
    inner: Arc<FeedInner>,
    supervisor: JoinHandle<()>,
}

struct FeedInner {
    transport: Transport,
    store: Arc<dyn MessageStore>,
    conversation_id: String,
    controller: ReconnectController,
    state: Mutex<FeedState>,
    degraded: AtomicBool,
}

#[derive(Default)]
struct FeedState {
    durable: Vec<Message>,
    live: LiveBuffer,
    session: Option<Arc<ChannelSession>>,
    subscription: Option<SubscriptionGuard>,
    /// Newest merged timestamp, for `CatchUp::SinceLastSeen`.
    last_seen: Option<DateTime<Utc>>,
}

impl ConversationFeed {
    /// Open a feed for one conversation: attach the live channel, fetch the
    /// durable history, and start the reconnect supervisor.
    ///
    /// A failed initial attach is not fatal — the feed comes up in degraded
    /// mode serving durable history while the supervisor retries. A failed
    /// history fetch is surfaced.
    pub async fn open(
        transport: Transport,
        store: Arc<dyn MessageStore>,
        conversation_id: impl Into<String>,
    ) -> Result<Self, RealtimeError> {
        let conversation_id = conversation_id.into();
        let controller =
            ReconnectController::new(transport.clone(), transport.config().reconnect);
        let inner = Arc::new(FeedInner {
            transport,
            store,
            conversation_id,
            controller,
            state: Mutex::new(FeedState::default()),
            degraded: AtomicBool::new(false),
        });

        match FeedInner::establish(&inner).await {
            Ok(()) => {}
            Err(err @ RealtimeError::FetchFailed(_)) => return Err(err),
            Err(err) => {
                warn!(
                    conversation = %inner.conversation_id,
                    error = %err,
                    "initial realtime attach failed; the supervisor will retry"
                );
                // Degraded mode still serves durable history.
                inner.refresh().await?;
            }
        }

        let supervisor = tokio::spawn({
            let inner = inner.clone();
            async move {
                let liveness = inner.transport.config().liveness_interval;
                let reestablish = {
                    let inner = inner.clone();
                    move || -> BoxFuture<'static, Result<(), RealtimeError>> {
                        let inner = inner.clone();
                        Box::pin(async move { FeedInner::establish(&inner).await })
                    }
                };
                if let Err(err) = inner.controller.supervise(liveness, reestablish).await {
                    warn!(
                        conversation = %inner.conversation_id,
                        error = %err,
                        "realtime feed degraded to poll-on-demand"
                    );
                    inner.degraded.store(true, Ordering::SeqCst);
                }
            }
        });

        Ok(Self { inner, supervisor })
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    /// Merged, ordered, de-duplicated snapshot.
    pub fn messages(&self) -> Vec<Message> {
        let state = self.inner.state.lock().expect(POISONED);
        merge_messages(&state.durable, state.live.messages())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.state().is_connected()
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            connected: self.is_connected(),
            attempts: self.inner.controller.attempts(),
            max_attempts: self.inner.controller.max_attempts(),
            degraded: self.inner.degraded.load(Ordering::SeqCst)
                || self.inner.controller.is_exhausted(),
        }
    }

    /// Re-fetch durable history on demand. This is the degraded-mode path:
    /// it works with no realtime connection at all.
    pub async fn refresh(&self) -> Result<(), RealtimeError> {
        self.inner.refresh().await
    }

    /// Validate, optimistically append, publish, persist.
    ///
    /// Validation failures reject before any network call and leave no
    /// optimistic entry. When the transport is down a just-in-time reconnect
    /// is attempted first; once the reconnect budget is exhausted the send is
    /// refused outright.
    pub async fn send(&self, sender_id: &str, body: &str) -> Result<Message, RealtimeError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(RealtimeError::Validation("message body is empty"));
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(RealtimeError::Validation(
                "message too long (max 1000 characters)",
            ));
        }
        if self.inner.controller.is_exhausted() {
            return Err(RealtimeError::ReconnectExhausted(
                self.inner.controller.max_attempts(),
            ));
        }

        let session = {
            let state = self.inner.state.lock().expect(POISONED);
            state.session.clone()
        };
        let session = match session {
            Some(session) if self.is_connected() => session,
            _ => {
                FeedInner::establish(&self.inner).await?;
                let state = self.inner.state.lock().expect(POISONED);
                state.session.clone().ok_or(RealtimeError::NotConnected)?
            }
        };

        let envelope = WireEnvelope::chat(&self.inner.conversation_id, sender_id, body);
        {
            let mut state = self.inner.state.lock().expect(POISONED);
            state.live.record_sent(envelope.clone().into_message());
        }

        if let Err(err) = session.publish(&envelope).await {
            let mut state = self.inner.state.lock().expect(POISONED);
            // The echo will never arrive; the optimistic entry stays for the
            // caller to roll back or retry.
            state.live.forget_sent(&envelope.id);
            return Err(err);
        }

        let durable = self
            .inner
            .store
            .persist(&envelope)
            .await
            .map_err(|err| RealtimeError::SendFailed(err.to_string()))?;

        {
            let mut state = self.inner.state.lock().expect(POISONED);
            let ts = durable.created_at;
            state.last_seen = Some(state.last_seen.map_or(ts, |t| t.max(ts)));
        }
        Ok(durable)
    }

    /// Release the subscription and stop the supervisor.
    pub fn close(self) {}
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.supervisor.abort();
        let mut state = self.inner.state.lock().expect(POISONED);
        state.subscription = None;
        state.session = None;
    }
}

impl FeedInner {
    /// (Re-)establish the live half of the feed: tear down the previous
    /// session, make sure the transport is up, re-attach, re-subscribe, then
    /// catch up on durable history so nothing sent during an outage is lost.
    async fn establish(inner: &Arc<FeedInner>) -> Result<(), RealtimeError> {
        {
            // Release the old subscription before re-attaching so handlers
            // never accumulate.
            let mut state = inner.state.lock().expect(POISONED);
            state.subscription = None;
            state.session = None;
        }

        let connect_timeout = inner.transport.config().connect_timeout;
        inner.transport.ensure_connected(connect_timeout).await?;

        let session = Arc::new(
            ChannelSession::open_conversation(&inner.transport, &inner.conversation_id).await?,
        );
        let weak = Arc::downgrade(inner);
        let guard = session.subscribe(move |envelope| {
            let Some(inner) = weak.upgrade() else { return };
            inner.observe_live(envelope);
        });

        // Subscription first, fetch second: anything published in between
        // arrives live and the merge dedups the overlap.
        inner.refresh().await?;

        {
            let mut state = inner.state.lock().expect(POISONED);
            state.session = Some(session);
            state.subscription = Some(guard);
        }
        inner.controller.reset();
        info!(conversation = %inner.conversation_id, "conversation feed established");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), RealtimeError> {
        let catch_up = self.transport.config().catch_up;
        let since = {
            let state = self.state.lock().expect(POISONED);
            state.last_seen
        };

        let fetched = match (catch_up, since) {
            (CatchUp::SinceLastSeen, Some(since)) => {
                self.store.fetch_since(&self.conversation_id, since).await
            }
            _ => self.store.fetch_history(&self.conversation_id).await,
        }
        .map_err(|err| RealtimeError::FetchFailed(err.to_string()))?;

        let mut state = self.state.lock().expect(POISONED);
        let newest = fetched.iter().map(|m| m.created_at).max();
        if let Some(ts) = newest {
            state.last_seen = Some(state.last_seen.map_or(ts, |t| t.max(ts)));
        }
        match (catch_up, since) {
            (CatchUp::SinceLastSeen, Some(_)) => state.durable.extend(fetched),
            _ => state.durable = fetched,
        }
        Ok(())
    }

    fn observe_live(&self, envelope: WireEnvelope) {
        let message = envelope.into_message();
        let ts = message.created_at;
        let mut state = self.state.lock().expect(POISONED);
        if state.live.observe(message) {
            state.last_seen = Some(state.last_seen.map_or(ts, |t| t.max(ts)));
            debug!(conversation = %self.conversation_id, "live message appended");
        }
    }
}
