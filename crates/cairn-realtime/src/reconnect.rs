use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{info, warn};

use crate::error::RealtimeError;
use crate::transport::{ConnectionState, Transport};

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based):
    /// `min(base * 2^attempt, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }
}

/// Keeps a channel session usable across transient transport failures without
/// the consumer re-initiating manually.
///
/// The controller owns the attempt counter. Consumers read it for the
/// "reconnecting (n/max)" banner and check `is_exhausted` before sending.
pub struct ReconnectController {
    transport: Transport,
    policy: ReconnectPolicy,
    attempts: AtomicU32,
    exhausted: AtomicBool,
}

impl ReconnectController {
    pub fn new(transport: Transport, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            policy,
            attempts: AtomicU32::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Counter goes back to zero after a successful reconnect.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.exhausted.store(false, Ordering::SeqCst);
    }

    /// Watch the transport until it needs recovery, then drive `reestablish`
    /// with backoff until it succeeds or the attempt bound is hit.
    ///
    /// `reestablish` must release the previous channel session's resources
    /// before re-attaching, so handlers never accumulate. A liveness tick
    /// independently verifies the transport state, defending against a
    /// transport that drifted out of `connected` without emitting an event.
    ///
    /// Returns `ReconnectExhausted` once the bound is hit; the transport is
    /// marked failed and the consumer decides how to degrade.
    pub async fn supervise<F>(
        &self,
        liveness_interval: Duration,
        reestablish: F,
    ) -> Result<(), RealtimeError>
    where
        F: Fn() -> BoxFuture<'static, Result<(), RealtimeError>>,
    {
        let mut state_rx = self.transport.watch_state();
        let mut liveness = tokio::time::interval(liveness_interval);
        liveness.tick().await; // the first tick fires immediately

        // The transport may already be down by the time supervision starts.
        if needs_recovery(*state_rx.borrow_and_update()) {
            self.recover(&reestablish).await?;
        }

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        // Transport dropped; nothing left to supervise.
                        return Ok(());
                    }
                    if needs_recovery(*state_rx.borrow_and_update()) {
                        self.recover(&reestablish).await?;
                    }
                }
                _ = liveness.tick() => {
                    let state = self.transport.state();
                    if !state.is_connected() {
                        warn!(%state, "liveness check found transport not connected");
                        self.recover(&reestablish).await?;
                    }
                }
            }
        }
    }

    async fn recover<F>(&self, reestablish: &F) -> Result<(), RealtimeError>
    where
        F: Fn() -> BoxFuture<'static, Result<(), RealtimeError>>,
    {
        loop {
            // Only the supervisor task mutates the counter.
            let attempt = self.attempts.load(Ordering::SeqCst);
            if attempt >= self.policy.max_attempts {
                self.exhausted.store(true, Ordering::SeqCst);
                self.transport.fail();
                warn!(
                    max_attempts = self.policy.max_attempts,
                    "reconnect attempts exhausted"
                );
                return Err(RealtimeError::ReconnectExhausted(self.policy.max_attempts));
            }
            self.attempts.store(attempt + 1, Ordering::SeqCst);

            let delay = self.policy.backoff_delay(attempt);
            info!(
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::time::sleep(delay).await;

            match reestablish().await {
                Ok(()) => {
                    self.reset();
                    info!("realtime connection re-established");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "reconnect attempt failed");
                }
            }
        }
    }
}

fn needs_recovery(state: ConnectionState) -> bool {
    matches!(
        state,
        ConnectionState::Disconnected | ConnectionState::Suspended | ConnectionState::Failed
    )
}
