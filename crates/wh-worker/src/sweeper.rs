// SPDX-License-Identifier: MIT OR Apache-2.0
//! §4.8's safety net: periodic rescan for PENDING notifications whose
//! `next_retry_at` has passed, republished in case their delayed message
//! was lost (broker restart, or a worker that crashed between
//! `schedule_retry` and `publish_with_delay`).

use crate::CancellationToken;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use wh_broker::QueueBrokerClient;
use wh_store::NotificationStore;

/// Sweeper tunables.
#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    /// How often to scan for stragglers. §4.8 suggests 30s.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// The single-instance periodic task described in §4.8.
///
/// Republishing a notification the broker already has in flight is safe:
/// the worker's PENDING precondition check means only the first arrival to
/// reach the store observes `Pending`, and every later duplicate — whether
/// from the sweeper or from the broker's own at-least-once redelivery —
/// finds a terminal or already-scheduled record and is a no-op.
pub struct Sweeper {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn QueueBrokerClient>,
    config: SweeperConfig,
}

impl Sweeper {
    /// Construct a sweeper over the given store and broker.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        broker: Arc<dyn QueueBrokerClient>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    /// Run one scan-and-republish pass. Exposed separately from [`Self::run`]
    /// so tests can drive a single sweep deterministically instead of
    /// waiting on a timer.
    pub async fn sweep_once(&self) -> Result<usize, wh_error::StoreError> {
        let due = self.store.find_due_for_retry(Utc::now()).await?;
        let mut republished = 0usize;
        for notification in due {
            match self.broker.publish(notification.id).await {
                Ok(()) => {
                    republished += 1;
                    debug!(notification_id = %notification.id, "sweeper republished overdue retry");
                }
                Err(err) => {
                    error!(
                        notification_id = %notification.id,
                        error = %err,
                        "sweeper failed to republish overdue retry"
                    );
                }
            }
        }
        if republished > 0 {
            info!(count = republished, "sweeper republished overdue retries");
        }
        Ok(republished)
    }

    /// Run [`Self::sweep_once`] on `config.interval` until `token` is
    /// cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        // The first tick fires immediately; skip it so the sweeper's first
        // real scan happens one interval after startup, not at t=0 racing
        // the very publishes it exists to back up.
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        error!(error = %err, "sweeper scan failed");
                    }
                }
            }
        }
    }
}
