// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! wh-broker
//!
//! The [`QueueBrokerClient`] trait and [`InProcessBroker`], an in-process
//! reference transport giving native delayed delivery via a
//! `tokio::time::sleep`-driven task per delayed item. Durability is
//! delegated entirely to the notification store; this broker models acks
//! but persists nothing of its own, matching what a real deployment would
//! hand off to an external broker (RabbitMQ/SQS-class system, out of
//! scope here).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;
use wh_core::WorkItem;
use wh_error::BrokerError;

/// A cloneable handle onto the broker's immediate-work channel. Multiple
/// clones compete for items, realizing "N parallel consumers" over a
/// single queue without each consumer needing its own channel.
#[derive(Clone)]
pub struct WorkItemReceiver {
    inner: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
}

impl WorkItemReceiver {
    /// Receive the next work item, or `None` once every sender has been
    /// dropped and the channel is drained.
    pub async fn recv(&self) -> Option<WorkItem> {
        let mut guard = self.inner.lock().await;
        guard.recv().await
    }
}

/// The queue broker surface the service publishes to and the worker
/// consumes from.
#[async_trait]
pub trait QueueBrokerClient: Send + Sync {
    /// Publish a notification for immediate delivery.
    async fn publish(&self, notification_id: Uuid) -> Result<(), BrokerError>;

    /// Publish a notification to be delivered again after `delay`,
    /// carrying the advisory `retry_count` for observability.
    async fn publish_with_delay(
        &self,
        notification_id: Uuid,
        retry_count: u32,
        delay: Duration,
    ) -> Result<(), BrokerError>;

    /// Obtain a handle to consume published work items.
    fn subscribe(&self) -> WorkItemReceiver;
}

/// Reference in-process broker: an unbounded `mpsc` channel for immediate
/// work, plus one spawned timer task per delayed publish that injects the
/// item back onto that same channel once its delay elapses.
pub struct InProcessBroker {
    sender: mpsc::UnboundedSender<WorkItem>,
    receiver: WorkItemReceiver,
}

impl InProcessBroker {
    /// Construct a broker with its channel already open.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: WorkItemReceiver {
                inner: Arc::new(Mutex::new(receiver)),
            },
        }
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBrokerClient for InProcessBroker {
    async fn publish(&self, notification_id: Uuid) -> Result<(), BrokerError> {
        debug!(notification_id = %notification_id, "publishing for immediate delivery");
        self.sender
            .send(WorkItem::first_attempt(notification_id))
            .map_err(|_| BrokerError::ChannelClosed)
    }

    async fn publish_with_delay(
        &self,
        notification_id: Uuid,
        retry_count: u32,
        delay: Duration,
    ) -> Result<(), BrokerError> {
        debug!(
            notification_id = %notification_id,
            retry_count,
            delay_ms = delay.as_millis() as u64,
            "scheduling delayed delivery"
        );
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let item = WorkItem {
                notification_id,
                retry_count,
            };
            if sender.send(item).is_err() {
                warn!(
                    notification_id = %notification_id,
                    "delayed work item dropped: broker receiver has been closed"
                );
            }
        });
        Ok(())
    }

    fn subscribe(&self) -> WorkItemReceiver {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration as TokioDuration};

    #[tokio::test]
    async fn publish_delivers_immediately() {
        let broker = InProcessBroker::new();
        let receiver = broker.subscribe();
        let id = Uuid::new_v4();
        broker.publish(id).await.unwrap();

        let item = timeout(TokioDuration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.notification_id, id);
        assert_eq!(item.retry_count, 0);
    }

    #[tokio::test]
    async fn publish_with_delay_arrives_only_after_the_delay() {
        let broker = InProcessBroker::new();
        let receiver = broker.subscribe();
        let id = Uuid::new_v4();
        broker
            .publish_with_delay(id, 2, Duration::from_millis(50))
            .await
            .unwrap();

        let too_early = timeout(TokioDuration::from_millis(10), receiver.recv()).await;
        assert!(too_early.is_err(), "item should not arrive before its delay elapses");

        let item = timeout(TokioDuration::from_millis(200), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.notification_id, id);
        assert_eq!(item.retry_count, 2);
    }

    #[tokio::test]
    async fn multiple_receivers_compete_for_the_same_items() {
        let broker = InProcessBroker::new();
        let a = broker.subscribe();
        let b = broker.subscribe();
        for _ in 0..4 {
            broker.publish(Uuid::new_v4()).await.unwrap();
        }

        let mut seen = 0;
        for _ in 0..4 {
            let got = tokio::select! {
                item = a.recv() => item,
                item = b.recv() => item,
            };
            assert!(got.is_some());
            seen += 1;
        }
        assert_eq!(seen, 4);
    }

    #[tokio::test]
    async fn receiver_drains_to_none_once_the_broker_is_dropped() {
        let broker = InProcessBroker::new();
        let receiver = broker.subscribe();
        drop(broker);
        assert!(receiver.recv().await.is_none());
    }
}
