//! Event bus for campaign lifecycle and delivery notifications

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use wacm_common::types::{CampaignId, MessageId};
use wacm_storage::models::{MessageStatus, RunStats};

/// Events published by the scheduler and the webhook processor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CampaignEvent {
    Started {
        campaign_id: CampaignId,
    },
    Completed {
        campaign_id: CampaignId,
        stats: RunStats,
    },
    Stopped {
        campaign_id: CampaignId,
        reason: String,
    },
    Paused {
        campaign_id: CampaignId,
    },
    Resumed {
        campaign_id: CampaignId,
    },
    Cancelled {
        campaign_id: CampaignId,
    },
    MessageStatus {
        message_id: MessageId,
        campaign_id: Option<CampaignId>,
        status: MessageStatus,
    },
}

/// Broadcast channel of [`CampaignEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CampaignEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: CampaignEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CampaignEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(CampaignEvent::Paused {
            campaign_id: Uuid::new_v4(),
        });
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.publish(CampaignEvent::Cancelled { campaign_id: id });

        assert_eq!(
            rx.recv().await.unwrap(),
            CampaignEvent::Cancelled { campaign_id: id }
        );
    }
}
