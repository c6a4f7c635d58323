//! Campaign dispatch - sends a campaign's template to each of its contacts

use super::template::{build_template_payload, preview};
use super::SchedulerError;
use crate::events::{CampaignEvent, EventBus};
use crate::whatsapp::{MessageSender, WhatsAppCredentials};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use wacm_common::config::DispatchConfig;
use wacm_common::types::{CampaignId, ContactId};
use wacm_storage::models::{
    Campaign, CampaignStatus, CreateMessage, MessageSource, RunStats, Template,
};
use wacm_storage::Store;

/// Everything a single per-contact send needs
struct SendJob {
    store: Arc<dyn Store>,
    sender: Arc<dyn MessageSender>,
    credentials: Arc<WhatsAppCredentials>,
    campaign: Arc<Campaign>,
    template: Arc<Template>,
}

impl SendJob {
    /// Send to one contact and record the outcome. Returns whether the send succeeded.
    ///
    /// A contact that cannot be loaded fails only its own send; missing
    /// template or credentials are the only setup errors that abort a run.
    async fn run(&self, contact_id: ContactId) -> bool {
        let campaign_id = self.campaign.id;
        let template_id = self.template.id;

        let contact = match self.store.get_contact(contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                warn!(%campaign_id, %contact_id, "Contact not found, skipping");
                self.record(
                    CreateMessage::failed(
                        MessageSource::Campaign,
                        "",
                        format!("Contact {} not found", contact_id),
                    )
                    .for_campaign(campaign_id, template_id)
                    .for_contact(Some(contact_id)),
                )
                .await;
                return false;
            }
            Err(e) => {
                warn!(%campaign_id, %contact_id, "Failed to load contact: {}", e);
                self.record(
                    CreateMessage::failed(MessageSource::Campaign, "", e.to_string())
                        .for_campaign(campaign_id, template_id)
                        .for_contact(Some(contact_id)),
                )
                .await;
                return false;
            }
        };

        let content = preview(&self.template, &contact);
        let payload = match build_template_payload(
            &self.template,
            &contact,
            self.campaign.media_id.as_deref(),
        ) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%campaign_id, %contact_id, "Skipping contact: {}", e);
                self.record(
                    CreateMessage::failed(MessageSource::Campaign, &contact.phone, e.to_string())
                        .for_campaign(campaign_id, template_id)
                        .for_contact(Some(contact.id))
                        .with_content(content),
                )
                .await;
                return false;
            }
        };

        match self
            .sender
            .send_template(&self.credentials, &contact.phone, payload)
            .await
        {
            Ok(external_id) => {
                debug!(%campaign_id, %contact_id, %external_id, "Message sent");
                self.record(
                    CreateMessage::sent(MessageSource::Campaign, &contact.phone, external_id)
                        .for_campaign(campaign_id, template_id)
                        .for_contact(Some(contact.id))
                        .with_content(content),
                )
                .await;
                true
            }
            Err(e) => {
                warn!(%campaign_id, %contact_id, "Send failed: {}", e);
                self.record(
                    CreateMessage::failed(MessageSource::Campaign, &contact.phone, e.to_string())
                        .for_campaign(campaign_id, template_id)
                        .for_contact(Some(contact.id))
                        .with_content(content),
                )
                .await;
                false
            }
        }
    }

    async fn record(&self, message: CreateMessage) {
        if let Err(e) = self.store.create_message(message).await {
            error!(campaign_id = %self.campaign.id, "Failed to record message: {}", e);
        }
    }
}

/// Executes campaign runs with bounded concurrency
pub struct CampaignDispatcher {
    store: Arc<dyn Store>,
    sender: Arc<dyn MessageSender>,
    events: EventBus,
    /// Maximum concurrent sends
    concurrency_limit: usize,
    /// Delay between consecutive send starts
    send_delay: Duration,
    running: Mutex<HashSet<CampaignId>>,
}

impl CampaignDispatcher {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn MessageSender>, events: EventBus) -> Self {
        let defaults = DispatchConfig::default();
        Self {
            store,
            sender,
            events,
            concurrency_limit: defaults.concurrency,
            send_delay: Duration::from_millis(defaults.send_delay_ms),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Apply `[dispatch]` settings
    pub fn with_config(mut self, config: &DispatchConfig) -> Self {
        self.concurrency_limit = config.concurrency.max(1);
        self.send_delay = Duration::from_millis(config.send_delay_ms);
        self
    }

    /// Set concurrency limit
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Set delay between sends
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Whether a run of `campaign_id` is in progress
    pub async fn is_running(&self, campaign_id: CampaignId) -> bool {
        self.running.lock().await.contains(&campaign_id)
    }

    /// Run the campaign once.
    ///
    /// Setup failures leave the campaign `stopped`. A fire while the same
    /// campaign is already running is skipped.
    pub async fn execute(&self, campaign_id: CampaignId) -> Result<RunStats, SchedulerError> {
        if !self.running.lock().await.insert(campaign_id) {
            warn!(%campaign_id, "Campaign already running, skipping this fire");
            return Err(SchedulerError::AlreadyRunning(campaign_id));
        }

        let result = self.execute_inner(campaign_id).await;
        self.running.lock().await.remove(&campaign_id);

        if let Err(e) = &result {
            error!(%campaign_id, "Campaign run aborted: {}", e);
            if !matches!(e, SchedulerError::CampaignNotFound(_)) {
                if let Err(store_err) = self
                    .store
                    .update_campaign_status(campaign_id, CampaignStatus::Stopped)
                    .await
                {
                    error!(%campaign_id, "Failed to mark campaign stopped: {}", store_err);
                }
            }
            self.events.publish(CampaignEvent::Stopped {
                campaign_id,
                reason: e.to_string(),
            });
        }

        result
    }

    async fn execute_inner(&self, campaign_id: CampaignId) -> Result<RunStats, SchedulerError> {
        let started_at = Utc::now();

        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or(SchedulerError::CampaignNotFound(campaign_id))?;

        self.store
            .update_campaign_status(campaign_id, CampaignStatus::Running)
            .await?;
        self.events.publish(CampaignEvent::Started { campaign_id });

        let template = self
            .store
            .get_template(campaign.template_id)
            .await?
            .ok_or(SchedulerError::TemplateNotFound(campaign.template_id))?;

        let credentials = self
            .store
            .get_settings()
            .await?
            .as_ref()
            .and_then(WhatsAppCredentials::from_settings)
            .ok_or(SchedulerError::MissingCredentials)?;

        info!(
            %campaign_id,
            contacts = campaign.contact_ids.len(),
            template = %template.external_name,
            "Starting campaign run"
        );

        let contact_ids = campaign.contact_ids.clone();
        let job = Arc::new(SendJob {
            store: self.store.clone(),
            sender: self.sender.clone(),
            credentials: Arc::new(credentials),
            campaign: Arc::new(campaign),
            template: Arc::new(template),
        });

        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut handles = Vec::with_capacity(contact_ids.len());

        for (index, contact_id) in contact_ids.into_iter().enumerate() {
            if index > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SchedulerError::Internal(e.to_string()))?;
            let job = job.clone();

            handles.push(tokio::spawn(async move {
                let sent = job.run(contact_id).await;
                drop(permit);
                sent
            }));
        }

        let mut stats = RunStats {
            started_at,
            finished_at: started_at,
            attempted: 0,
            succeeded: 0,
            failed: 0,
        };

        for handle in handles {
            stats.attempted += 1;
            match handle.await {
                Ok(true) => stats.succeeded += 1,
                Ok(false) => stats.failed += 1,
                Err(e) => {
                    error!(%campaign_id, "Send task panicked: {}", e);
                    stats.failed += 1;
                }
            }
        }
        stats.finished_at = Utc::now();

        self.store
            .set_campaign_run_stats(campaign_id, stats.clone())
            .await?;

        // A pause or cancel issued mid-run wins over the end-of-run status
        let current = self.store.get_campaign(campaign_id).await?.map(|c| c.status);
        let final_status = match current {
            Some(status @ (CampaignStatus::Paused | CampaignStatus::Stopped)) => status,
            _ if job.campaign.schedule.is_recurring() => CampaignStatus::Scheduled,
            _ => CampaignStatus::Completed,
        };
        self.store
            .update_campaign_status(campaign_id, final_status)
            .await?;

        info!(
            %campaign_id,
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            status = %final_status,
            "Campaign run finished"
        );

        self.events.publish(CampaignEvent::Completed {
            campaign_id,
            stats: stats.clone(),
        });

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        body_template, seed_campaign, seed_contact, seed_template, store_with_credentials,
        FakeSender,
    };
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use wacm_storage::models::{
        HeaderFormat, MessageStatus, Recurrence, ScheduleDescriptor, TemplateComponent,
    };
    use wacm_storage::MemoryStore;

    fn dispatcher(store: Arc<MemoryStore>, sender: Arc<FakeSender>) -> CampaignDispatcher {
        CampaignDispatcher::new(store, sender, EventBus::default()).with_send_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn failed_contact_does_not_stop_the_batch() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::failing_for(&["5511000000002"]));
        let template = body_template(&store).await;
        let a = seed_contact(&store, "Ana", "5511000000001").await;
        let b = seed_contact(&store, "Bruno", "5511000000002").await;
        let c = seed_contact(&store, "Carla", "5511000000003").await;
        let campaign = seed_campaign(
            &store,
            template.id,
            vec![a.id, b.id, c.id],
            ScheduleDescriptor::immediate(),
        )
        .await;

        let stats = dispatcher(store.clone(), sender.clone())
            .execute(campaign.id)
            .await
            .unwrap();

        assert_eq!((stats.attempted, stats.succeeded, stats.failed), (3, 2, 1));
        let recipients: Vec<String> = sender.sent().into_iter().map(|m| m.to).collect();
        assert_eq!(
            recipients,
            vec!["5511000000001", "5511000000002", "5511000000003"]
        );

        let messages = store.list_messages(Some(campaign.id)).await.unwrap();
        assert_eq!(messages.len(), 3);
        let failed = messages
            .iter()
            .find(|m| m.status == MessageStatus::Failed)
            .unwrap();
        assert_eq!(failed.contact_id, Some(b.id));
        assert!(failed.error.as_deref().unwrap().contains("131026"));
        assert!(messages
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .all(|m| m.external_id.is_some()));

        let stored = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Completed);
        assert_eq!(stored.last_run_stats, Some(stats));
    }

    #[tokio::test]
    async fn rendered_body_is_stored_as_content() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let template = body_template(&store).await;
        let ana = seed_contact(&store, "Ana", "5511000000001").await;
        let campaign =
            seed_campaign(&store, template.id, vec![ana.id], ScheduleDescriptor::immediate())
                .await;

        dispatcher(store.clone(), sender)
            .execute(campaign.id)
            .await
            .unwrap();

        let messages = store.list_messages(Some(campaign.id)).await.unwrap();
        assert_eq!(messages[0].content.as_deref(), Some("Hi Ana!"));
        assert_eq!(messages[0].template_id, Some(template.id));
    }

    #[tokio::test]
    async fn missing_media_skips_every_contact_without_sending() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let template = seed_template(
            &store,
            vec![
                TemplateComponent::Header {
                    format: HeaderFormat::Video,
                    text: None,
                },
                TemplateComponent::Body {
                    text: "Watch this".into(),
                },
            ],
        )
        .await;
        let a = seed_contact(&store, "Ana", "5511000000001").await;
        let b = seed_contact(&store, "Bruno", "5511000000002").await;
        let campaign = seed_campaign(
            &store,
            template.id,
            vec![a.id, b.id],
            ScheduleDescriptor::immediate(),
        )
        .await;

        let stats = dispatcher(store.clone(), sender.clone())
            .execute(campaign.id)
            .await
            .unwrap();

        assert_eq!(stats.failed, 2);
        assert!(sender.sent().is_empty());
        let messages = store.list_messages(Some(campaign.id)).await.unwrap();
        assert!(messages
            .iter()
            .all(|m| m.status == MessageStatus::Failed && m.error.is_some()));
    }

    #[tokio::test]
    async fn unknown_contact_is_recorded_as_failure() {
        let store = store_with_credentials().await;
        let template = body_template(&store).await;
        let ana = seed_contact(&store, "Ana", "5511000000001").await;
        let missing = Uuid::new_v4();
        let campaign = seed_campaign(
            &store,
            template.id,
            vec![missing, ana.id],
            ScheduleDescriptor::immediate(),
        )
        .await;

        let stats = dispatcher(store.clone(), Arc::new(FakeSender::default()))
            .execute(campaign.id)
            .await
            .unwrap();

        assert_eq!((stats.succeeded, stats.failed), (1, 1));
        let messages = store.list_messages(Some(campaign.id)).await.unwrap();
        assert!(messages
            .iter()
            .any(|m| m.contact_id == Some(missing) && m.status == MessageStatus::Failed));
    }

    #[tokio::test]
    async fn missing_credentials_stop_the_campaign() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(FakeSender::default());
        let template = body_template(&store).await;
        let ana = seed_contact(&store, "Ana", "5511000000001").await;
        let campaign =
            seed_campaign(&store, template.id, vec![ana.id], ScheduleDescriptor::immediate())
                .await;

        let events = EventBus::default();
        let mut rx = events.subscribe();
        let err = CampaignDispatcher::new(store.clone(), sender.clone(), events)
            .execute(campaign.id)
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::MissingCredentials));
        assert!(sender.sent().is_empty());
        let stored = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Stopped);
        assert!(store.list_messages(Some(campaign.id)).await.unwrap().is_empty());

        assert_eq!(
            rx.recv().await.unwrap(),
            CampaignEvent::Started {
                campaign_id: campaign.id
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            CampaignEvent::Stopped { .. }
        ));
    }

    #[tokio::test]
    async fn missing_template_stops_the_campaign() {
        let store = store_with_credentials().await;
        let campaign =
            seed_campaign(&store, Uuid::new_v4(), vec![], ScheduleDescriptor::immediate()).await;

        let err = dispatcher(store.clone(), Arc::new(FakeSender::default()))
            .execute(campaign.id)
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::TemplateNotFound(_)));
        let stored = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Stopped);
    }

    #[tokio::test]
    async fn recurring_campaign_returns_to_scheduled() {
        let store = store_with_credentials().await;
        let template = body_template(&store).await;
        let ana = seed_contact(&store, "Ana", "5511000000001").await;
        let campaign = seed_campaign(
            &store,
            template.id,
            vec![ana.id],
            ScheduleDescriptor::recurring(Recurrence::Daily, None),
        )
        .await;

        let events = EventBus::default();
        let mut rx = events.subscribe();
        CampaignDispatcher::new(store.clone(), Arc::new(FakeSender::default()), events)
            .with_send_delay(Duration::ZERO)
            .execute(campaign.id)
            .await
            .unwrap();

        let stored = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Scheduled);

        rx.recv().await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            CampaignEvent::Completed { stats, .. } if stats.succeeded == 1
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_spaced_by_the_configured_delay() {
        let store = store_with_credentials().await;
        let template = body_template(&store).await;
        let a = seed_contact(&store, "Ana", "5511000000001").await;
        let b = seed_contact(&store, "Bruno", "5511000000002").await;
        let campaign = seed_campaign(
            &store,
            template.id,
            vec![a.id, b.id],
            ScheduleDescriptor::immediate(),
        )
        .await;

        let started = tokio::time::Instant::now();
        CampaignDispatcher::new(store, Arc::new(FakeSender::default()), EventBus::default())
            .with_config(&DispatchConfig {
                concurrency: 1,
                send_delay_ms: 1000,
            })
            .execute(campaign.id)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
