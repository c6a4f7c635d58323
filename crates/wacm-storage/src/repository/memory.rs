//! In-memory store

use crate::models::{
    BotRule, Campaign, CampaignStatus, Contact, CreateBotRule, CreateCampaign, CreateContact,
    CreateMessage, CreateTemplate, Message, RunStats, Settings, Template,
};
use crate::repository::Store;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use wacm_common::types::{normalize_phone, BotRuleId, CampaignId, ContactId, MessageId, TemplateId};
use wacm_common::{Error, Result};

/// Store keeping every table in a `HashMap` behind a tokio `RwLock`
#[derive(Default)]
pub struct MemoryStore {
    campaigns: RwLock<HashMap<CampaignId, Campaign>>,
    templates: RwLock<HashMap<TemplateId, Template>>,
    contacts: RwLock<HashMap<ContactId, Contact>>,
    messages: RwLock<HashMap<MessageId, Message>>,
    bot_rules: RwLock<HashMap<BotRuleId, BotRule>>,
    settings: RwLock<Option<Settings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &str, id: Uuid) -> Error {
    Error::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_campaign(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            status: CampaignStatus::Draft,
            template_id: input.template_id,
            contact_ids: input.contact_ids,
            schedule: input.schedule,
            media_id: input.media_id,
            created_by: input.created_by,
            last_run_stats: None,
            created_at: now,
            updated_at: now,
        };
        self.campaigns
            .write()
            .await
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(&id).cloned())
    }

    async fn list_campaigns(&self, status: Option<CampaignStatus>) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .read()
            .await
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(campaigns)
    }

    async fn update_campaign(&self, mut campaign: Campaign) -> Result<Campaign> {
        let mut campaigns = self.campaigns.write().await;
        let slot = campaigns
            .get_mut(&campaign.id)
            .ok_or_else(|| not_found("Campaign", campaign.id))?;
        campaign.updated_at = Utc::now();
        *slot = campaign.clone();
        Ok(campaign)
    }

    async fn update_campaign_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()> {
        let mut campaigns = self.campaigns.write().await;
        let campaign = campaigns
            .get_mut(&id)
            .ok_or_else(|| not_found("Campaign", id))?;
        campaign.status = status;
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn set_campaign_run_stats(&self, id: CampaignId, stats: RunStats) -> Result<()> {
        let mut campaigns = self.campaigns.write().await;
        let campaign = campaigns
            .get_mut(&id)
            .ok_or_else(|| not_found("Campaign", id))?;
        campaign.last_run_stats = Some(stats);
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_campaign(&self, id: CampaignId) -> Result<()> {
        self.campaigns
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("Campaign", id))
    }

    async fn create_template(&self, input: CreateTemplate) -> Result<Template> {
        let template = Template {
            id: Uuid::new_v4(),
            external_name: input.external_name,
            name: input.name,
            category: input.category,
            language: input.language,
            components: input.components,
            created_at: Utc::now(),
        };
        self.templates
            .write()
            .await
            .insert(template.id, template.clone());
        Ok(template)
    }

    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        let mut templates: Vec<Template> = self.templates.read().await.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    async fn delete_template(&self, id: TemplateId) -> Result<()> {
        self.templates
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("Template", id))
    }

    async fn create_contact(&self, input: CreateContact) -> Result<Contact> {
        let contact = Contact {
            id: Uuid::new_v4(),
            name: input.name,
            phone: input.phone,
            tags: input.tags,
            groups: input.groups,
            variables: input.variables,
            created_at: Utc::now(),
        };
        self.contacts
            .write()
            .await
            .insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.contacts.read().await.get(&id).cloned())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self.contacts.read().await.values().cloned().collect();
        contacts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(contacts)
    }

    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>> {
        let wanted = normalize_phone(phone);
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .contacts
            .read()
            .await
            .values()
            .filter(|c| normalize_phone(&c.phone) == wanted)
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn create_message(&self, input: CreateMessage) -> Result<Message> {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            template_id: input.template_id,
            external_id: input.external_id,
            direction: input.direction,
            phone: input.phone,
            content: input.content,
            status: input.status,
            source: input.source,
            sent_at: (input.status == crate::models::MessageStatus::Sent).then_some(now),
            delivered_at: None,
            read_at: None,
            error: input.error,
            created_at: now,
        };
        self.messages
            .write()
            .await
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn get_message_by_external_id(&self, external_id: &str) -> Result<Option<Message>> {
        Ok(self
            .messages
            .read()
            .await
            .values()
            .find(|m| m.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn update_message(&self, message: Message) -> Result<Message> {
        let mut messages = self.messages.write().await;
        let slot = messages
            .get_mut(&message.id)
            .ok_or_else(|| not_found("Message", message.id))?;
        *slot = message.clone();
        Ok(message)
    }

    async fn list_messages(&self, campaign_id: Option<CampaignId>) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .await
            .values()
            .filter(|m| campaign_id.map_or(true, |id| m.campaign_id == Some(id)))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn create_bot_rule(&self, input: CreateBotRule) -> Result<BotRule> {
        let now = Utc::now();
        let rule = BotRule {
            id: Uuid::new_v4(),
            name: input.name,
            trigger_type: input.trigger_type,
            triggers: input.triggers,
            reply_type: input.reply_type,
            reply_content: input.reply_content,
            priority: input.priority,
            active: input.active,
            created_at: now,
            updated_at: now,
        };
        self.bot_rules.write().await.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn get_bot_rule(&self, id: BotRuleId) -> Result<Option<BotRule>> {
        Ok(self.bot_rules.read().await.get(&id).cloned())
    }

    async fn list_bot_rules(&self) -> Result<Vec<BotRule>> {
        let mut rules: Vec<BotRule> = self.bot_rules.read().await.values().cloned().collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(rules)
    }

    async fn get_active_bot_rules(&self) -> Result<Vec<BotRule>> {
        let mut rules = self.list_bot_rules().await?;
        rules.retain(|r| r.active);
        Ok(rules)
    }

    async fn update_bot_rule(&self, mut rule: BotRule) -> Result<BotRule> {
        let mut rules = self.bot_rules.write().await;
        let slot = rules
            .get_mut(&rule.id)
            .ok_or_else(|| not_found("Bot rule", rule.id))?;
        rule.updated_at = Utc::now();
        *slot = rule.clone();
        Ok(rule)
    }

    async fn delete_bot_rule(&self, id: BotRuleId) -> Result<()> {
        self.bot_rules
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("Bot rule", id))
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        Ok(self.settings.read().await.clone())
    }

    async fn put_settings(&self, settings: Settings) -> Result<Settings> {
        *self.settings.write().await = Some(settings.clone());
        Ok(settings)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageSource, ScheduleDescriptor};
    use pretty_assertions::assert_eq;

    fn campaign_input(name: &str) -> CreateCampaign {
        CreateCampaign {
            name: name.to_string(),
            description: None,
            template_id: Uuid::new_v4(),
            contact_ids: vec![],
            schedule: ScheduleDescriptor::immediate(),
            media_id: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn campaign_status_and_stats_are_persisted() {
        let store = MemoryStore::new();
        let campaign = store.create_campaign(campaign_input("promo")).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);

        store
            .update_campaign_status(campaign.id, CampaignStatus::Scheduled)
            .await
            .unwrap();
        let now = Utc::now();
        store
            .set_campaign_run_stats(
                campaign.id,
                RunStats {
                    started_at: now,
                    finished_at: now,
                    attempted: 3,
                    succeeded: 2,
                    failed: 1,
                },
            )
            .await
            .unwrap();

        let stored = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Scheduled);
        assert_eq!(stored.last_run_stats.map(|s| s.failed), Some(1));

        let scheduled = store
            .list_campaigns(Some(CampaignStatus::Scheduled))
            .await
            .unwrap();
        assert_eq!(scheduled.len(), 1);
        assert!(store
            .list_campaigns(Some(CampaignStatus::Running))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn updating_unknown_campaign_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_campaign_status(Uuid::new_v4(), CampaignStatus::Stopped)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn contacts_are_found_by_normalized_phone() {
        let store = MemoryStore::new();
        let contact = store
            .create_contact(CreateContact {
                name: "Ana".into(),
                phone: "+55 (11) 99999-0000".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = store.find_contact_by_phone("5511999990000").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(contact.id));
        assert!(store.find_contact_by_phone("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_are_indexed_by_external_id_and_campaign() {
        let store = MemoryStore::new();
        let campaign_id = Uuid::new_v4();
        let template_id = Uuid::new_v4();
        let sent = store
            .create_message(
                CreateMessage::sent(MessageSource::Campaign, "1555", "wamid.A".into())
                    .for_campaign(campaign_id, template_id),
            )
            .await
            .unwrap();
        store
            .create_message(CreateMessage::failed(
                MessageSource::Bot,
                "1556",
                "boom".into(),
            ))
            .await
            .unwrap();

        assert!(sent.sent_at.is_some());
        let by_external = store.get_message_by_external_id("wamid.A").await.unwrap();
        assert_eq!(by_external.map(|m| m.id), Some(sent.id));
        assert_eq!(store.list_messages(Some(campaign_id)).await.unwrap().len(), 1);
        assert_eq!(store.list_messages(None).await.unwrap().len(), 2);
    }
}
