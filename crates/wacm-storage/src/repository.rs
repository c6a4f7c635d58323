//! Repository layer for data access

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    BotRule, Campaign, CampaignStatus, Contact, CreateBotRule, CreateCampaign, CreateContact,
    CreateMessage, CreateTemplate, Message, RunStats, Settings, Template,
};
use async_trait::async_trait;
use wacm_common::types::{BotRuleId, CampaignId, ContactId, MessageId, TemplateId};
use wacm_common::Result;

/// Persistence contract shared by every component
#[async_trait]
pub trait Store: Send + Sync {
    // Campaigns
    async fn create_campaign(&self, input: CreateCampaign) -> Result<Campaign>;
    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list_campaigns(&self, status: Option<CampaignStatus>) -> Result<Vec<Campaign>>;
    /// Full replace; bumps `updated_at`. Fails with `NotFound` for unknown ids.
    async fn update_campaign(&self, campaign: Campaign) -> Result<Campaign>;
    async fn update_campaign_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()>;
    async fn set_campaign_run_stats(&self, id: CampaignId, stats: RunStats) -> Result<()>;
    async fn delete_campaign(&self, id: CampaignId) -> Result<()>;

    // Templates
    async fn create_template(&self, input: CreateTemplate) -> Result<Template>;
    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>>;
    async fn list_templates(&self) -> Result<Vec<Template>>;
    async fn delete_template(&self, id: TemplateId) -> Result<()>;

    // Contacts
    async fn create_contact(&self, input: CreateContact) -> Result<Contact>;
    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>>;
    async fn list_contacts(&self) -> Result<Vec<Contact>>;
    /// Lookup comparing digits only
    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>>;

    // Messages
    async fn create_message(&self, input: CreateMessage) -> Result<Message>;
    async fn get_message(&self, id: MessageId) -> Result<Option<Message>>;
    async fn get_message_by_external_id(&self, external_id: &str) -> Result<Option<Message>>;
    async fn update_message(&self, message: Message) -> Result<Message>;
    async fn list_messages(&self, campaign_id: Option<CampaignId>) -> Result<Vec<Message>>;

    // Bot rules
    async fn create_bot_rule(&self, input: CreateBotRule) -> Result<BotRule>;
    async fn get_bot_rule(&self, id: BotRuleId) -> Result<Option<BotRule>>;
    async fn list_bot_rules(&self) -> Result<Vec<BotRule>>;
    async fn get_active_bot_rules(&self) -> Result<Vec<BotRule>>;
    async fn update_bot_rule(&self, rule: BotRule) -> Result<BotRule>;
    async fn delete_bot_rule(&self, id: BotRuleId) -> Result<()>;

    // Settings
    async fn get_settings(&self) -> Result<Option<Settings>>;
    async fn put_settings(&self, settings: Settings) -> Result<Settings>;

    async fn health_check(&self) -> Result<()>;
}
