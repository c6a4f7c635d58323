//! Domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wacm_common::types::{
    BotRuleId, CampaignId, ContactId, MessageId, TemplateId, Variables,
};

// ============================================================================
// Campaigns
// ============================================================================

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "stopped" => Ok(CampaignStatus::Stopped),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// How a campaign is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Immediate,
    Scheduled,
    Recurring,
}

/// Recurrence cadence for recurring campaigns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
    None,
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recurrence::Daily => write!(f, "daily"),
            Recurrence::Weekly => write!(f, "weekly"),
            Recurrence::Monthly => write!(f, "monthly"),
            Recurrence::None => write!(f, "none"),
        }
    }
}

/// Persisted schedule of a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// IANA timezone name, UTC when absent
    #[serde(default)]
    pub timezone: Option<String>,
}

impl ScheduleDescriptor {
    pub fn immediate() -> Self {
        Self {
            schedule_type: ScheduleType::Immediate,
            start_time: None,
            recurrence: None,
            timezone: None,
        }
    }

    pub fn at(start_time: DateTime<Utc>) -> Self {
        Self {
            schedule_type: ScheduleType::Scheduled,
            start_time: Some(start_time),
            recurrence: None,
            timezone: None,
        }
    }

    pub fn recurring(recurrence: Recurrence, start_time: Option<DateTime<Utc>>) -> Self {
        Self {
            schedule_type: ScheduleType::Recurring,
            start_time,
            recurrence: Some(recurrence),
            timezone: None,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Whether runs of this schedule end back in `scheduled`
    pub fn is_recurring(&self) -> bool {
        self.schedule_type == ScheduleType::Recurring
            && !matches!(self.recurrence, None | Some(Recurrence::None))
    }
}

impl Default for ScheduleDescriptor {
    fn default() -> Self {
        Self::immediate()
    }
}

/// Outcome counters of the last dispatch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Campaign model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub description: Option<String>,
    pub status: CampaignStatus,
    pub template_id: TemplateId,
    pub contact_ids: Vec<ContactId>,
    pub schedule: ScheduleDescriptor,
    pub media_id: Option<String>,
    pub created_by: Option<String>,
    pub last_run_stats: Option<RunStats>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub template_id: TemplateId,
    #[serde(default)]
    pub contact_ids: Vec<ContactId>,
    #[serde(default)]
    pub schedule: ScheduleDescriptor,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Partial campaign update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<CampaignStatus>,
    pub template_id: Option<TemplateId>,
    pub contact_ids: Option<Vec<ContactId>>,
    pub schedule: Option<ScheduleDescriptor>,
    pub media_id: Option<String>,
}

impl UpdateCampaign {
    /// Merge the provided fields into `campaign`. Status is left to the caller.
    pub fn apply_to(&self, campaign: &mut Campaign) {
        if let Some(name) = &self.name {
            campaign.name = name.clone();
        }
        if let Some(description) = &self.description {
            campaign.description = Some(description.clone());
        }
        if let Some(template_id) = self.template_id {
            campaign.template_id = template_id;
        }
        if let Some(contact_ids) = &self.contact_ids {
            campaign.contact_ids = contact_ids.clone();
        }
        if let Some(schedule) = &self.schedule {
            campaign.schedule = schedule.clone();
        }
        if let Some(media_id) = &self.media_id {
            campaign.media_id = Some(media_id.clone());
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Header format of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeaderFormat {
    Text,
    Image,
    Video,
    Document,
}

impl HeaderFormat {
    /// Whether the header carries a media attachment
    pub fn is_media(&self) -> bool {
        !matches!(self, HeaderFormat::Text)
    }
}

/// A single template component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TemplateComponent {
    Header {
        format: HeaderFormat,
        #[serde(default)]
        text: Option<String>,
    },
    Body {
        text: String,
    },
    Footer {
        text: String,
    },
    Buttons {
        #[serde(default)]
        buttons: Vec<serde_json::Value>,
    },
}

/// Approved message template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    /// Template name registered with the provider
    pub external_name: String,
    pub name: String,
    pub category: String,
    pub language: String,
    pub components: Vec<TemplateComponent>,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn header(&self) -> Option<(HeaderFormat, Option<&str>)> {
        self.components.iter().find_map(|c| match c {
            TemplateComponent::Header { format, text } => Some((*format, text.as_deref())),
            _ => None,
        })
    }

    pub fn body(&self) -> Option<&str> {
        self.components.iter().find_map(|c| match c {
            TemplateComponent::Body { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Create template input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub external_name: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

fn default_category() -> String {
    "MARKETING".to_string()
}

fn default_language() -> String {
    "en_US".to_string()
}

// ============================================================================
// Contacts
// ============================================================================

/// Contact model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub phone: String,
    pub tags: Vec<String>,
    pub groups: Vec<String>,
    pub variables: Variables,
    pub created_at: DateTime<Utc>,
}

/// Create contact input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub variables: Variables,
}

// ============================================================================
// Messages
// ============================================================================

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(&self) -> u8 {
        match self {
            MessageStatus::Queued => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 4,
        }
    }

    /// Status only moves forward along queued, sent, delivered, read.
    /// `failed` can be entered from anything but `read` and is terminal.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Failed, _) | (MessageStatus::Read, _) => false,
            (_, MessageStatus::Failed) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Queued => write!(f, "queued"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// What produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Manual,
    Campaign,
    Bot,
    Ai,
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageSource::Manual => write!(f, "manual"),
            MessageSource::Campaign => write!(f, "campaign"),
            MessageSource::Bot => write!(f, "bot"),
            MessageSource::Ai => write!(f, "ai"),
        }
    }
}

impl std::str::FromStr for MessageSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(MessageSource::Manual),
            "campaign" => Ok(MessageSource::Campaign),
            "bot" => Ok(MessageSource::Bot),
            "ai" => Ok(MessageSource::Ai),
            _ => Err(format!("Invalid message source: {}", s)),
        }
    }
}

/// Direction of a message relative to the business number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Outbound,
    Inbound,
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageDirection::Outbound => write!(f, "outbound"),
            MessageDirection::Inbound => write!(f, "inbound"),
        }
    }
}

impl std::str::FromStr for MessageDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" => Ok(MessageDirection::Outbound),
            "inbound" => Ok(MessageDirection::Inbound),
            _ => Err(format!("Invalid message direction: {}", s)),
        }
    }
}

/// Message model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub template_id: Option<TemplateId>,
    /// Provider message id (`wamid...`)
    pub external_id: Option<String>,
    pub direction: MessageDirection,
    pub phone: String,
    pub content: Option<String>,
    pub status: MessageStatus,
    pub source: MessageSource,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Apply a provider status event. Returns false when the event would move
    /// the message backwards and was ignored.
    pub fn apply_status(
        &mut self,
        status: MessageStatus,
        at: DateTime<Utc>,
        error: Option<String>,
    ) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }

        self.status = status;
        match status {
            MessageStatus::Sent => {
                self.sent_at.get_or_insert(at);
            }
            MessageStatus::Delivered => self.delivered_at = Some(at),
            MessageStatus::Read => {
                self.delivered_at.get_or_insert(at);
                self.read_at = Some(at);
            }
            MessageStatus::Failed => self.error = error.or_else(|| self.error.take()),
            MessageStatus::Queued => {}
        }
        true
    }
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub template_id: Option<TemplateId>,
    pub external_id: Option<String>,
    pub direction: MessageDirection,
    pub phone: String,
    pub content: Option<String>,
    pub status: MessageStatus,
    pub source: MessageSource,
    pub error: Option<String>,
}

impl CreateMessage {
    /// An outbound message the provider accepted
    pub fn sent(source: MessageSource, phone: impl Into<String>, external_id: String) -> Self {
        Self {
            campaign_id: None,
            contact_id: None,
            template_id: None,
            external_id: Some(external_id),
            direction: MessageDirection::Outbound,
            phone: phone.into(),
            content: None,
            status: MessageStatus::Sent,
            source,
            error: None,
        }
    }

    /// An outbound message that never reached the provider or was rejected
    pub fn failed(source: MessageSource, phone: impl Into<String>, error: String) -> Self {
        Self {
            campaign_id: None,
            contact_id: None,
            template_id: None,
            external_id: None,
            direction: MessageDirection::Outbound,
            phone: phone.into(),
            content: None,
            status: MessageStatus::Failed,
            source,
            error: Some(error),
        }
    }

    /// A message received from a contact
    pub fn inbound(phone: impl Into<String>, external_id: String, content: String) -> Self {
        Self {
            campaign_id: None,
            contact_id: None,
            template_id: None,
            external_id: Some(external_id),
            direction: MessageDirection::Inbound,
            phone: phone.into(),
            content: Some(content),
            status: MessageStatus::Delivered,
            source: MessageSource::Manual,
            error: None,
        }
    }

    pub fn for_campaign(mut self, campaign_id: CampaignId, template_id: TemplateId) -> Self {
        self.campaign_id = Some(campaign_id);
        self.template_id = Some(template_id);
        self
    }

    pub fn for_contact(mut self, contact_id: Option<ContactId>) -> Self {
        self.contact_id = contact_id;
        self
    }

    pub fn with_content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }
}

// ============================================================================
// Bot rules
// ============================================================================

/// How a bot rule trigger is compared to inbound text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Exact,
    StartsWith,
    Contains,
    Regex,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Exact => write!(f, "exact"),
            TriggerType::StartsWith => write!(f, "startswith"),
            TriggerType::Contains => write!(f, "contains"),
            TriggerType::Regex => write!(f, "regex"),
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(TriggerType::Exact),
            "startswith" => Ok(TriggerType::StartsWith),
            "contains" => Ok(TriggerType::Contains),
            "regex" => Ok(TriggerType::Regex),
            _ => Err(format!("Invalid trigger type: {}", s)),
        }
    }
}

/// What a bot rule answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyType {
    Text,
    Template,
    Media,
}

impl std::fmt::Display for ReplyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyType::Text => write!(f, "text"),
            ReplyType::Template => write!(f, "template"),
            ReplyType::Media => write!(f, "media"),
        }
    }
}

impl std::str::FromStr for ReplyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReplyType::Text),
            "template" => Ok(ReplyType::Template),
            "media" => Ok(ReplyType::Media),
            _ => Err(format!("Invalid reply type: {}", s)),
        }
    }
}

/// Bot auto-reply rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRule {
    pub id: BotRuleId,
    pub name: String,
    pub trigger_type: TriggerType,
    pub triggers: Vec<String>,
    pub reply_type: ReplyType,
    /// Text body, template id or media URL depending on `reply_type`
    pub reply_content: String,
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create bot rule input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBotRule {
    pub name: String,
    pub trigger_type: TriggerType,
    pub triggers: Vec<String>,
    pub reply_type: ReplyType,
    pub reply_content: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Partial bot rule update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBotRule {
    pub name: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub triggers: Option<Vec<String>>,
    pub reply_type: Option<ReplyType>,
    pub reply_content: Option<String>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

impl UpdateBotRule {
    pub fn apply_to(&self, rule: &mut BotRule) {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(trigger_type) = self.trigger_type {
            rule.trigger_type = trigger_type;
        }
        if let Some(triggers) = &self.triggers {
            rule.triggers = triggers.clone();
        }
        if let Some(reply_type) = self.reply_type {
            rule.reply_type = reply_type;
        }
        if let Some(reply_content) = &self.reply_content {
            rule.reply_content = reply_content.clone();
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(active) = self.active {
            rule.active = active;
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// WhatsApp account settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub phone_number_id: String,
    pub access_token: String,
    #[serde(default)]
    pub business_account_id: Option<String>,
    #[serde(default)]
    pub webhook_verify_token: Option<String>,
}

impl Settings {
    /// Both the sender id and the token are present
    pub fn has_credentials(&self) -> bool {
        !self.phone_number_id.trim().is_empty() && !self.access_token.trim().is_empty()
    }
}
