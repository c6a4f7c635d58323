//! PostgreSQL store

use crate::db::DatabasePool;
use crate::models::{
    BotRule, Campaign, CampaignStatus, Contact, CreateBotRule, CreateCampaign, CreateContact,
    CreateMessage, CreateTemplate, Message, MessageStatus, RunStats, ScheduleDescriptor, Settings,
    Template, TemplateComponent,
};
use crate::repository::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use wacm_common::types::{
    normalize_phone, BotRuleId, CampaignId, ContactId, MessageId, TemplateId, Variables,
};
use wacm_common::{Error, Result};

/// Store backed by a PostgreSQL pool
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(Error::Database)
}

#[derive(FromRow)]
struct CampaignRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    status: String,
    template_id: Uuid,
    contact_ids: Json<Vec<Uuid>>,
    schedule: Json<ScheduleDescriptor>,
    media_id: Option<String>,
    created_by: Option<String>,
    last_run_stats: Option<Json<RunStats>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = Error;

    fn try_from(row: CampaignRow) -> Result<Self> {
        Ok(Campaign {
            id: row.id,
            name: row.name,
            description: row.description,
            status: parse_column(&row.status)?,
            template_id: row.template_id,
            contact_ids: row.contact_ids.0,
            schedule: row.schedule.0,
            media_id: row.media_id,
            created_by: row.created_by,
            last_run_stats: row.last_run_stats.map(|s| s.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TemplateRow {
    id: Uuid,
    external_name: String,
    name: String,
    category: String,
    language: String,
    components: Json<Vec<TemplateComponent>>,
    created_at: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: row.id,
            external_name: row.external_name,
            name: row.name,
            category: row.category,
            language: row.language,
            components: row.components.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ContactRow {
    id: Uuid,
    name: String,
    phone: String,
    tags: Json<Vec<String>>,
    groups: Json<Vec<String>>,
    variables: Json<Variables>,
    created_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            name: row.name,
            phone: row.phone,
            tags: row.tags.0,
            groups: row.groups.0,
            variables: row.variables.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    campaign_id: Option<Uuid>,
    contact_id: Option<Uuid>,
    template_id: Option<Uuid>,
    external_id: Option<String>,
    direction: String,
    phone: String,
    content: Option<String>,
    status: String,
    source: String,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            campaign_id: row.campaign_id,
            contact_id: row.contact_id,
            template_id: row.template_id,
            external_id: row.external_id,
            direction: parse_column(&row.direction)?,
            phone: row.phone,
            content: row.content,
            status: parse_column(&row.status)?,
            source: parse_column(&row.source)?,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            read_at: row.read_at,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct BotRuleRow {
    id: Uuid,
    name: String,
    trigger_type: String,
    triggers: Json<Vec<String>>,
    reply_type: String,
    reply_content: String,
    priority: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BotRuleRow> for BotRule {
    type Error = Error;

    fn try_from(row: BotRuleRow) -> Result<Self> {
        Ok(BotRule {
            id: row.id,
            name: row.name,
            trigger_type: parse_column(&row.trigger_type)?,
            triggers: row.triggers.0,
            reply_type: parse_column(&row.reply_type)?,
            reply_content: row.reply_content,
            priority: row.priority,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SettingsRow {
    phone_number_id: String,
    access_token: String,
    business_account_id: Option<String>,
    webhook_verify_token: Option<String>,
}

impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        Settings {
            phone_number_id: row.phone_number_id,
            access_token: row.access_token,
            business_account_id: row.business_account_id,
            webhook_verify_token: row.webhook_verify_token,
        }
    }
}

fn ensure_affected(rows: u64, kind: &str, id: Uuid) -> Result<()> {
    if rows == 0 {
        return Err(Error::NotFound(format!("{} {}", kind, id)));
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn create_campaign(&self, input: CreateCampaign) -> Result<Campaign> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, name, description, status, template_id, contact_ids,
                                   schedule, media_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(CampaignStatus::Draft.to_string())
        .bind(input.template_id)
        .bind(Json(&input.contact_ids))
        .bind(Json(&input.schedule))
        .bind(&input.media_id)
        .bind(&input.created_by)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        self.get_campaign(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to create campaign".to_string()))
    }

    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)?
            .map(Campaign::try_from)
            .transpose()
    }

    async fn list_campaigns(&self, status: Option<CampaignStatus>) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT * FROM campaigns
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(status.map(|s| s.to_string()))
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Campaign::try_from)
        .collect()
    }

    async fn update_campaign(&self, campaign: Campaign) -> Result<Campaign> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET name = $2, description = $3, status = $4, template_id = $5, contact_ids = $6,
                schedule = $7, media_id = $8, created_by = $9, last_run_stats = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(campaign.status.to_string())
        .bind(campaign.template_id)
        .bind(Json(&campaign.contact_ids))
        .bind(Json(&campaign.schedule))
        .bind(&campaign.media_id)
        .bind(&campaign.created_by)
        .bind(campaign.last_run_stats.as_ref().map(Json))
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Campaign", campaign.id)?;

        self.get_campaign(campaign.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Campaign {}", campaign.id)))
    }

    async fn update_campaign_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE campaigns SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(status.to_string())
                .bind(Utc::now())
                .execute(self.pool.pool())
                .await
                .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Campaign", id)
    }

    async fn set_campaign_run_stats(&self, id: CampaignId, stats: RunStats) -> Result<()> {
        let result =
            sqlx::query("UPDATE campaigns SET last_run_stats = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(Json(&stats))
                .bind(Utc::now())
                .execute(self.pool.pool())
                .await
                .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Campaign", id)
    }

    async fn delete_campaign(&self, id: CampaignId) -> Result<()> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Campaign", id)
    }

    async fn create_template(&self, input: CreateTemplate) -> Result<Template> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            INSERT INTO templates (id, external_name, name, category, language, components, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.external_name)
        .bind(&input.name)
        .bind(&input.category)
        .bind(&input.language)
        .bind(Json(&input.components))
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }

    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>> {
        Ok(
            sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(db_err)?
                .map(Template::from),
        )
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        Ok(
            sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates ORDER BY name ASC")
                .fetch_all(self.pool.pool())
                .await
                .map_err(db_err)?
                .into_iter()
                .map(Template::from)
                .collect(),
        )
    }

    async fn delete_template(&self, id: TemplateId) -> Result<()> {
        let result = sqlx::query("DELETE FROM templates WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Template", id)
    }

    async fn create_contact(&self, input: CreateContact) -> Result<Contact> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            INSERT INTO contacts (id, name, phone, tags, groups, variables, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.phone)
        .bind(Json(&input.tags))
        .bind(Json(&input.groups))
        .bind(Json(&input.variables))
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(
            sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(db_err)?
                .map(Contact::from),
        )
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        Ok(
            sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts ORDER BY created_at ASC, id ASC")
                .fetch_all(self.pool.pool())
                .await
                .map_err(db_err)?
                .into_iter()
                .map(Contact::from)
                .collect(),
        )
    }

    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>> {
        let digits = normalize_phone(phone);
        if digits.is_empty() {
            return Ok(None);
        }

        Ok(sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT * FROM contacts
            WHERE regexp_replace(phone, '[^0-9]', '', 'g') = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(digits)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Contact::from))
    }

    async fn create_message(&self, input: CreateMessage) -> Result<Message> {
        let now = Utc::now();
        let sent_at = (input.status == MessageStatus::Sent).then_some(now);

        sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, campaign_id, contact_id, template_id, external_id, direction,
                                  phone, content, status, source, sent_at, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(input.template_id)
        .bind(&input.external_id)
        .bind(input.direction.to_string())
        .bind(&input.phone)
        .bind(&input.content)
        .bind(input.status.to_string())
        .bind(input.source.to_string())
        .bind(sent_at)
        .bind(&input.error)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)?
            .map(Message::try_from)
            .transpose()
    }

    async fn get_message_by_external_id(&self, external_id: &str) -> Result<Option<Message>> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE external_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(external_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Message::try_from)
        .transpose()
    }

    async fn update_message(&self, message: Message) -> Result<Message> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET external_id = $2, content = $3, status = $4, sent_at = $5, delivered_at = $6,
                read_at = $7, error = $8, contact_id = $9
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(&message.external_id)
        .bind(&message.content)
        .bind(message.status.to_string())
        .bind(message.sent_at)
        .bind(message.delivered_at)
        .bind(message.read_at)
        .bind(&message.error)
        .bind(message.contact_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Message", message.id)?;

        Ok(message)
    }

    async fn list_messages(&self, campaign_id: Option<CampaignId>) -> Result<Vec<Message>> {
        sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT * FROM messages
            WHERE ($1::UUID IS NULL OR campaign_id = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    async fn create_bot_rule(&self, input: CreateBotRule) -> Result<BotRule> {
        let now = Utc::now();

        sqlx::query_as::<_, BotRuleRow>(
            r#"
            INSERT INTO bot_rules (id, name, trigger_type, triggers, reply_type, reply_content,
                                   priority, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.trigger_type.to_string())
        .bind(Json(&input.triggers))
        .bind(input.reply_type.to_string())
        .bind(&input.reply_content)
        .bind(input.priority)
        .bind(input.active)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn get_bot_rule(&self, id: BotRuleId) -> Result<Option<BotRule>> {
        sqlx::query_as::<_, BotRuleRow>("SELECT * FROM bot_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)?
            .map(BotRule::try_from)
            .transpose()
    }

    async fn list_bot_rules(&self) -> Result<Vec<BotRule>> {
        sqlx::query_as::<_, BotRuleRow>(
            "SELECT * FROM bot_rules ORDER BY priority DESC, created_at ASC, id ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(BotRule::try_from)
        .collect()
    }

    async fn get_active_bot_rules(&self) -> Result<Vec<BotRule>> {
        sqlx::query_as::<_, BotRuleRow>(
            r#"
            SELECT * FROM bot_rules
            WHERE active = TRUE
            ORDER BY priority DESC, created_at ASC, id ASC
            "#,
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(BotRule::try_from)
        .collect()
    }

    async fn update_bot_rule(&self, rule: BotRule) -> Result<BotRule> {
        sqlx::query_as::<_, BotRuleRow>(
            r#"
            UPDATE bot_rules
            SET name = $2, trigger_type = $3, triggers = $4, reply_type = $5, reply_content = $6,
                priority = $7, active = $8, updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(rule.trigger_type.to_string())
        .bind(Json(&rule.triggers))
        .bind(rule.reply_type.to_string())
        .bind(&rule.reply_content)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(Utc::now())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("Bot rule {}", rule.id)))?
        .try_into()
    }

    async fn delete_bot_rule(&self, id: BotRuleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM bot_rules WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        ensure_affected(result.rows_affected(), "Bot rule", id)
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        Ok(sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT phone_number_id, access_token, business_account_id, webhook_verify_token
            FROM settings WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Settings::from))
    }

    async fn put_settings(&self, settings: Settings) -> Result<Settings> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, phone_number_id, access_token, business_account_id,
                                  webhook_verify_token, updated_at)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET phone_number_id = EXCLUDED.phone_number_id,
                access_token = EXCLUDED.access_token,
                business_account_id = EXCLUDED.business_account_id,
                webhook_verify_token = EXCLUDED.webhook_verify_token,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&settings.phone_number_id)
        .bind(&settings.access_token)
        .bind(&settings.business_account_id)
        .bind(&settings.webhook_verify_token)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(settings)
    }

    async fn health_check(&self) -> Result<()> {
        self.pool.health_check().await
    }
}
