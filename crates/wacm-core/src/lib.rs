//! WACM Core - campaign scheduling, keyword bot and WhatsApp delivery
//!
//! This crate holds the campaign scheduler registry and dispatcher, the bot
//! rule matcher and responder, webhook ingestion and the Graph API client.

pub mod bot;
pub mod events;
pub mod scheduler;
pub mod webhook;
pub mod whatsapp;

#[cfg(test)]
mod testing;

pub use bot::{explain, select_rule, BotReply, BotResponder, MatchExplanation};
pub use events::{CampaignEvent, EventBus};
pub use scheduler::{
    CampaignDispatcher, CampaignScheduler, JobState, ScheduleOutcome, SchedulerError,
};
pub use webhook::{WebhookPayload, WebhookProcessor, WebhookSummary};
pub use whatsapp::{GraphApiClient, MessageSender, SendError, WhatsAppCredentials};
