//! Applies webhook notifications to stored messages and runs the bot

use super::payload::{ChangeValue, InboundMessage, StatusUpdate, WebhookPayload};
use crate::bot::{select_rule, BotResponder};
use crate::events::{CampaignEvent, EventBus};
use crate::whatsapp::MessageSender;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wacm_storage::models::{Contact, CreateContact, CreateMessage};
use wacm_storage::Store;

/// Counters for one processed notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookSummary {
    pub statuses_applied: u32,
    pub statuses_ignored: u32,
    pub inbound_messages: u32,
    pub replies_sent: u32,
    pub replies_failed: u32,
}

pub struct WebhookProcessor {
    store: Arc<dyn Store>,
    responder: BotResponder,
    events: EventBus,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn MessageSender>, events: EventBus) -> Self {
        Self {
            responder: BotResponder::new(store.clone(), sender),
            store,
            events,
        }
    }

    /// Process every change in the notification. Failures are logged per item.
    pub async fn process(&self, payload: &WebhookPayload) -> WebhookSummary {
        let mut summary = WebhookSummary::default();

        for change in payload.entry.iter().flat_map(|e| e.changes.iter()) {
            for status in &change.value.statuses {
                if self.apply_status(status).await {
                    summary.statuses_applied += 1;
                } else {
                    summary.statuses_ignored += 1;
                }
            }
            for message in &change.value.messages {
                self.handle_inbound(&change.value, message, &mut summary)
                    .await;
            }
        }

        debug!(?summary, "Webhook processed");
        summary
    }

    async fn apply_status(&self, update: &StatusUpdate) -> bool {
        let Some(status) = update.message_status() else {
            debug!(external_id = %update.id, status = %update.status, "Ignoring unknown status");
            return false;
        };

        let mut message = match self.store.get_message_by_external_id(&update.id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(external_id = %update.id, "Status for unknown message");
                return false;
            }
            Err(e) => {
                warn!(external_id = %update.id, "Failed to load message: {}", e);
                return false;
            }
        };

        if !message.apply_status(status, update.occurred_at(), update.error_text()) {
            debug!(
                external_id = %update.id,
                current = %message.status,
                %status,
                "Ignoring out-of-order status"
            );
            return false;
        }

        match self.store.update_message(message).await {
            Ok(message) => {
                self.events.publish(CampaignEvent::MessageStatus {
                    message_id: message.id,
                    campaign_id: message.campaign_id,
                    status: message.status,
                });
                true
            }
            Err(e) => {
                warn!(external_id = %update.id, "Failed to update message status: {}", e);
                false
            }
        }
    }

    async fn handle_inbound(
        &self,
        value: &ChangeValue,
        inbound: &InboundMessage,
        summary: &mut WebhookSummary,
    ) {
        // Redelivered notifications carry the same message id
        match self.store.get_message_by_external_id(&inbound.id).await {
            Ok(Some(_)) => {
                debug!(external_id = %inbound.id, "Inbound message already recorded");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(external_id = %inbound.id, "Failed to check message: {}", e),
        }

        let phone = inbound.from.as_str();
        let contact = match self.contact_for(value, phone).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(%phone, "Failed to resolve contact: {}", e);
                return;
            }
        };

        let text = inbound.text();
        let content = text
            .map(str::to_string)
            .unwrap_or_else(|| format!("[{}]", inbound.message_type));
        let record = CreateMessage::inbound(phone, inbound.id.clone(), content)
            .for_contact(Some(contact.id));
        if let Err(e) = self.store.create_message(record).await {
            warn!(%phone, "Failed to record inbound message: {}", e);
        }
        summary.inbound_messages += 1;

        let Some(text) = text else {
            return;
        };

        let rules = match self.store.get_active_bot_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Failed to load bot rules: {}", e);
                return;
            }
        };
        let Some(rule) = select_rule(text, &rules) else {
            debug!(%phone, "No bot rule matched");
            return;
        };

        info!(rule = %rule.name, %phone, "Bot rule matched");
        if self.responder.reply(rule, &contact, phone).await.is_sent() {
            summary.replies_sent += 1;
        } else {
            summary.replies_failed += 1;
        }
    }

    /// Existing contact for `phone`, or a new one named from the sender profile
    async fn contact_for(&self, value: &ChangeValue, phone: &str) -> wacm_common::Result<Contact> {
        if let Some(contact) = self.store.find_contact_by_phone(phone).await? {
            return Ok(contact);
        }

        let name = value
            .contacts
            .iter()
            .find(|c| c.wa_id == phone)
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| phone.to_string());

        info!(%phone, %name, "Creating contact from inbound message");
        self.store
            .create_contact(CreateContact {
                name,
                phone: phone.to_string(),
                ..Default::default()
            })
            .await
    }
}
