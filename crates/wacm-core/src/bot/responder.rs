//! Sends the reply of a matched bot rule

use crate::scheduler::{build_template_payload, contact_variables, preview, render_text};
use crate::whatsapp::{MessageSender, TemplatePayload, WhatsAppCredentials};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;
use wacm_common::types::MessageId;
use wacm_storage::models::{BotRule, Contact, CreateMessage, MessageSource, ReplyType};
use wacm_storage::Store;

/// Outcome of a reply attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BotReply {
    Sent {
        message_id: Option<MessageId>,
        external_id: String,
    },
    Failed {
        error: String,
    },
}

impl BotReply {
    pub fn is_sent(&self) -> bool {
        matches!(self, BotReply::Sent { .. })
    }
}

/// A rendered reply ready to send
struct Prepared {
    content: String,
    template_id: Option<Uuid>,
    kind: Outgoing,
}

enum Outgoing {
    Text(String),
    Template(TemplatePayload),
    Media(String),
}

pub struct BotResponder {
    store: Arc<dyn Store>,
    sender: Arc<dyn MessageSender>,
}

impl BotResponder {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn MessageSender>) -> Self {
        Self { store, sender }
    }

    /// Reply to `phone` with `rule`'s content. Provider and rendering errors
    /// come back as [`BotReply::Failed`] and are logged as failed messages.
    pub async fn reply(&self, rule: &BotRule, contact: &Contact, phone: &str) -> BotReply {
        let credentials = match self.credentials().await {
            Ok(credentials) => credentials,
            Err(e) => return self.fail(rule, contact, phone, None, None, e).await,
        };

        let prepared = match self.prepare(rule, contact).await {
            Ok(prepared) => prepared,
            Err(e) => return self.fail(rule, contact, phone, None, None, e).await,
        };

        let result = match &prepared.kind {
            Outgoing::Text(body) => self.sender.send_text(&credentials, phone, body).await,
            Outgoing::Template(payload) => {
                self.sender
                    .send_template(&credentials, phone, payload.clone())
                    .await
            }
            Outgoing::Media(url) => self.sender.send_media(&credentials, phone, url).await,
        };

        match result {
            Ok(external_id) => {
                debug!(rule = %rule.name, %phone, %external_id, "Bot reply sent");
                let mut message =
                    CreateMessage::sent(MessageSource::Bot, phone, external_id.clone())
                        .for_contact(Some(contact.id))
                        .with_content(Some(prepared.content));
                message.template_id = prepared.template_id;

                let message_id = match self.store.create_message(message).await {
                    Ok(m) => Some(m.id),
                    Err(e) => {
                        error!(%phone, "Failed to record bot reply: {}", e);
                        None
                    }
                };
                BotReply::Sent {
                    message_id,
                    external_id,
                }
            }
            Err(e) => {
                self.fail(
                    rule,
                    contact,
                    phone,
                    Some(prepared.content),
                    prepared.template_id,
                    e.to_string(),
                )
                .await
            }
        }
    }

    async fn credentials(&self) -> Result<WhatsAppCredentials, String> {
        let settings = self
            .store
            .get_settings()
            .await
            .map_err(|e| e.to_string())?;
        settings
            .as_ref()
            .and_then(WhatsAppCredentials::from_settings)
            .ok_or_else(|| "WhatsApp credentials are not configured".to_string())
    }

    async fn prepare(&self, rule: &BotRule, contact: &Contact) -> Result<Prepared, String> {
        match rule.reply_type {
            ReplyType::Text => {
                let body = render_text(&rule.reply_content, &contact_variables(contact));
                Ok(Prepared {
                    content: body.clone(),
                    template_id: None,
                    kind: Outgoing::Text(body),
                })
            }
            ReplyType::Template => {
                let template_id = Uuid::parse_str(rule.reply_content.trim())
                    .map_err(|_| format!("Invalid template id: {}", rule.reply_content))?;
                let template = self
                    .store
                    .get_template(template_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("Template not found: {}", template_id))?;
                let payload =
                    build_template_payload(&template, contact, None).map_err(|e| e.to_string())?;
                Ok(Prepared {
                    content: preview(&template, contact)
                        .unwrap_or_else(|| template.external_name.clone()),
                    template_id: Some(template_id),
                    kind: Outgoing::Template(payload),
                })
            }
            ReplyType::Media => {
                let url = rule.reply_content.trim().to_string();
                if url.is_empty() {
                    return Err("Media reply has no URL".to_string());
                }
                Ok(Prepared {
                    content: url.clone(),
                    template_id: None,
                    kind: Outgoing::Media(url),
                })
            }
        }
    }

    async fn fail(
        &self,
        rule: &BotRule,
        contact: &Contact,
        phone: &str,
        content: Option<String>,
        template_id: Option<Uuid>,
        error: String,
    ) -> BotReply {
        warn!(rule = %rule.name, %phone, "Bot reply failed: {}", error);
        let mut message = CreateMessage::failed(MessageSource::Bot, phone, error.clone())
            .for_contact(Some(contact.id))
            .with_content(content);
        message.template_id = template_id;
        if let Err(e) = self.store.create_message(message).await {
            error!(%phone, "Failed to record bot reply: {}", e);
        }
        BotReply::Failed { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{body_template, seed_contact, store_with_credentials, FakeSender};
    use crate::whatsapp::MessageBody;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use wacm_storage::models::{MessageStatus, TriggerType};
    use wacm_storage::MemoryStore;

    fn rule(reply_type: ReplyType, reply_content: &str) -> BotRule {
        BotRule {
            id: Uuid::new_v4(),
            name: "greeting".into(),
            trigger_type: TriggerType::Contains,
            triggers: vec!["hi".into()],
            reply_type,
            reply_content: reply_content.into(),
            priority: 0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn text_reply_substitutes_contact_variables() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let contact = seed_contact(&store, "Ana", "5511999990000").await;
        let responder = BotResponder::new(store.clone(), sender.clone());

        let reply = responder
            .reply(&rule(ReplyType::Text, "Hello {{name}}"), &contact, &contact.phone)
            .await;

        assert!(reply.is_sent());
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].body {
            MessageBody::Text { text } => assert_eq!(text.body, "Hello Ana"),
            other => panic!("unexpected body {:?}", other),
        }

        let messages = store.list_messages(None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].source, MessageSource::Bot);
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert_eq!(messages[0].content.as_deref(), Some("Hello Ana"));
    }

    #[tokio::test]
    async fn template_reply_uses_stored_template() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let contact = seed_contact(&store, "Ana", "5511999990000").await;
        let template = body_template(&store).await;
        let responder = BotResponder::new(store.clone(), sender.clone());

        let reply = responder
            .reply(
                &rule(ReplyType::Template, &template.id.to_string()),
                &contact,
                &contact.phone,
            )
            .await;

        assert!(reply.is_sent());
        match &sender.sent()[0].body {
            MessageBody::Template { template: payload } => {
                assert_eq!(payload.name, "spring_promo")
            }
            other => panic!("unexpected body {:?}", other),
        }
        let messages = store.list_messages(None).await.unwrap();
        assert_eq!(messages[0].template_id, Some(template.id));
        assert_eq!(messages[0].content.as_deref(), Some("Hi Ana!"));
    }

    #[tokio::test]
    async fn media_reply_infers_kind_from_url() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let contact = seed_contact(&store, "Ana", "5511999990000").await;
        let responder = BotResponder::new(store.clone(), sender.clone());

        responder
            .reply(
                &rule(ReplyType::Media, "https://cdn.example.com/menu.pdf"),
                &contact,
                &contact.phone,
            )
            .await;

        assert!(matches!(
            sender.sent()[0].body,
            MessageBody::Document { .. }
        ));
    }

    #[tokio::test]
    async fn provider_error_becomes_failed_reply() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::failing_for(&["5511999990000"]));
        let contact = seed_contact(&store, "Ana", "5511999990000").await;
        let responder = BotResponder::new(store.clone(), sender);

        let reply = responder
            .reply(&rule(ReplyType::Text, "Hello"), &contact, &contact.phone)
            .await;

        match reply {
            BotReply::Failed { error } => assert!(error.contains("131026")),
            other => panic!("unexpected reply {:?}", other),
        }
        let messages = store.list_messages(None).await.unwrap();
        assert_eq!(messages[0].status, MessageStatus::Failed);
        assert_eq!(messages[0].source, MessageSource::Bot);
    }

    #[tokio::test]
    async fn unknown_template_and_missing_credentials_fail_without_sending() {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let contact = seed_contact(&store, "Ana", "5511999990000").await;
        let responder = BotResponder::new(store.clone(), sender.clone());

        let reply = responder
            .reply(
                &rule(ReplyType::Template, &Uuid::new_v4().to_string()),
                &contact,
                &contact.phone,
            )
            .await;
        assert!(!reply.is_sent());

        let bare = Arc::new(MemoryStore::new());
        let contact = seed_contact(&bare, "Bo", "5511888880000").await;
        let reply = BotResponder::new(bare, sender.clone())
            .reply(&rule(ReplyType::Text, "Hello"), &contact, &contact.phone)
            .await;
        assert_eq!(
            reply,
            BotReply::Failed {
                error: "WhatsApp credentials are not configured".into()
            }
        );
        assert!(sender.sent().is_empty());
    }
}
