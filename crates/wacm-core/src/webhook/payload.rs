//! Cloud API webhook notification bodies

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use wacm_storage::models::MessageStatus;

/// Top-level notification
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub wa_id: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<TextBody>,
    pub button: Option<ButtonBody>,
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Quick-reply button press on a template
#[derive(Debug, Clone, Deserialize)]
pub struct ButtonBody {
    pub text: Option<String>,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<Reply>,
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: String,
    pub title: String,
}

impl InboundMessage {
    /// Text the bot should match against, if the message carries any
    pub fn text(&self) -> Option<&str> {
        match self.message_type.as_str() {
            "text" => self.text.as_ref().map(|t| t.body.as_str()),
            "button" => self
                .button
                .as_ref()
                .and_then(|b| b.text.as_deref().or(b.payload.as_deref())),
            "interactive" => self.interactive.as_ref().and_then(|i| {
                i.button_reply
                    .as_ref()
                    .or(i.list_reply.as_ref())
                    .map(|r| r.title.as_str())
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    /// Provider message id (`wamid...`)
    pub id: String,
    pub status: String,
    pub timestamp: Option<String>,
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<StatusError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusError {
    pub code: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
}

impl StatusUpdate {
    /// Known delivery statuses; anything else is ignored
    pub fn message_status(&self) -> Option<MessageStatus> {
        match self.status.as_str() {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        parse_timestamp(self.timestamp.as_deref()).unwrap_or_else(Utc::now)
    }

    /// First provider error as `(#code) title: message`
    pub fn error_text(&self) -> Option<String> {
        self.errors.first().map(|e| {
            let detail = match (&e.title, &e.message) {
                (Some(title), Some(message)) if title != message => {
                    format!("{}: {}", title, message)
                }
                (Some(text), _) | (None, Some(text)) => text.clone(),
                (None, None) => "Delivery failed".to_string(),
            };
            match e.code {
                Some(code) => format!("(#{}) {}", code, detail),
                None => detail,
            }
        })
    }
}

/// Unix seconds as sent by the Cloud API
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let secs = raw?.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_inbound_text_and_profile() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA_ID",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {"display_phone_number": "15550001111", "phone_number_id": "109876"},
                        "contacts": [{"profile": {"name": "Ana"}, "wa_id": "5511999990000"}],
                        "messages": [{
                            "from": "5511999990000",
                            "id": "wamid.in1",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": {"body": "Hello"}
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        let value = &payload.entry[0].changes[0].value;
        assert_eq!(value.messages[0].text(), Some("Hello"));
        assert_eq!(
            value.contacts[0].profile.as_ref().and_then(|p| p.name.as_deref()),
            Some("Ana")
        );
        assert!(value.statuses.is_empty());
    }

    #[test]
    fn button_and_interactive_replies_expose_their_text() {
        let button: InboundMessage = serde_json::from_value(serde_json::json!({
            "from": "1", "id": "a", "type": "button",
            "button": {"text": "Stop promotions", "payload": "STOP"}
        }))
        .unwrap();
        let list: InboundMessage = serde_json::from_value(serde_json::json!({
            "from": "1", "id": "b", "type": "interactive",
            "interactive": {"type": "list_reply", "list_reply": {"id": "opt-2", "title": "Prices"}}
        }))
        .unwrap();
        let image: InboundMessage = serde_json::from_value(serde_json::json!({
            "from": "1", "id": "c", "type": "image", "image": {"id": "m1"}
        }))
        .unwrap();

        assert_eq!(button.text(), Some("Stop promotions"));
        assert_eq!(list.text(), Some("Prices"));
        assert_eq!(image.text(), None);
    }

    #[test]
    fn status_error_text_and_timestamp() {
        let status: StatusUpdate = serde_json::from_value(serde_json::json!({
            "id": "wamid.1",
            "status": "failed",
            "timestamp": "1700000000",
            "recipient_id": "5511999990000",
            "errors": [{"code": 131026, "title": "Message undeliverable"}]
        }))
        .unwrap();

        assert_eq!(status.message_status(), Some(MessageStatus::Failed));
        assert_eq!(
            status.error_text().as_deref(),
            Some("(#131026) Message undeliverable")
        );
        assert_eq!(status.occurred_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn unknown_status_is_not_mapped() {
        let status: StatusUpdate = serde_json::from_value(serde_json::json!({
            "id": "wamid.1", "status": "deleted"
        }))
        .unwrap();
        assert_eq!(status.message_status(), None);
    }
}
