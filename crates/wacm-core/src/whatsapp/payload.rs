//! Cloud API request and response bodies

use serde::{Deserialize, Serialize};

/// Outgoing message posted to `/{phone_number_id}/messages`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub messaging_product: String,
    pub recipient_type: String,
    pub to: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl OutgoingMessage {
    fn new(to: &str, body: MessageBody) -> Self {
        Self {
            messaging_product: "whatsapp".to_string(),
            recipient_type: "individual".to_string(),
            to: to.to_string(),
            body,
        }
    }

    pub fn text(to: &str, body: impl Into<String>) -> Self {
        Self::new(
            to,
            MessageBody::Text {
                text: TextContent {
                    body: body.into(),
                    preview_url: false,
                },
            },
        )
    }

    pub fn template(to: &str, template: TemplatePayload) -> Self {
        Self::new(to, MessageBody::Template { template })
    }

    pub fn media(to: &str, kind: MediaKind, media: MediaObject) -> Self {
        let body = match kind {
            MediaKind::Image => MessageBody::Image { image: media },
            MediaKind::Video => MessageBody::Video { video: media },
            MediaKind::Audio => MessageBody::Audio { audio: media },
            MediaKind::Document => MessageBody::Document { document: media },
        };
        Self::new(to, body)
    }
}

/// Message body keyed by its `type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text { text: TextContent },
    Template { template: TemplatePayload },
    Image { image: MediaObject },
    Video { video: MediaObject },
    Audio { audio: MediaObject },
    Document { document: MediaObject },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    pub body: String,
    pub preview_url: bool,
}

/// Media referenced by uploaded id or public link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl MediaObject {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            link: None,
        }
    }

    pub fn by_link(link: impl Into<String>) -> Self {
        Self {
            id: None,
            link: Some(link.into()),
        }
    }
}

/// Media kinds the Cloud API accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// Infer the kind from a URL's file extension, defaulting to document
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = file
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "gif" => MediaKind::Image,
            "mp4" | "3gp" | "mov" => MediaKind::Video,
            "mp3" | "ogg" | "aac" | "amr" | "m4a" | "opus" => MediaKind::Audio,
            _ => MediaKind::Document,
        }
    }
}

/// Template reference with filled parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplatePayload {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Language {
    pub code: String,
}

/// Parameters for one template component (`header` or `body`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentParameters {
    #[serde(rename = "type")]
    pub component_type: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Parameter {
    Text { text: String },
    Image { image: MediaObject },
    Video { video: MediaObject },
    Document { document: MediaObject },
}

/// Successful send response
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Error envelope returned by the Graph API
#[derive(Debug, Deserialize)]
pub struct GraphErrorBody {
    pub error: GraphError,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn text_message_matches_cloud_api_shape() {
        let value = serde_json::to_value(OutgoingMessage::text("5511999990000", "Hi")).unwrap();
        assert_eq!(
            value,
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "5511999990000",
                "type": "text",
                "text": { "body": "Hi", "preview_url": false }
            })
        );
    }

    #[test]
    fn template_message_serializes_parameters() {
        let payload = TemplatePayload {
            name: "promo".into(),
            language: Language {
                code: "pt_BR".into(),
            },
            components: vec![
                ComponentParameters {
                    component_type: "header".into(),
                    parameters: vec![Parameter::Image {
                        image: MediaObject::by_id("media-1"),
                    }],
                },
                ComponentParameters {
                    component_type: "body".into(),
                    parameters: vec![Parameter::Text { text: "Ana".into() }],
                },
            ],
        };
        let value = serde_json::to_value(OutgoingMessage::template("1", payload)).unwrap();

        assert_eq!(value["type"], "template");
        assert_eq!(value["template"]["language"]["code"], "pt_BR");
        assert_eq!(
            value["template"]["components"][0]["parameters"][0],
            json!({ "type": "image", "image": { "id": "media-1" } })
        );
        assert_eq!(
            value["template"]["components"][1]["parameters"][0],
            json!({ "type": "text", "text": "Ana" })
        );
    }

    #[test]
    fn media_kind_is_inferred_from_extension() {
        assert_eq!(MediaKind::from_url("https://cdn.example.com/a.JPG"), MediaKind::Image);
        assert_eq!(MediaKind::from_url("https://cdn.example.com/clip.mp4?x=1"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("https://cdn.example.com/voice.ogg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_url("https://cdn.example.com/menu.pdf"), MediaKind::Document);
        assert_eq!(MediaKind::from_url("https://cdn.example.com/file"), MediaKind::Document);
    }
}
