//! Graph API client

use super::payload::{
    GraphErrorBody, MediaKind, MediaObject, OutgoingMessage, SendResponse, TemplatePayload,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wacm_common::config::WhatsAppConfig;
use wacm_storage::models::Settings;

/// Provider send failures
#[derive(Debug, Error)]
pub enum SendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("WhatsApp API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        SendError::Http(err.to_string())
    }
}

/// Sender identity used for a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAppCredentials {
    pub phone_number_id: String,
    pub access_token: String,
}

impl WhatsAppCredentials {
    /// Credentials from the settings record, if complete
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings.has_credentials().then(|| Self {
            phone_number_id: settings.phone_number_id.clone(),
            access_token: settings.access_token.clone(),
        })
    }
}

/// Anything able to deliver an outgoing message and return the provider id
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        credentials: &WhatsAppCredentials,
        message: &OutgoingMessage,
    ) -> Result<String, SendError>;

    async fn send_template(
        &self,
        credentials: &WhatsAppCredentials,
        to: &str,
        template: TemplatePayload,
    ) -> Result<String, SendError> {
        self.send(credentials, &OutgoingMessage::template(to, template))
            .await
    }

    async fn send_text(
        &self,
        credentials: &WhatsAppCredentials,
        to: &str,
        body: &str,
    ) -> Result<String, SendError> {
        self.send(credentials, &OutgoingMessage::text(to, body)).await
    }

    async fn send_media(
        &self,
        credentials: &WhatsAppCredentials,
        to: &str,
        url: &str,
    ) -> Result<String, SendError> {
        let kind = MediaKind::from_url(url);
        self.send(
            credentials,
            &OutgoingMessage::media(to, kind, MediaObject::by_link(url)),
        )
        .await
    }
}

/// WhatsApp Cloud API client
#[derive(Clone)]
pub struct GraphApiClient {
    http: Client,
    base_url: String,
}

impl GraphApiClient {
    pub fn new(config: &WhatsAppConfig) -> wacm_common::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| wacm_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{}/messages", self.base_url, phone_number_id)
    }
}

#[async_trait]
impl MessageSender for GraphApiClient {
    async fn send(
        &self,
        credentials: &WhatsAppCredentials,
        message: &OutgoingMessage,
    ) -> Result<String, SendError> {
        let url = self.messages_url(&credentials.phone_number_id);
        debug!(to = %message.to, "Posting message to Graph API");

        let res = self
            .http
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(message)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GraphErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), error = %message, "Graph API rejected message");
            return Err(SendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|e| SendError::InvalidResponse(e.to_string()))?;

        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| SendError::InvalidResponse("response contained no message id".into()))
    }
}
