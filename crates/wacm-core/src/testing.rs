//! Fixtures shared by unit tests

use crate::whatsapp::{MessageSender, OutgoingMessage, SendError, WhatsAppCredentials};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wacm_storage::models::{
    Campaign, Contact, CreateCampaign, CreateContact, CreateTemplate, ScheduleDescriptor,
    Settings, Template, TemplateComponent,
};
use wacm_storage::{MemoryStore, Store};

/// Records every message and fails for configured recipients
#[derive(Default)]
pub struct FakeSender {
    sent: Mutex<Vec<OutgoingMessage>>,
    failing: HashSet<String>,
    counter: AtomicUsize,
}

impl FakeSender {
    pub fn failing_for(phones: &[&str]) -> Self {
        Self {
            failing: phones.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for FakeSender {
    async fn send(
        &self,
        _credentials: &WhatsAppCredentials,
        message: &OutgoingMessage,
    ) -> Result<String, SendError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.failing.contains(&message.to) {
            return Err(SendError::Api {
                status: 400,
                message: "(#131026) Message undeliverable".into(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("wamid.fake{}", n))
    }
}

pub async fn store_with_credentials() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_settings(Settings {
            phone_number_id: "109876".into(),
            access_token: "EAAG-token".into(),
            business_account_id: None,
            webhook_verify_token: Some("verify-me".into()),
        })
        .await
        .unwrap();
    store
}

pub async fn seed_template(store: &MemoryStore, components: Vec<TemplateComponent>) -> Template {
    store
        .create_template(CreateTemplate {
            external_name: "spring_promo".into(),
            name: "Spring promo".into(),
            category: "MARKETING".into(),
            language: "en_US".into(),
            components,
        })
        .await
        .unwrap()
}

pub async fn body_template(store: &MemoryStore) -> Template {
    seed_template(
        store,
        vec![TemplateComponent::Body {
            text: "Hi {{name}}!".into(),
        }],
    )
    .await
}

pub async fn seed_contact(store: &MemoryStore, name: &str, phone: &str) -> Contact {
    store
        .create_contact(CreateContact {
            name: name.into(),
            phone: phone.into(),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub async fn seed_campaign(
    store: &MemoryStore,
    template_id: Uuid,
    contact_ids: Vec<Uuid>,
    schedule: ScheduleDescriptor,
) -> Campaign {
    store
        .create_campaign(CreateCampaign {
            name: "Spring".into(),
            description: None,
            template_id,
            contact_ids,
            schedule,
            media_id: None,
            created_by: None,
        })
        .await
        .unwrap()
}
