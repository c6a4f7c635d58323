//! Common types for WACM

use std::collections::HashMap;

use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for templates
pub type TemplateId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Unique identifier for bot rules
pub type BotRuleId = Uuid;

/// Free-form contact variables used for placeholder substitution
pub type Variables = HashMap<String, String>;

/// Reduce a phone number to its digits so `+55 (11) 9999-0000` and
/// `551199990000` compare equal.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Mask a secret for display, keeping the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
