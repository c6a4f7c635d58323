//! API request handlers

pub mod bot_rules;
pub mod campaigns;
pub mod contacts;
pub mod health;
pub mod messages;
pub mod settings;
pub mod templates;
pub mod webhook;

use serde::{Deserialize, Serialize};

/// List response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            total: data.len(),
            data,
        }
    }
}
