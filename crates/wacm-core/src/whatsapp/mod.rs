//! WhatsApp Cloud API integration

mod client;
mod payload;

pub use client::{GraphApiClient, MessageSender, SendError, WhatsAppCredentials};
pub use payload::{
    ComponentParameters, Language, MediaKind, MediaObject, MessageBody, OutgoingMessage,
    Parameter, TemplatePayload, TextContent,
};
