//! Campaign scheduling - timer registry, dispatch and template rendering

mod dispatcher;
mod recurrence;
mod registry;
mod template;

pub use dispatcher::CampaignDispatcher;
pub use recurrence::{next_occurrence, parse_timezone, Anchor};
pub use registry::{CampaignScheduler, JobState, ScheduleOutcome};
pub use template::{
    build_template_payload, contact_variables, placeholders, preview, render_text, RenderError,
};

use thiserror::Error;
use wacm_common::types::{CampaignId, TemplateId};

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error("Template not found: {0}")]
    TemplateNotFound(TemplateId),

    #[error("WhatsApp credentials are not configured")]
    MissingCredentials,

    #[error("No scheduled job for campaign {0}")]
    NoJob(CampaignId),

    #[error("Campaign {0} is already running")]
    AlreadyRunning(CampaignId),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] wacm_common::Error),
}

impl From<SchedulerError> for wacm_common::Error {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::CampaignNotFound(_) | SchedulerError::TemplateNotFound(_) => {
                wacm_common::Error::NotFound(err.to_string())
            }
            SchedulerError::MissingCredentials
            | SchedulerError::NoJob(_)
            | SchedulerError::AlreadyRunning(_) => wacm_common::Error::Scheduler(err.to_string()),
            SchedulerError::Internal(msg) => wacm_common::Error::Internal(msg),
            SchedulerError::Store(e) => e,
        }
    }
}
