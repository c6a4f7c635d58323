//! Campaign Scheduler - in-memory registry of campaign timers

use super::dispatcher::CampaignDispatcher;
use super::recurrence::{next_occurrence, parse_timezone, Anchor};
use super::SchedulerError;
use crate::events::{CampaignEvent, EventBus};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};
use wacm_common::types::CampaignId;
use wacm_storage::models::{
    Campaign, CampaignStatus, Recurrence, RunStats, ScheduleDescriptor, ScheduleType,
};
use wacm_storage::Store;

/// Whether a registered job's timer is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Active,
    Paused,
}

/// What a scheduling call did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// Dispatched right away, no timer registered
    Dispatched { stats: RunStats },
    /// Timer registered
    Registered { next_run: DateTime<Utc> },
    /// One-shot job had already fired; nothing re-armed
    AlreadyFired,
}

#[derive(Debug, Clone)]
enum JobSchedule {
    Once(DateTime<Utc>),
    Recurring {
        recurrence: Recurrence,
        anchor: Anchor,
        tz: Tz,
        not_before: Option<DateTime<Utc>>,
    },
}

impl JobSchedule {
    fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            JobSchedule::Once(at) => Some(*at),
            JobSchedule::Recurring {
                recurrence,
                anchor,
                tz,
                not_before,
            } => next_occurrence(*recurrence, anchor, *tz, after, *not_before),
        }
    }
}

struct Job {
    schedule: JobSchedule,
    state: JobState,
    job_id: u64,
    /// Set once a one-shot timer has started its run
    fired: bool,
    handle: Option<JoinHandle<()>>,
}

type JobMap = Arc<Mutex<HashMap<CampaignId, Job>>>;

/// What resuming found in the registry
enum Resume {
    Rearmed(DateTime<Utc>),
    Fired,
    Unregistered,
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

/// Run a dispatch on its own task so aborting the timer never cuts a run short
async fn fire(dispatcher: &Arc<CampaignDispatcher>, campaign_id: CampaignId) {
    let dispatcher = dispatcher.clone();
    match tokio::spawn(async move { dispatcher.execute(campaign_id).await }).await {
        Ok(Ok(stats)) => debug!(
            %campaign_id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Scheduled run finished"
        ),
        Ok(Err(e)) => debug!(%campaign_id, "Scheduled run did not complete: {}", e),
        Err(e) => error!(%campaign_id, "Scheduled run panicked: {}", e),
    }
}

fn spawn_job(
    dispatcher: Arc<CampaignDispatcher>,
    jobs: JobMap,
    campaign_id: CampaignId,
    job_id: u64,
    schedule: JobSchedule,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match &schedule {
            JobSchedule::Once(at) => {
                sleep_until(*at).await;
                {
                    let mut jobs = jobs.lock().await;
                    match jobs.get_mut(&campaign_id) {
                        Some(job) if job.job_id == job_id => job.fired = true,
                        _ => return,
                    }
                }
                fire(&dispatcher, campaign_id).await;

                let mut jobs = jobs.lock().await;
                if jobs.get(&campaign_id).is_some_and(|j| j.job_id == job_id) {
                    jobs.remove(&campaign_id);
                }
            }
            JobSchedule::Recurring { .. } => {
                let mut after = Utc::now();
                loop {
                    let Some(next) = schedule.next_run(after) else {
                        warn!(%campaign_id, "Recurring schedule has no further occurrence");
                        break;
                    };
                    debug!(%campaign_id, next_run = %next, "Waiting for next occurrence");
                    sleep_until(next).await;
                    fire(&dispatcher, campaign_id).await;
                    after = next.max(Utc::now());
                }
            }
        }
    })
}

/// Owns the mapping from campaign id to its timer job.
///
/// Each registry call is atomic on its own. Sequences of calls from
/// concurrent requests are not serialized against each other.
pub struct CampaignScheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<CampaignDispatcher>,
    events: EventBus,
    jobs: JobMap,
    next_job_id: AtomicU64,
    default_timezone: String,
}

impl CampaignScheduler {
    pub fn new(dispatcher: Arc<CampaignDispatcher>, events: EventBus) -> Self {
        Self {
            store: dispatcher.store().clone(),
            dispatcher,
            events,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_job_id: AtomicU64::new(1),
            default_timezone: "UTC".to_string(),
        }
    }

    /// Timezone for campaigns that do not name one
    pub fn with_default_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.default_timezone = timezone.into();
        self
    }

    pub fn dispatcher(&self) -> &Arc<CampaignDispatcher> {
        &self.dispatcher
    }

    fn timezone_for(&self, campaign: &Campaign) -> Tz {
        parse_timezone(campaign.schedule.timezone.as_deref(), &self.default_timezone)
    }

    async fn load(&self, campaign_id: CampaignId) -> Result<Campaign, SchedulerError> {
        self.store
            .get_campaign(campaign_id)
            .await?
            .ok_or(SchedulerError::CampaignNotFound(campaign_id))
    }

    /// Register `schedule`, replacing any existing job for the campaign
    async fn register(
        &self,
        campaign_id: CampaignId,
        schedule: JobSchedule,
    ) -> Result<DateTime<Utc>, SchedulerError> {
        let next_run = schedule.next_run(Utc::now()).ok_or_else(|| {
            SchedulerError::Internal(format!("campaign {} has no upcoming run", campaign_id))
        })?;
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);

        let mut jobs = self.jobs.lock().await;
        let handle = spawn_job(
            self.dispatcher.clone(),
            self.jobs.clone(),
            campaign_id,
            job_id,
            schedule.clone(),
        );
        let previous = jobs.insert(
            campaign_id,
            Job {
                schedule,
                state: JobState::Active,
                job_id,
                fired: false,
                handle: Some(handle),
            },
        );

        if let Some(handle) = previous.and_then(|job| job.handle) {
            debug!(%campaign_id, "Replacing existing job");
            handle.abort();
        }

        Ok(next_run)
    }

    fn recurring_schedule(
        &self,
        campaign: &Campaign,
        recurrence: Recurrence,
        start_time: DateTime<Utc>,
    ) -> JobSchedule {
        let tz = self.timezone_for(campaign);
        JobSchedule::Recurring {
            recurrence,
            anchor: Anchor::from_instant(start_time, tz),
            tz,
            not_before: Some(start_time),
        }
    }

    /// Job matching a persisted descriptor
    fn job_schedule_for(&self, campaign: &Campaign) -> JobSchedule {
        let descriptor = &campaign.schedule;
        let start = descriptor.start_time.unwrap_or_else(Utc::now);

        match (descriptor.schedule_type, descriptor.recurrence) {
            (ScheduleType::Recurring, Some(recurrence)) if recurrence != Recurrence::None => {
                self.recurring_schedule(campaign, recurrence, start)
            }
            _ => JobSchedule::Once(start),
        }
    }

    /// Abort and forget the campaign's job, if any
    async fn drop_job(&self, campaign_id: CampaignId) {
        if let Some(handle) = self
            .jobs
            .lock()
            .await
            .remove(&campaign_id)
            .and_then(|job| job.handle)
        {
            debug!(%campaign_id, "Dropping registered job");
            handle.abort();
        }
    }

    /// Replace whatever schedule the campaign had with `schedule` and dispatch now
    async fn dispatch_now(
        &self,
        campaign_id: CampaignId,
        schedule: ScheduleDescriptor,
    ) -> Result<RunStats, SchedulerError> {
        if self.dispatcher.is_running(campaign_id).await {
            warn!(%campaign_id, "Campaign already running, not dispatching again");
            return Err(SchedulerError::AlreadyRunning(campaign_id));
        }

        self.drop_job(campaign_id).await;
        // a missing campaign is reported by the dispatcher
        if let Some(mut campaign) = self.store.get_campaign(campaign_id).await? {
            let timezone = campaign.schedule.timezone.take();
            campaign.schedule = ScheduleDescriptor {
                timezone,
                ..schedule
            };
            self.store.update_campaign(campaign).await?;
        }

        info!(%campaign_id, "Dispatching campaign immediately");
        self.dispatcher.execute(campaign_id).await
    }

    /// Dispatch now, without registering a timer. Any registered job is dropped.
    pub async fn schedule_immediate_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<RunStats, SchedulerError> {
        self.dispatch_now(campaign_id, ScheduleDescriptor::immediate())
            .await
    }

    /// One-shot run at `start_time`; a time not in the future dispatches now
    pub async fn schedule_campaign(
        &self,
        campaign_id: CampaignId,
        start_time: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        if start_time <= Utc::now() {
            let stats = self
                .dispatch_now(campaign_id, ScheduleDescriptor::at(start_time))
                .await?;
            return Ok(ScheduleOutcome::Dispatched { stats });
        }

        let mut campaign = self.load(campaign_id).await?;
        let timezone = campaign.schedule.timezone.take();
        campaign.schedule = ScheduleDescriptor {
            timezone,
            ..ScheduleDescriptor::at(start_time)
        };
        campaign.status = CampaignStatus::Scheduled;
        self.store.update_campaign(campaign).await?;

        let next_run = self
            .register(campaign_id, JobSchedule::Once(start_time))
            .await?;
        info!(%campaign_id, %next_run, "Campaign scheduled");

        Ok(ScheduleOutcome::Registered { next_run })
    }

    /// Repeating run anchored on `start_time` (or now)
    pub async fn schedule_recurring_campaign(
        &self,
        campaign_id: CampaignId,
        recurrence: Recurrence,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        if recurrence == Recurrence::None {
            return self
                .schedule_campaign(campaign_id, start_time.unwrap_or_else(Utc::now))
                .await;
        }

        let mut campaign = self.load(campaign_id).await?;
        // Anchor is persisted as start_time so reconcile re-derives the same wall-clock time
        let start = start_time.unwrap_or_else(Utc::now);
        let schedule = self.recurring_schedule(&campaign, recurrence, start);

        let timezone = campaign.schedule.timezone.take();
        campaign.schedule = ScheduleDescriptor {
            timezone,
            ..ScheduleDescriptor::recurring(recurrence, Some(start))
        };
        campaign.status = CampaignStatus::Scheduled;
        self.store.update_campaign(campaign).await?;

        let next_run = self.register(campaign_id, schedule).await?;
        info!(%campaign_id, %recurrence, %next_run, "Recurring campaign scheduled");

        Ok(ScheduleOutcome::Registered { next_run })
    }

    /// Schedule according to the campaign's persisted descriptor
    pub async fn schedule_from_record(
        &self,
        campaign: &Campaign,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let descriptor = &campaign.schedule;
        match descriptor.schedule_type {
            ScheduleType::Immediate => {
                let stats = self.schedule_immediate_campaign(campaign.id).await?;
                Ok(ScheduleOutcome::Dispatched { stats })
            }
            ScheduleType::Scheduled => {
                self.schedule_campaign(
                    campaign.id,
                    descriptor.start_time.unwrap_or_else(Utc::now),
                )
                .await
            }
            ScheduleType::Recurring => {
                self.schedule_recurring_campaign(
                    campaign.id,
                    descriptor.recurrence.unwrap_or(Recurrence::None),
                    descriptor.start_time,
                )
                .await
            }
        }
    }

    /// Destroy the job and mark the campaign stopped
    pub async fn cancel_campaign(&self, campaign_id: CampaignId) -> Result<(), SchedulerError> {
        self.load(campaign_id).await?;
        self.drop_job(campaign_id).await;

        self.store
            .update_campaign_status(campaign_id, CampaignStatus::Stopped)
            .await?;
        self.events.publish(CampaignEvent::Cancelled { campaign_id });
        info!(%campaign_id, "Campaign cancelled");

        Ok(())
    }

    /// Stop the timer but keep the job so it can be resumed
    pub async fn pause_campaign(&self, campaign_id: CampaignId) -> Result<(), SchedulerError> {
        {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(&campaign_id)
                .ok_or(SchedulerError::NoJob(campaign_id))?;
            if let Some(handle) = job.handle.take() {
                handle.abort();
            }
            job.state = JobState::Paused;
        }

        self.store
            .update_campaign_status(campaign_id, CampaignStatus::Paused)
            .await?;
        self.events.publish(CampaignEvent::Paused { campaign_id });
        info!(%campaign_id, "Campaign paused");

        Ok(())
    }

    /// Restart a paused job. Without a registry entry the schedule is
    /// re-derived from the campaign record.
    pub async fn resume_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let resumed = {
            let mut jobs = self.jobs.lock().await;
            let now = Utc::now();
            match jobs.get(&campaign_id).map(|job| (job.state, job.fired)) {
                Some((JobState::Active, _)) => {
                    let next_run = jobs
                        .get(&campaign_id)
                        .and_then(|job| job.schedule.next_run(now))
                        .unwrap_or(now);
                    debug!(%campaign_id, "Job already active, nothing to resume");
                    return Ok(ScheduleOutcome::Registered { next_run });
                }
                Some((JobState::Paused, true)) => {
                    jobs.remove(&campaign_id);
                    Resume::Fired
                }
                Some((JobState::Paused, false)) => match jobs.get_mut(&campaign_id) {
                    Some(job) => {
                        let next_run = job.schedule.next_run(now).unwrap_or(now);
                        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
                        job.handle = Some(spawn_job(
                            self.dispatcher.clone(),
                            self.jobs.clone(),
                            campaign_id,
                            job_id,
                            job.schedule.clone(),
                        ));
                        job.job_id = job_id;
                        job.state = JobState::Active;
                        Resume::Rearmed(next_run)
                    }
                    None => Resume::Unregistered,
                },
                None => Resume::Unregistered,
            }
        };

        let outcome = match resumed {
            Resume::Rearmed(next_run) => {
                self.store
                    .update_campaign_status(campaign_id, CampaignStatus::Scheduled)
                    .await?;
                ScheduleOutcome::Registered { next_run }
            }
            Resume::Fired => {
                // the one-shot run already happened; an in-flight run sets the final status itself
                let status = if self.dispatcher.is_running(campaign_id).await {
                    CampaignStatus::Running
                } else {
                    CampaignStatus::Completed
                };
                self.store.update_campaign_status(campaign_id, status).await?;
                info!(%campaign_id, "One-shot campaign already ran, not re-arming");
                ScheduleOutcome::AlreadyFired
            }
            Resume::Unregistered => {
                let campaign = self.load(campaign_id).await?;
                if campaign.status != CampaignStatus::Paused {
                    return Err(SchedulerError::NoJob(campaign_id));
                }
                self.schedule_from_record(&campaign).await?
            }
        };

        self.events.publish(CampaignEvent::Resumed { campaign_id });
        info!(%campaign_id, "Campaign resumed");

        Ok(outcome)
    }

    /// Re-register every `scheduled` campaign that has no job. Returns how
    /// many jobs were registered.
    pub async fn reconcile(&self) -> Result<usize, SchedulerError> {
        let campaigns = self
            .store
            .list_campaigns(Some(CampaignStatus::Scheduled))
            .await?;
        let mut registered = 0;

        for campaign in campaigns {
            if self.is_registered(campaign.id).await
                || self.dispatcher.is_running(campaign.id).await
            {
                continue;
            }

            let schedule = self.job_schedule_for(&campaign);
            match self.register(campaign.id, schedule).await {
                Ok(next_run) => {
                    info!(campaign_id = %campaign.id, %next_run, "Re-registered scheduled campaign");
                    registered += 1;
                }
                Err(e) => warn!(campaign_id = %campaign.id, "Could not re-register campaign: {}", e),
            }
        }

        Ok(registered)
    }

    /// Reconcile now and then every `interval_secs`
    pub async fn run(&self, interval_secs: u64) {
        let mut ticker = interval(TokioDuration::from_secs(interval_secs.max(1)));

        info!("Campaign scheduler started (reconcile interval: {}s)", interval_secs);

        loop {
            ticker.tick().await;

            if let Err(e) = self.reconcile().await {
                error!("Error reconciling scheduled campaigns: {}", e);
            }
        }
    }

    /// Abort every timer
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            if let Some(handle) = job.handle {
                handle.abort();
            }
        }
    }

    pub async fn is_registered(&self, campaign_id: CampaignId) -> bool {
        self.jobs.lock().await.contains_key(&campaign_id)
    }

    pub async fn job_state(&self, campaign_id: CampaignId) -> Option<JobState> {
        self.jobs.lock().await.get(&campaign_id).map(|job| job.state)
    }

    pub async fn registered_count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{body_template, seed_campaign, seed_contact, store_with_credentials, FakeSender};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use std::time::Duration as StdDuration;
    use wacm_storage::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        sender: Arc<FakeSender>,
        scheduler: CampaignScheduler,
    }

    async fn fixture() -> Fixture {
        fixture_with_delay(StdDuration::ZERO).await
    }

    async fn fixture_with_delay(send_delay: StdDuration) -> Fixture {
        let store = store_with_credentials().await;
        let sender = Arc::new(FakeSender::default());
        let events = EventBus::default();
        let dispatcher = Arc::new(
            CampaignDispatcher::new(store.clone(), sender.clone(), events.clone())
                .with_send_delay(send_delay),
        );
        Fixture {
            store,
            sender,
            scheduler: CampaignScheduler::new(dispatcher, events),
        }
    }

    async fn draft_campaign(f: &Fixture) -> Campaign {
        let template = body_template(&f.store).await;
        let ana = seed_contact(&f.store, "Ana", "5511000000001").await;
        seed_campaign(&f.store, template.id, vec![ana.id], ScheduleDescriptor::immediate()).await
    }

    /// Three contacts, so a run with a 1s send delay lasts about 2s
    async fn three_contact_campaign(f: &Fixture) -> Campaign {
        let template = body_template(&f.store).await;
        let mut contacts = Vec::new();
        for (name, phone) in [
            ("Ana", "5511000000001"),
            ("Bruno", "5511000000002"),
            ("Carla", "5511000000003"),
        ] {
            contacts.push(seed_contact(&f.store, name, phone).await.id);
        }
        seed_campaign(&f.store, template.id, contacts, ScheduleDescriptor::immediate()).await
    }

    async fn status(f: &Fixture, id: CampaignId) -> CampaignStatus {
        f.store.get_campaign(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn past_start_time_dispatches_immediately() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;

        let outcome = f
            .scheduler
            .schedule_campaign(campaign.id, Utc::now() - Duration::minutes(5))
            .await
            .unwrap();

        assert!(matches!(outcome, ScheduleOutcome::Dispatched { ref stats } if stats.succeeded == 1));
        assert!(!f.scheduler.is_registered(campaign.id).await);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Completed);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_existing_job() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;

        f.scheduler
            .schedule_campaign(campaign.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let second = Utc::now() + Duration::hours(2);
        let outcome = f.scheduler.schedule_campaign(campaign.id, second).await.unwrap();

        assert_eq!(outcome, ScheduleOutcome::Registered { next_run: second });
        assert_eq!(f.scheduler.registered_count().await, 1);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Scheduled);

        let stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule, ScheduleDescriptor::at(second));
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_job_fires_and_removes_itself() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;

        f.scheduler
            .schedule_campaign(campaign.id, Utc::now() + Duration::seconds(2))
            .await
            .unwrap();
        assert!(f.scheduler.is_registered(campaign.id).await);

        tokio::time::sleep(StdDuration::from_secs(3)).await;

        assert!(!f.scheduler.is_registered(campaign.id).await);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Completed);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn daily_campaign_returns_to_scheduled_after_each_run() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;

        let outcome = f
            .scheduler
            .schedule_recurring_campaign(
                campaign.id,
                Recurrence::Daily,
                Some(Utc::now() - Duration::hours(1)),
            )
            .await
            .unwrap();
        let ScheduleOutcome::Registered { next_run } = outcome else {
            panic!("expected a registered job");
        };
        assert!(next_run > Utc::now() + Duration::hours(22));

        tokio::time::sleep(StdDuration::from_secs(24 * 3600)).await;

        let stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Scheduled);
        assert_eq!(stored.last_run_stats.map(|s| s.succeeded), Some(1));
        assert!(f.scheduler.is_registered(campaign.id).await);
        assert_eq!(f.scheduler.job_state(campaign.id).await, Some(JobState::Active));
    }

    #[tokio::test]
    async fn recurrence_none_degrades_to_one_shot() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        let at = Utc::now() + Duration::hours(3);

        f.scheduler
            .schedule_recurring_campaign(campaign.id, Recurrence::None, Some(at))
            .await
            .unwrap();

        let stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule, ScheduleDescriptor::at(at));
    }

    #[tokio::test]
    async fn pause_keeps_entry_and_resume_restores_it() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        f.scheduler
            .schedule_recurring_campaign(campaign.id, Recurrence::Weekly, None)
            .await
            .unwrap();

        f.scheduler.pause_campaign(campaign.id).await.unwrap();
        assert!(f.scheduler.is_registered(campaign.id).await);
        assert_eq!(f.scheduler.job_state(campaign.id).await, Some(JobState::Paused));
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Paused);

        let outcome = f.scheduler.resume_campaign(campaign.id).await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Registered { .. }));
        assert_eq!(f.scheduler.job_state(campaign.id).await, Some(JobState::Active));
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn pause_without_job_is_an_error() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;

        let err = f.scheduler.pause_campaign(campaign.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoJob(_)));
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn resume_after_restart_rederives_from_record() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        let mut stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        stored.schedule = ScheduleDescriptor::at(Utc::now() + Duration::hours(1));
        stored.status = CampaignStatus::Paused;
        f.store.update_campaign(stored).await.unwrap();

        f.scheduler.resume_campaign(campaign.id).await.unwrap();

        assert!(f.scheduler.is_registered(campaign.id).await);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn cancel_removes_job_and_stops_campaign() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        f.scheduler
            .schedule_campaign(campaign.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        f.scheduler.cancel_campaign(campaign.id).await.unwrap();

        assert!(!f.scheduler.is_registered(campaign.id).await);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Stopped);
    }

    #[tokio::test]
    async fn reconcile_registers_orphaned_scheduled_campaigns_once() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        let mut stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        stored.schedule = ScheduleDescriptor::recurring(Recurrence::Daily, Some(Utc::now()));
        stored.status = CampaignStatus::Scheduled;
        f.store.update_campaign(stored).await.unwrap();
        // draft campaigns are ignored
        draft_campaign(&f).await;

        assert_eq!(f.scheduler.reconcile().await.unwrap(), 1);
        assert!(f.scheduler.is_registered(campaign.id).await);
        assert_eq!(f.scheduler.reconcile().await.unwrap(), 0);
        assert_eq!(f.scheduler.registered_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_fires_one_shot_missed_while_down() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        let mut stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        stored.schedule = ScheduleDescriptor::at(Utc::now() - Duration::hours(1));
        stored.status = CampaignStatus::Scheduled;
        f.store.update_campaign(stored).await.unwrap();

        assert_eq!(f.scheduler.reconcile().await.unwrap(), 1);
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Completed);
        assert!(!f.scheduler.is_registered(campaign.id).await);
    }

    #[tokio::test]
    async fn past_start_time_replaces_a_recurring_job() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        f.scheduler
            .schedule_recurring_campaign(campaign.id, Recurrence::Daily, None)
            .await
            .unwrap();
        assert!(f.scheduler.is_registered(campaign.id).await);

        let past = Utc::now() - Duration::minutes(1);
        let outcome = f.scheduler.schedule_campaign(campaign.id, past).await.unwrap();

        assert!(matches!(outcome, ScheduleOutcome::Dispatched { .. }));
        assert!(!f.scheduler.is_registered(campaign.id).await);
        assert_eq!(f.scheduler.registered_count().await, 0);
        let stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule, ScheduleDescriptor::at(past));
        assert_eq!(stored.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn immediate_dispatch_drops_the_pending_one_shot() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        f.scheduler
            .schedule_campaign(campaign.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let stats = f
            .scheduler
            .schedule_immediate_campaign(campaign.id)
            .await
            .unwrap();

        assert_eq!(stats.succeeded, 1);
        assert!(!f.scheduler.is_registered(campaign.id).await);
        let stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule, ScheduleDescriptor::immediate());
        assert_eq!(stored.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn resuming_an_active_job_leaves_the_status_alone() {
        let f = fixture().await;
        let campaign = draft_campaign(&f).await;
        f.scheduler
            .schedule_recurring_campaign(campaign.id, Recurrence::Daily, None)
            .await
            .unwrap();
        f.store
            .update_campaign_status(campaign.id, CampaignStatus::Running)
            .await
            .unwrap();

        let outcome = f.scheduler.resume_campaign(campaign.id).await.unwrap();

        assert!(matches!(outcome, ScheduleOutcome::Registered { .. }));
        assert_eq!(f.scheduler.job_state(campaign.id).await, Some(JobState::Active));
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn pausing_a_one_shot_mid_run_never_sends_twice() {
        let f = fixture_with_delay(StdDuration::from_secs(1)).await;
        let campaign = three_contact_campaign(&f).await;
        f.scheduler
            .schedule_campaign(campaign.id, Utc::now() + Duration::seconds(1))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(1500)).await;
        f.scheduler.pause_campaign(campaign.id).await.unwrap();
        assert_eq!(f.scheduler.job_state(campaign.id).await, Some(JobState::Paused));

        tokio::time::sleep(StdDuration::from_secs(10)).await;
        assert_eq!(f.sender.sent().len(), 3);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Paused);

        let outcome = f.scheduler.resume_campaign(campaign.id).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::AlreadyFired);
        assert!(!f.scheduler.is_registered(campaign.id).await);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Completed);

        tokio::time::sleep(StdDuration::from_secs(10)).await;
        assert_eq!(f.sender.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_mid_run_keeps_the_campaign_stopped() {
        let f = fixture_with_delay(StdDuration::from_secs(1)).await;
        let campaign = three_contact_campaign(&f).await;
        f.scheduler
            .schedule_campaign(campaign.id, Utc::now() + Duration::seconds(1))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(1500)).await;
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Running);
        f.scheduler.cancel_campaign(campaign.id).await.unwrap();

        tokio::time::sleep(StdDuration::from_secs(10)).await;
        // the in-flight batch finishes, the end-of-run status does not overwrite the cancel
        assert_eq!(f.sender.sent().len(), 3);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Stopped);
        assert!(!f.scheduler.is_registered(campaign.id).await);
        let stored = f.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_stats.map(|s| s.succeeded), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn pausing_a_daily_run_mid_flight_stays_paused() {
        let f = fixture_with_delay(StdDuration::from_secs(1)).await;
        let campaign = three_contact_campaign(&f).await;
        let outcome = f
            .scheduler
            .schedule_recurring_campaign(
                campaign.id,
                Recurrence::Daily,
                Some(Utc::now() - Duration::hours(1)),
            )
            .await
            .unwrap();
        let ScheduleOutcome::Registered { next_run } = outcome else {
            panic!("expected a registered job");
        };

        let until_fire = (next_run - Utc::now()).to_std().unwrap();
        tokio::time::sleep(until_fire + StdDuration::from_millis(1500)).await;
        f.scheduler.pause_campaign(campaign.id).await.unwrap();

        tokio::time::sleep(StdDuration::from_secs(10)).await;
        assert_eq!(f.sender.sent().len(), 3);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Paused);
        assert_eq!(f.scheduler.job_state(campaign.id).await, Some(JobState::Paused));

        // no timer is left armed while paused
        tokio::time::sleep(StdDuration::from_secs(3 * 24 * 3600)).await;
        assert_eq!(f.sender.sent().len(), 3);
        assert_eq!(status(&f, campaign.id).await, CampaignStatus::Paused);
    }
}
