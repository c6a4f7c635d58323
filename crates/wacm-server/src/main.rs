//! WACM - WhatsApp campaign manager entry point

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wacm_api::AppState;
use wacm_common::config::{Config, LoggingConfig};
use wacm_common::Error;
use wacm_core::{
    CampaignDispatcher, CampaignEvent, CampaignScheduler, EventBus, GraphApiClient,
    WebhookProcessor,
};
use wacm_storage::models::Settings;
use wacm_storage::{DatabasePool, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the format can be applied
    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting WACM...");

    // Initialize storage
    let store = build_store(&config).await?;
    seed_settings(store.as_ref(), &config).await?;

    // Provider client and event bus
    let sender = Arc::new(GraphApiClient::new(&config.whatsapp)?);
    let events = EventBus::default();
    let events_handle = spawn_event_logger(&events);

    // Scheduler
    let dispatcher = Arc::new(
        CampaignDispatcher::new(store.clone(), sender.clone(), events.clone())
            .with_config(&config.dispatch),
    );
    let scheduler = Arc::new(
        CampaignScheduler::new(dispatcher, events.clone())
            .with_default_timezone(config.scheduler.default_timezone.clone()),
    );

    // Reconcile now and then periodically
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let interval = config.scheduler.reconcile_interval_secs;
        tokio::spawn(async move {
            scheduler.run(interval).await;
        })
    };

    let webhook = Arc::new(WebhookProcessor::new(store.clone(), sender, events));

    // Start API server
    let state = AppState {
        store,
        scheduler: scheduler.clone(),
        webhook,
        auth_token: config.api.auth_token.clone(),
        webhook_verify_token: config.whatsapp.webhook_verify_token.clone(),
        app_secret: config.whatsapp.app_secret.clone(),
    };
    if state.auth_token.is_none() {
        warn!("API authentication is disabled (api.auth_token not set)");
    }
    let app = wacm_api::create_router(state, &config.api.cors_origins);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    scheduler_handle.abort();
    scheduler.shutdown().await;
    events_handle.abort();

    info!("WACM shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},wacm=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

async fn build_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.database.backend.as_str() {
        "postgres" => {
            let pool = DatabasePool::connect(&config.database).await?;
            pool.migrate().await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        "memory" => {
            warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(Error::Config(format!("Unsupported database backend: {}", other)).into()),
    }
}

/// Copy `[whatsapp]` credentials into storage when none are stored yet
async fn seed_settings(store: &dyn Store, config: &Config) -> Result<()> {
    if store.get_settings().await?.is_some() {
        return Ok(());
    }

    let whatsapp = &config.whatsapp;
    let (Some(phone_number_id), Some(access_token)) =
        (&whatsapp.phone_number_id, &whatsapp.access_token)
    else {
        debug!("No WhatsApp credentials in configuration");
        return Ok(());
    };

    store
        .put_settings(Settings {
            phone_number_id: phone_number_id.clone(),
            access_token: access_token.clone(),
            business_account_id: whatsapp.business_account_id.clone(),
            webhook_verify_token: whatsapp.webhook_verify_token.clone(),
        })
        .await?;
    info!(%phone_number_id, "WhatsApp settings seeded from configuration");

    Ok(())
}

/// Log campaign lifecycle events
fn spawn_event_logger(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(CampaignEvent::Completed { campaign_id, stats }) => info!(
                    %campaign_id,
                    attempted = stats.attempted,
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    "Campaign run completed"
                ),
                Ok(CampaignEvent::Stopped {
                    campaign_id,
                    reason,
                }) => warn!(%campaign_id, %reason, "Campaign stopped"),
                Ok(event) => debug!(?event, "Campaign event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
