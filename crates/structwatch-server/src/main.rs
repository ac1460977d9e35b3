//! StructWatch - Notification pipeline entry point

use anyhow::{Context, Result};
use prometheus::Registry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use structwatch_common::config::{Config, LoggingConfig};
use structwatch_core::render::CachedResolver;
use structwatch_core::{
    AlertScheduler, DeliveryWorker, EsiClient, EsiEntityResolver, Forwarder, HttpTransport,
    LogAdminNotifier, LogTimerSink, NotificationRenderer, NotificationSync, PipelineMetrics,
    SsoTokens, StructureSync, SyncHealthTracker, TimerProcessor, WebhookQueue,
};
use structwatch_storage::{DatabasePool, Repositories};
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting StructWatch...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    let repos = Repositories::database(db_pool);
    let registry = Registry::new();
    let metrics = PipelineMetrics::new(&registry).context("registering metrics")?;

    // Remote API
    let esi = Arc::new(EsiClient::new(&config.esi)?);
    let resolver = Arc::new(CachedResolver::new(
        EsiEntityResolver::new(esi.clone()),
        &config.cache,
    ));
    let sso_http = reqwest::Client::builder()
        .timeout(config.esi.timeout())
        .user_agent(config.esi.user_agent.as_str())
        .build()?;
    let tokens = Arc::new(SsoTokens::new(
        sso_http,
        config.esi.sso.clone(),
        repos.owners.clone(),
    ));
    let admin = Arc::new(LogAdminNotifier);

    // Pipeline
    let health = SyncHealthTracker::new(repos.sync_states.clone(), config.sync.clone());
    let queue = WebhookQueue::new(repos.queue.clone());
    let renderer = NotificationRenderer::new(
        resolver.clone(),
        repos.structures.clone(),
        config.alerts.app_title.clone(),
    );
    let forwarder = Arc::new(Forwarder::new(
        repos.clone(),
        renderer,
        queue.clone(),
        health.clone(),
        config.alerts.clone(),
        config.delivery.clone(),
        metrics.clone(),
    ));
    let scheduler = Arc::new(AlertScheduler::new(
        repos.clone(),
        forwarder.clone(),
        metrics.clone(),
    ));
    let worker = Arc::new(DeliveryWorker::new(
        queue,
        repos.webhooks.clone(),
        Arc::new(HttpTransport::new(config.delivery.request_timeout())?),
        config.delivery.clone(),
        metrics.clone(),
    ));
    let structure_sync = Arc::new(StructureSync::new(
        esi.clone(),
        tokens.clone(),
        resolver,
        repos.clone(),
        health.clone(),
        forwarder.clone(),
        admin.clone(),
        config.alerts.clone(),
        config.esi.languages.clone(),
    ));
    let notification_sync = Arc::new(NotificationSync::new(
        esi,
        tokens,
        repos.clone(),
        health,
        admin,
    ));
    let timers = Arc::new(TimerProcessor::new(
        repos.clone(),
        Arc::new(LogTimerSink),
        config.alerts.clone(),
    ));

    let jobs = &config.jobs;
    let mut tasks = JoinSet::new();

    {
        let repos = repos.clone();
        spawn_job(&mut tasks, "structures", jobs.structures_interval_secs, move || {
            let repos = repos.clone();
            let sync = structure_sync.clone();
            async move {
                for owner in active_owners(&repos).await {
                    if let Err(e) = sync.run(&owner).await {
                        error!(owner_id = owner.corporation_id, error = %e, "Structure sync failed");
                    }
                }
            }
        });
    }
    {
        let repos = repos.clone();
        spawn_job(&mut tasks, "notifications", jobs.notifications_interval_secs, move || {
            let repos = repos.clone();
            let sync = notification_sync.clone();
            let timers = timers.clone();
            async move {
                for owner in active_owners(&repos).await {
                    if let Err(e) = sync.run(&owner).await {
                        error!(owner_id = owner.corporation_id, error = %e, "Notification sync failed");
                    }
                    if let Err(e) = timers.process_owner(&owner).await {
                        error!(owner_id = owner.corporation_id, error = %e, "Timer processing failed");
                    }
                }
            }
        });
    }
    {
        let repos = repos.clone();
        spawn_job(&mut tasks, "forwarding", jobs.forwarding_interval_secs, move || {
            let repos = repos.clone();
            let forwarder = forwarder.clone();
            async move {
                for owner in active_owners(&repos).await {
                    if let Err(e) = forwarder.forward_owner(&owner).await {
                        error!(owner_id = owner.corporation_id, error = %e, "Forwarding failed");
                    }
                }
            }
        });
    }
    spawn_job(&mut tasks, "fuel_alerts", jobs.fuel_alerts_interval_secs, move || {
        let scheduler = scheduler.clone();
        async move {
            if let Err(e) = scheduler.run_fuel_alerts(false).await {
                error!(error = %e, "Fuel alert run failed");
            }
            if let Err(e) = scheduler.run_jump_fuel_alerts(false).await {
                error!(error = %e, "Jump fuel alert run failed");
            }
        }
    });
    spawn_job(&mut tasks, "delivery", jobs.delivery_interval_secs, move || {
        let worker = worker.clone();
        async move {
            if let Err(e) = worker.drain_all().await {
                error!(error = %e, "Webhook delivery failed");
            }
        }
    });

    info!("StructWatch running");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down...");
    tasks.shutdown().await;
    info!("StructWatch shutdown complete");

    Ok(())
}

/// Run `job` every `interval_secs`, the first time right away
fn spawn_job<F, Fut>(tasks: &mut JoinSet<()>, name: &'static str, interval_secs: u64, job: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    info!(job = name, interval_secs, "Scheduling job");
    tasks.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            job().await;
        }
    });
}

async fn active_owners(repos: &Repositories) -> Vec<structwatch_storage::Owner> {
    match repos.owners.list_active().await {
        Ok(owners) => owners,
        Err(e) => {
            error!(error = %e, "Failed to load owners");
            Vec::new()
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
