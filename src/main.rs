mod config;
mod db;
mod domain;
mod middleware;
mod services;
mod state;
mod time_utils;
mod web;

use crate::config::AppConfig;
use crate::db::seed;
use crate::middleware::RateLimiter;
use crate::services::{notifications, reconciler};
use crate::state::SharedState;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SUBMIT_WINDOW_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    seed::seed_all(&pool).await?;

    let mailer = notifications::mailer_from_config(&config)?;
    tracing::info!(mailer = mailer.name(), "Email hand-off configured");

    let shared: SharedState = Arc::new(state::AppState {
        pool,
        submit_limiter: RateLimiter::new(config.submit_rate_limit, SUBMIT_WINDOW_SECS),
        config: Arc::new(config),
        mailer,
    });

    let scheduler = JobScheduler::new().await?;

    // Overdue sweep and reconciliation, hourly
    let shared_for_maintenance = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_maintenance.clone();
            Box::pin(async move {
                run_maintenance(&state).await;
            })
        })?)
        .await?;

    // Due-soon reminders and overdue notices, every 15 minutes
    let shared_for_reminders = shared.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let state = shared_for_reminders.clone();
            Box::pin(async move {
                if let Err(e) = notifications::run_reminder_sweep(
                    &state.pool,
                    state.mailer.as_ref(),
                    &state.config,
                    chrono::Utc::now(),
                )
                .await
                {
                    tracing::error!("Reminder sweep failed: {}", e);
                }
            })
        })?)
        .await?;

    // Submission limiter cleanup
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 30 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                state.submit_limiter.cleanup().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Overdue sweep + reconciliation: hourly");
    tracing::info!("  - Reminder emails: every 15 min");
    tracing::info!("  - Submission limiter cleanup: hourly");

    let app = Router::new()
        .merge(web::routes(shared.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = shared.config.bind_addr.clone();
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_maintenance(state: &SharedState) {
    let now = chrono::Utc::now();
    let grace = state.config.overdue_grace();

    match db::assignments::mark_overdue_before(&state.pool, now - grace).await {
        Ok(0) => {}
        Ok(count) => tracing::info!("Marked {} assignments overdue", count),
        Err(e) => tracing::error!("Overdue sweep failed: {}", e),
    }

    if let Err(e) = reconciler::run(&state.pool, None, now, grace, false).await {
        tracing::error!("Scheduled reconciliation failed: {}", e);
    }
}
