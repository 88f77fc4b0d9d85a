mod alert;
mod api;
mod config;
mod error;
mod monitor;
mod provider;
mod registry;
mod state;
mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alert::{FanoutNotifier, LogNotifier, Notifier, WebhookNotifier};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState, ServiceInfo};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::monitor::{EngineSettings, MonitorEngine};
use crate::provider::build_provider;
use crate::registry::WindowRegistry;
use crate::state::WindowStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Registry: a bad target list stops startup ---
    let registry = Arc::new(WindowRegistry::from_config(&cfg)?);
    info!(
        "Monitoring {} windows on {}-{} (threshold {:.2} {}, every {} min)",
        registry.len(),
        cfg.origin,
        cfg.destination,
        cfg.price_threshold,
        cfg.currency,
        cfg.check_interval_minutes(),
    );

    let store = WindowStore::new(&registry);
    let provider = build_provider(&cfg)?;
    let notifier = build_notifier(&cfg)?;
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    let engine = MonitorEngine::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::clone(&provider),
        notifier,
        Arc::clone(&health),
        Arc::clone(&latency),
        EngineSettings::from_config(&cfg),
    );

    // --- Background sweeps ---
    let cancel = CancellationToken::new();
    let engine_task = tokio::spawn(Arc::clone(&engine).run(cancel.clone()));

    // --- HTTP API ---
    let api_state = ApiState {
        store,
        registry,
        engine,
        provider,
        health,
        latency,
        info: Arc::new(ServiceInfo {
            check_interval_minutes: cfg.check_interval_minutes(),
            price_threshold: cfg.price_threshold,
            currency: cfg.currency.clone(),
            recipients_configured: cfg.email_recipients.len(),
            preferred_stop: cfg.preferred_stop.clone(),
            max_stopover_minutes: cfg.max_stopover_minutes,
            search_timeout: cfg.search_timeout,
        }),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    // Let an in-flight window finish before exiting.
    cancel.cancel();
    if let Err(e) = engine_task.await {
        error!("Monitor engine task failed: {e}");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Log notifier always, plus the webhook when ALERT_WEBHOOK_URL is set.
fn build_notifier(cfg: &Config) -> Result<Arc<dyn Notifier>> {
    let log: Arc<dyn Notifier> = Arc::new(LogNotifier::new(cfg.email_recipients.clone()));
    let Some(url) = cfg.alert_webhook_url.clone() else {
        if cfg.email_recipients.is_empty() {
            warn!("EMAIL_RECIPIENTS not set, alerts will only be logged");
        }
        return Ok(log);
    };

    let webhook = WebhookNotifier::new(url.clone()).map_err(|e| AppError::Config(e.to_string()))?;
    info!("Alerts will also be posted to {url}");
    Ok(Arc::new(FanoutNotifier::new(vec![log, Arc::new(webhook)])))
}
