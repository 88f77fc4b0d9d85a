use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::health::HealthState;
use crate::api::latency::{LatencySnapshot, LatencyStats};
use crate::error::AppError;
use crate::monitor::MonitorEngine;
use crate::provider::Provider;
use crate::registry::{is_iata, WindowRegistry};
use crate::state::WindowStore;
use crate::types::{cheapest, Observation, Offer, Price, SearchConstraints, WindowId, WindowTarget};

/// Static settings echoed by /health and used as defaults for /search.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub check_interval_minutes: u64,
    pub price_threshold: f64,
    pub currency: String,
    pub recipients_configured: usize,
    pub preferred_stop: Option<String>,
    pub max_stopover_minutes: u32,
    pub search_timeout: Duration,
}

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<WindowStore>,
    pub registry: Arc<WindowRegistry>,
    pub engine: Arc<MonitorEngine>,
    pub provider: Arc<dyn Provider>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub info: Arc<ServiceInfo>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/targets", get(get_targets))
        .route("/windows", get(get_windows))
        .route("/windows/:id", get(get_window))
        .route("/windows/:id/check", post(check_window))
        .route("/search", post(custom_search))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub check_interval_minutes: u64,
    pub price_threshold: f64,
    pub currency: String,
    pub recipients_configured: usize,
    pub windows: usize,
    pub statuses: BTreeMap<String, usize>,
    pub sweep_running: bool,
    pub sweeps_completed: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub windows_checked: u64,
    pub alerts_fired: u64,
    pub notify_failures: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TargetResponse {
    pub id: String,
    #[serde(flatten)]
    pub target: WindowTarget,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowResponse {
    pub id: String,
    pub target: WindowTarget,
    pub observation: Observation,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub preferred_stopover: Option<String>,
    pub max_stopover_minutes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub provider: String,
    pub origin: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub best_price: Option<Price>,
    pub offers: Vec<Offer>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let statuses = state
        .store
        .status_counts()
        .into_iter()
        .map(|(status, n)| (status.to_string(), n))
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        provider: state.provider.name().to_string(),
        check_interval_minutes: state.info.check_interval_minutes,
        price_threshold: state.info.price_threshold,
        currency: state.info.currency.clone(),
        recipients_configured: state.info.recipients_configured,
        windows: state.store.window_count(),
        statuses,
        sweep_running: state.health.sweep_running(),
        sweeps_completed: state.health.sweeps_completed(),
        last_sweep_at: state.health.last_sweep_at(),
        windows_checked: state.health.windows_checked(),
        alerts_fired: state.health.alerts_fired(),
        notify_failures: state.health.notify_failures(),
    })
}

async fn get_targets(State(state): State<ApiState>) -> Json<Vec<TargetResponse>> {
    let targets = state
        .registry
        .targets()
        .iter()
        .map(|t| TargetResponse {
            id: t.id().to_string(),
            target: t.clone(),
        })
        .collect();
    Json(targets)
}

async fn get_windows(State(state): State<ApiState>) -> Json<Vec<WindowResponse>> {
    let windows = state
        .store
        .get_all()
        .into_iter()
        .map(|(target, observation)| WindowResponse {
            id: target.id().to_string(),
            target,
            observation,
        })
        .collect();
    Json(windows)
}

async fn get_window(
    State(state): State<ApiState>,
    Path(raw_id): Path<String>,
) -> Result<Json<WindowResponse>, AppError> {
    let id: WindowId = raw_id.parse()?;
    let target = state
        .registry
        .get(&id)
        .ok_or_else(|| AppError::WindowNotFound(raw_id.clone()))?;
    let observation = state
        .store
        .get(&id)
        .ok_or_else(|| AppError::WindowNotFound(raw_id.clone()))?;

    Ok(Json(WindowResponse {
        id: id.to_string(),
        target: target.clone(),
        observation,
    }))
}

async fn check_window(
    State(state): State<ApiState>,
    Path(raw_id): Path<String>,
) -> Result<Json<WindowResponse>, AppError> {
    let id: WindowId = raw_id.parse()?;
    let target = state
        .registry
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::WindowNotFound(raw_id.clone()))?;
    let observation = state.engine.run_once(&id).await?;

    Ok(Json(WindowResponse {
        id: id.to_string(),
        target,
        observation,
    }))
}

/// Searches an arbitrary route and dates. Results are returned, never stored.
async fn custom_search(
    State(state): State<ApiState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let origin = req.origin.trim().to_ascii_uppercase();
    let destination = req.destination.trim().to_ascii_uppercase();
    let preferred = req
        .preferred_stopover
        .map(|s| s.trim().to_ascii_uppercase())
        .or_else(|| state.info.preferred_stop.clone());

    for code in [Some(&origin), Some(&destination), preferred.as_ref()]
        .into_iter()
        .flatten()
    {
        if !is_iata(code) {
            return Err(AppError::InvalidRequest(format!(
                "'{code}' is not a 3-letter airport code"
            )));
        }
    }
    if origin == destination {
        return Err(AppError::InvalidRequest(
            "origin and destination must differ".to_string(),
        ));
    }
    if req.return_date <= req.outbound_date {
        return Err(AppError::InvalidRequest(
            "return_date must be after outbound_date".to_string(),
        ));
    }

    let constraints = SearchConstraints {
        preferred_stopover: preferred,
        max_stopover_minutes: req
            .max_stopover_minutes
            .unwrap_or(state.info.max_stopover_minutes),
    };

    info!(
        origin = %origin,
        destination = %destination,
        outbound = %req.outbound_date,
        ret = %req.return_date,
        "Custom search requested"
    );

    let search = state.provider.search(
        &origin,
        &destination,
        req.outbound_date,
        req.return_date,
        &constraints,
    );
    let offers = match tokio::time::timeout(state.info.search_timeout, search).await {
        Ok(Ok(offers)) => offers,
        Ok(Err(e)) => return Err(AppError::ProviderUnavailable(e.to_string())),
        Err(_) => {
            return Err(AppError::ProviderUnavailable(
                "search timed out".to_string(),
            ))
        }
    };

    Ok(Json(SearchResponse {
        provider: state.provider.name().to_string(),
        origin,
        destination,
        outbound_date: req.outbound_date,
        return_date: req.return_date,
        best_price: cheapest(&offers),
        offers,
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySnapshot> {
    Json(state.latency.snapshot())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
