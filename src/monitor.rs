//! Scheduled monitoring of every registered window.
//!
//! One background task ([`MonitorEngine::run`]) sweeps the registry on a
//! fixed interval. HTTP handlers may trigger [`MonitorEngine::run_once`] for a
//! single window; both paths go through the same per-window check and write
//! the store the same way.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertDeduplicator, Notifier};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, RETRY_BACKOFF_MS};
use crate::error::{AppError, Result};
use crate::provider::{Provider, ProviderError};
use crate::registry::WindowRegistry;
use crate::state::WindowStore;
use crate::types::{cheapest, AlertRecord, Observation, Offer, WindowId, WindowStatus, WindowTarget};

/// Timing knobs for the engine, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub interval: Duration,
    pub search_timeout: Duration,
    pub max_retries: u32,
    /// Pause between consecutive windows of one sweep.
    pub spacing: Duration,
    pub backoff: Vec<Duration>,
    pub price_threshold: f64,
}

impl EngineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.check_interval,
            search_timeout: cfg.search_timeout,
            max_retries: cfg.search_max_retries,
            spacing: cfg.search_spacing,
            backoff: RETRY_BACKOFF_MS.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            price_threshold: cfg.price_threshold,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff
            .get(attempt as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Per-status tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub ok: usize,
    pub no_results: usize,
    pub errors: usize,
    pub rate_limited: usize,
    pub alerts: usize,
    pub cancelled: bool,
}

impl SweepSummary {
    fn count(&mut self, status: WindowStatus, alerted: bool) {
        self.checked += 1;
        match status {
            WindowStatus::Ok => self.ok += 1,
            WindowStatus::NoResults => self.no_results += 1,
            WindowStatus::Error => self.errors += 1,
            WindowStatus::RateLimited => self.rate_limited += 1,
            WindowStatus::Unchecked => {}
        }
        if alerted {
            self.alerts += 1;
        }
    }
}

pub struct MonitorEngine {
    registry: Arc<WindowRegistry>,
    store: Arc<WindowStore>,
    provider: Arc<dyn Provider>,
    notifier: Arc<dyn Notifier>,
    dedup: AlertDeduplicator,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    settings: EngineSettings,
}

impl MonitorEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<WindowRegistry>,
        store: Arc<WindowStore>,
        provider: Arc<dyn Provider>,
        notifier: Arc<dyn Notifier>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            store,
            provider,
            notifier,
            dedup: AlertDeduplicator::new(settings.price_threshold),
            health,
            latency,
            settings,
        })
    }

    /// Sweeps immediately, then once per interval, until `cancel` fires.
    /// A sweep in progress stops at the next window boundary.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            windows = self.registry.len(),
            interval_secs = self.settings.interval.as_secs(),
            provider = self.provider.name(),
            "Monitor engine started"
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.sweep(&cancel).await;
        }

        info!("Monitor engine stopped");
    }

    /// One pass over the registry in order. Each window is checked and
    /// written independently; a failing window never stops the sweep.
    pub async fn sweep(&self, cancel: &CancellationToken) -> SweepSummary {
        let started = Instant::now();
        let mut summary = SweepSummary::default();
        self.health.sweep_started();
        info!(windows = self.registry.len(), "Sweep started");

        for (i, target) in self.registry.targets().iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if i > 0 && !self.settings.spacing.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    _ = sleep(self.settings.spacing) => {}
                }
            }
            if let Some((observation, alerted)) = self.check_window(target, cancel).await {
                summary.count(observation.status, alerted);
            }
        }

        self.health.sweep_finished(Utc::now());
        info!(
            checked = summary.checked,
            ok = summary.ok,
            no_results = summary.no_results,
            errors = summary.errors,
            rate_limited = summary.rate_limited,
            alerts = summary.alerts,
            cancelled = summary.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sweep finished"
        );
        summary
    }

    /// Out-of-band check of one registered window. Returns what was written.
    pub async fn run_once(&self, id: &WindowId) -> Result<Observation> {
        let target = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::WindowNotFound(id.to_string()))?;
        info!(window = %id, "Ad-hoc check requested");
        self.check_window(target, &CancellationToken::new())
            .await
            .map(|(observation, _)| observation)
            .ok_or_else(|| AppError::WindowNotFound(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Per-window check
    // -----------------------------------------------------------------------

    /// Searches, records the observation together with its dedup state in a
    /// single store write, then notifies if the deduplicator fired.
    async fn check_window(
        &self,
        target: &WindowTarget,
        cancel: &CancellationToken,
    ) -> Option<(Observation, bool)> {
        let id = target.id();
        let outcome = self.search_with_retry(target, cancel).await;
        let now = Utc::now();

        let (observation, alert) = self
            .store
            .apply(&id, |prev| {
                let (next, alert) = self.next_observation(&id, prev, outcome, now);
                (next.clone(), (next, alert))
            })?;

        self.health.inc_windows_checked();
        log_outcome(&id, &observation);

        let alerted = alert.is_some();
        if let Some(alert) = alert {
            self.health.inc_alerts_fired();
            if let Err(e) = self.notifier.notify(&alert).await {
                self.health.inc_notify_failures();
                error!(window = %id, error = %e, "Alert notification failed");
            }
        }
        Some((observation, alerted))
    }

    fn next_observation(
        &self,
        id: &WindowId,
        prev: &Observation,
        outcome: std::result::Result<Vec<Offer>, ProviderError>,
        now: DateTime<Utc>,
    ) -> (Observation, Option<AlertRecord>) {
        let mut next = match outcome {
            Ok(offers) if offers.is_empty() => Observation {
                status: WindowStatus::NoResults,
                best_price: None,
                offers,
                last_checked_at: Some(now),
                last_error: None,
                last_alerted_price: None,
            },
            Ok(offers) => Observation {
                status: WindowStatus::Ok,
                best_price: cheapest(&offers),
                offers,
                last_checked_at: Some(now),
                last_error: None,
                last_alerted_price: None,
            },
            // Keep the last known prices. The deduplicator clears the alert state below.
            Err(e @ ProviderError::RateLimited { .. }) => Observation {
                status: WindowStatus::RateLimited,
                last_checked_at: Some(now),
                last_error: Some(e.to_string()),
                ..prev.clone()
            },
            Err(e) => Observation {
                status: WindowStatus::Error,
                best_price: None,
                offers: Vec::new(),
                last_checked_at: Some(now),
                last_error: Some(e.to_string()),
                last_alerted_price: None,
            },
        };

        let decision = self.dedup.decide(
            prev.last_alerted_price,
            next.status,
            next.best_price.as_ref().map(|p| p.amount),
        );
        next.last_alerted_price = decision.last_alerted_price;

        let alert = match (&next.best_price, decision.fire) {
            (Some(price), true) => Some(AlertRecord {
                window: id.clone(),
                price: price.clone(),
                threshold: self.dedup.threshold(),
                airline: cheapest_airline(&next.offers),
                at: now,
            }),
            _ => None,
        };
        (next, alert)
    }

    /// Calls the provider under the per-call timeout, retrying transient
    /// failures on the backoff schedule. Rate limits and auth failures are
    /// returned straight away. Once `cancel` fires no new attempt starts and
    /// the last error is returned.
    async fn search_with_retry(
        &self,
        target: &WindowTarget,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<Offer>, ProviderError> {
        let constraints = target.constraints();
        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let result = match timeout(
                self.settings.search_timeout,
                self.provider.search(
                    &target.origin,
                    &target.destination,
                    target.outbound_date,
                    target.return_date,
                    &constraints,
                ),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Network(format!(
                    "search timed out after {}ms",
                    self.settings.search_timeout.as_millis()
                ))),
            };
            self.latency.record(started.elapsed());

            match result {
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    if cancel.is_cancelled() {
                        return Err(e);
                    }
                    let delay = self.settings.backoff_for(attempt);
                    attempt += 1;
                    warn!(
                        window = %target.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient search failure, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(window = %target.id(), "Retry abandoned, shutting down");
                            return Err(e);
                        }
                        _ = sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

fn cheapest_airline(offers: &[Offer]) -> Option<String> {
    offers
        .iter()
        .min_by(|a, b| a.price.amount.total_cmp(&b.price.amount))
        .map(|o| o.airline.clone())
}

fn log_outcome(id: &WindowId, obs: &Observation) {
    match obs.status {
        WindowStatus::Ok => {
            let price = obs.best_price.as_ref().map(|p| p.amount).unwrap_or_default();
            info!(
                window = %id,
                status = %obs.status,
                price,
                offers = obs.offers.len(),
                "Window checked"
            );
        }
        WindowStatus::NoResults => info!(window = %id, status = %obs.status, "Window checked, no offers"),
        WindowStatus::RateLimited | WindowStatus::Error => warn!(
            window = %id,
            status = %obs.status,
            error = obs.last_error.as_deref().unwrap_or(""),
            "Window check failed"
        ),
        WindowStatus::Unchecked => debug!(window = %id, "Window still unchecked"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NotifyError;
    use crate::provider::SyntheticProvider;
    use crate::types::{Price, SearchConstraints};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Scripted = std::result::Result<Vec<Offer>, ProviderError>;

    /// Replays queued responses per return date; empty queue means one cheap offer.
    #[derive(Default)]
    struct ScriptedProvider {
        script: Mutex<HashMap<NaiveDate, VecDeque<Scripted>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn push(&self, ret: NaiveDate, r: Scripted) {
            self.script.lock().unwrap().entry(ret).or_default().push_back(r);
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn search(
            &self,
            _origin: &str,
            _destination: &str,
            _outbound_date: NaiveDate,
            return_date: NaiveDate,
            _constraints: &SearchConstraints,
        ) -> std::result::Result<Vec<Offer>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                sleep(d).await;
            }
            let next = self
                .script
                .lock()
                .unwrap()
                .get_mut(&return_date)
                .and_then(|q| q.pop_front());
            next.unwrap_or_else(|| Ok(vec![offer("IB", 1500.0)]))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<AlertRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, alert: &AlertRecord) -> std::result::Result<(), NotifyError> {
            self.alerts.lock().unwrap().push(alert.clone());
            if self.fail {
                return Err(NotifyError::Transport("smtp down".to_string()));
            }
            Ok(())
        }
    }

    fn offer(airline: &str, amount: f64) -> Offer {
        Offer {
            provider: "scripted".to_string(),
            airline: airline.to_string(),
            price: Price { amount, currency: "EUR".to_string() },
            segments: Vec::new(),
            preferred_stop_matched: true,
            purchase_links: Vec::new(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    fn registry() -> Arc<WindowRegistry> {
        let target = |ret: u32| WindowTarget {
            origin: "AGP".to_string(),
            destination: "UIO".to_string(),
            outbound_date: day(1),
            return_date: day(ret),
            preferred_stopover: Some("MAD".to_string()),
            max_stopover_minutes: 300,
        };
        Arc::new(WindowRegistry::new(vec![target(20), target(21), target(19)]).unwrap())
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            interval: Duration::from_secs(3600),
            search_timeout: Duration::from_secs(5),
            max_retries: 2,
            spacing: Duration::ZERO,
            backoff: vec![Duration::ZERO],
            price_threshold: 1000.0,
        }
    }

    struct Harness {
        engine: Arc<MonitorEngine>,
        store: Arc<WindowStore>,
        registry: Arc<WindowRegistry>,
        health: Arc<HealthState>,
    }

    fn harness(
        provider: Arc<dyn Provider>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Harness {
        let registry = registry();
        let store = WindowStore::new(&registry);
        let health = Arc::new(HealthState::new());
        let engine = MonitorEngine::new(
            registry.clone(),
            store.clone(),
            provider,
            notifier,
            health.clone(),
            Arc::new(LatencyStats::new()),
            settings,
        );
        Harness { engine, store, registry, health }
    }

    #[tokio::test]
    async fn one_failing_window_does_not_stop_the_sweep() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(day(21), Err(ProviderError::Upstream { status: 400, message: "bad".into() }));
        let h = harness(provider, Arc::new(RecordingNotifier::default()), settings());

        let summary = h.engine.sweep(&CancellationToken::new()).await;
        assert_eq!(summary.checked, 3);
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.errors, 1);

        let all = h.store.get_all();
        assert_eq!(all[0].1.status, WindowStatus::Ok);
        assert_eq!(all[1].1.status, WindowStatus::Error);
        assert!(all[1].1.last_error.as_deref().unwrap().contains("400"));
        assert!(all[1].1.best_price.is_none());
        assert_eq!(all[2].1.status, WindowStatus::Ok);
        assert_eq!(h.health.sweeps_completed(), 1);
    }

    #[tokio::test]
    async fn ok_observation_takes_minimum_price() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(day(20), Ok(vec![offer("KL", 1100.0), offer("IB", 980.0), offer("UX", 1010.0)]));
        provider.push(day(19), Ok(Vec::new()));
        let h = harness(provider, Arc::new(RecordingNotifier::default()), settings());
        h.engine.sweep(&CancellationToken::new()).await;

        let all = h.store.get_all();
        let ok = &all[0].1;
        assert_eq!(ok.status, WindowStatus::Ok);
        assert_eq!(ok.best_price.as_ref().unwrap().amount, 980.0);
        assert_eq!(ok.offers.len(), 3);

        let empty = &all[2].1;
        assert_eq!(empty.status, WindowStatus::NoResults);
        assert!(empty.best_price.is_none());
    }

    #[tokio::test]
    async fn rate_limit_keeps_previous_prices() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(day(20), Ok(vec![offer("IB", 900.0)]));
        provider.push(
            day(20),
            Err(ProviderError::RateLimited { retry_after: Some(Duration::from_secs(30)) }),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness(provider.clone(), notifier.clone(), settings());
        let id = h.registry.targets()[0].id();

        let first = h.engine.run_once(&id).await.unwrap();
        let second = h.engine.run_once(&id).await.unwrap();

        assert_eq!(second.status, WindowStatus::RateLimited);
        assert_eq!(second.best_price, first.best_price);
        assert_eq!(second.offers, first.offers);
        assert_eq!(second.last_alerted_price, None);
        assert!(second.last_checked_at >= first.last_checked_at);
        assert!(second.last_error.as_deref().unwrap().contains("rate limited"));
        // Rate limits are never retried within a check.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_rearms_alert_for_the_same_price() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(day(20), Ok(vec![offer("IB", 900.0)]));
        provider.push(day(20), Err(ProviderError::RateLimited { retry_after: None }));
        provider.push(day(20), Ok(vec![offer("IB", 900.0)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness(provider, notifier.clone(), settings());
        let id = h.registry.targets()[0].id();

        for _ in 0..3 {
            h.engine.run_once(&id).await.unwrap();
        }

        let fired: Vec<f64> = notifier.alerts.lock().unwrap().iter().map(|a| a.price.amount).collect();
        assert_eq!(fired, vec![900.0, 900.0]);
        assert_eq!(h.store.get(&id).unwrap().last_alerted_price, Some(900.0));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(day(20), Err(ProviderError::Network("reset".into())));
        provider.push(day(20), Err(ProviderError::Upstream { status: 503, message: "busy".into() }));
        provider.push(day(20), Ok(vec![offer("IB", 1200.0)]));
        let h = harness(provider.clone(), Arc::new(RecordingNotifier::default()), settings());

        let obs = h.engine.run_once(&h.registry.targets()[0].id()).await.unwrap();
        assert_eq!(obs.status, WindowStatus::Ok);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_the_limit() {
        let provider = Arc::new(ScriptedProvider::default());
        for _ in 0..5 {
            provider.push(day(20), Err(ProviderError::Network("reset".into())));
        }
        let h = harness(provider.clone(), Arc::new(RecordingNotifier::default()), settings());

        let obs = h.engine.run_once(&h.registry.targets()[0].id()).await.unwrap();
        assert_eq!(obs.status, WindowStatus::Error);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_provider_times_out_as_error() {
        let provider = Arc::new(ScriptedProvider {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let mut s = settings();
        s.search_timeout = Duration::from_millis(20);
        s.max_retries = 0;
        let h = harness(provider, Arc::new(RecordingNotifier::default()), s);

        let obs = h.engine.run_once(&h.registry.targets()[0].id()).await.unwrap();
        assert_eq!(obs.status, WindowStatus::Error);
        assert!(obs.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn alerts_follow_dedup_and_survive_notifier_failure() {
        let provider = Arc::new(ScriptedProvider::default());
        for price in [1200.0, 950.0, 950.0, 900.0, 1100.0, 850.0] {
            provider.push(day(20), Ok(vec![offer("IB", price)]));
        }
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        let h = harness(provider, notifier.clone(), settings());
        let id = h.registry.targets()[0].id();

        for _ in 0..6 {
            let obs = h.engine.run_once(&id).await.unwrap();
            assert_eq!(obs.status, WindowStatus::Ok);
        }

        let fired: Vec<f64> = notifier.alerts.lock().unwrap().iter().map(|a| a.price.amount).collect();
        assert_eq!(fired, vec![950.0, 900.0, 850.0]);
        assert_eq!(h.health.alerts_fired(), 3);
        assert_eq!(h.health.notify_failures(), 3);
        assert_eq!(h.store.get(&id).unwrap().last_alerted_price, Some(850.0));
    }

    #[tokio::test]
    async fn run_once_rejects_unknown_window() {
        let h = harness(
            Arc::new(ScriptedProvider::default()),
            Arc::new(RecordingNotifier::default()),
            settings(),
        );
        let unknown: WindowId = "AGP-UIO:2026-08-01:2026-08-20".parse().unwrap();
        assert!(matches!(
            h.engine.run_once(&unknown).await,
            Err(AppError::WindowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_sweep_checks_nothing() {
        let provider = Arc::new(ScriptedProvider::default());
        let h = harness(provider.clone(), Arc::new(RecordingNotifier::default()), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = h.engine.sweep(&cancel).await;
        assert!(summary.cancelled);
        assert_eq!(summary.checked, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_during_backoff_stops_retrying() {
        let provider = Arc::new(ScriptedProvider {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        for ret in [20, 21, 19] {
            for _ in 0..5 {
                provider.push(day(ret), Err(ProviderError::Network("reset".into())));
            }
        }
        let mut s = settings();
        s.backoff = vec![Duration::from_millis(500), Duration::from_secs(2)];
        let h = harness(provider.clone(), Arc::new(RecordingNotifier::default()), s);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let summary = h.engine.sweep(&cancel).await;

        // The in-flight call finishes and is recorded; nothing new starts.
        assert!(started.elapsed() < Duration::from_millis(450), "took {:?}", started.elapsed());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(summary.cancelled);
        assert_eq!(summary.checked, 1);
        assert_eq!(h.store.get_all()[0].1.status, WindowStatus::Error);
    }

    #[tokio::test]
    async fn run_sweeps_immediately_and_stops_on_cancel() {
        let provider = Arc::new(ScriptedProvider::default());
        let h = harness(provider.clone(), Arc::new(RecordingNotifier::default()), settings());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.engine.clone().run(cancel.clone()));

        for _ in 0..100 {
            if h.health.sweeps_completed() >= 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(h.health.sweeps_completed(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn snapshots_during_sweep_keep_price_and_dedup_together() {
        let registry = registry();
        let store = WindowStore::new(&registry);
        let engine = MonitorEngine::new(
            registry.clone(),
            store.clone(),
            Arc::new(SyntheticProvider::new(700.0, 0.0)),
            Arc::new(RecordingNotifier::default()),
            Arc::new(HealthState::new()),
            Arc::new(LatencyStats::new()),
            settings(),
        );

        let reader_store = store.clone();
        let reader = tokio::spawn(async move {
            for _ in 0..200 {
                for (_, obs) in reader_store.get_all() {
                    if obs.status == WindowStatus::Ok {
                        let best = obs.best_price.as_ref().map(|p| p.amount);
                        assert!(!obs.offers.is_empty());
                        assert_eq!(best, cheapest(&obs.offers).map(|p| p.amount));
                        // Synthetic prices sit under the threshold, so every
                        // OK record written by the engine has alerted at its price.
                        assert_eq!(obs.last_alerted_price, best);
                    }
                }
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..5 {
            engine.sweep(&CancellationToken::new()).await;
        }
        reader.await.unwrap();
    }
}
