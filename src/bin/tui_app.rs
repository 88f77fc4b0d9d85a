use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PriceView {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct OfferView {
    pub airline: String,
    pub price: PriceView,
    pub preferred_stop_matched: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct TargetView {
    pub origin: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub preferred_stopover: Option<String>,
    pub max_stopover_minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ObservationView {
    pub status: String,
    pub best_price: Option<PriceView>,
    pub offers: Vec<OfferView>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_alerted_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowView {
    pub id: String,
    pub target: TargetView,
    pub observation: ObservationView,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct HealthResponse {
    pub provider: Option<String>,
    pub check_interval_minutes: Option<u64>,
    pub price_threshold: Option<f64>,
    pub currency: Option<String>,
    pub sweep_running: Option<bool>,
    pub sweeps_completed: Option<u64>,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub alerts_fired: Option<u64>,
    pub notify_failures: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub windows: Vec<WindowView>,
    pub health: HealthResponse,
    pub latency: LatencyResponse,
    /// Result line of the last manual check, shown in the footer.
    pub last_action: Option<String>,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            windows: Vec::new(),
            health: HealthResponse::default(),
            latency: LatencyResponse::default(),
            last_action: None,
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    pub fn cheapest_window(&self) -> Option<&WindowView> {
        self.windows
            .iter()
            .filter(|w| w.observation.best_price.is_some())
            .min_by(|a, b| {
                let pa = a.observation.best_price.as_ref().map_or(f64::MAX, |p| p.amount);
                let pb = b.observation.best_price.as_ref().map_or(f64::MAX, |p| p.amount);
                pa.total_cmp(&pb)
            })
    }

    /// Ask the server to check one window now, then refresh.
    pub async fn check_window(&mut self, client: &reqwest::Client, id: &str) {
        let url = format!("{}/windows/{}/check", self.base_url, id);
        self.last_action = Some(match client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<WindowView>().await {
                Ok(w) => format!(
                    "{}: {} {}",
                    w.id,
                    w.observation.status,
                    format_price(w.observation.best_price.as_ref())
                ),
                Err(e) => format!("{id}: parse error: {e}"),
            },
            Ok(resp) => format!("{id}: HTTP {}", resp.status()),
            Err(e) => format!("{id}: {e}"),
        });
        self.refresh(client).await;
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let windows_url = format!("{}/windows", self.base_url);
        let health_url = format!("{}/health", self.base_url);
        let latency_url = format!("{}/stats/latency", self.base_url);

        let (windows_res, health_res, latency_res) = tokio::join!(
            client.get(&windows_url).send(),
            client.get(&health_url).send(),
            client.get(&latency_url).send(),
        );

        let windows_resp = match windows_res {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        match windows_resp.json::<Vec<WindowView>>().await {
            Ok(w) => {
                self.windows = w;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();

                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }
                if let Ok(l) = latency_res {
                    if let Ok(latency) = l.json::<LatencyResponse>().await {
                        self.latency = latency;
                    }
                }
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_price(price: Option<&PriceView>) -> String {
    match price {
        Some(p) => format!("{:.2} {}", p.amount, p.currency),
        None => "—".to_string(),
    }
}

/// "07-01 → 07-20 (19d)"
pub fn format_dates(outbound: NaiveDate, ret: NaiveDate) -> String {
    format!(
        "{} → {} ({}d)",
        outbound.format("%m-%d"),
        ret.format("%m-%d"),
        (ret - outbound).num_days()
    )
}

pub fn format_checked_at(at: Option<DateTime<Utc>>) -> String {
    at.map_or("—".to_string(), |t| t.format("%H:%M:%S").to_string())
}

pub fn format_latency(ms: Option<f64>) -> String {
    match ms {
        Some(d) if d >= 1000.0 => format!("{:.1}s", d / 1000.0),
        Some(d) => format!("{:.0}ms", d),
        None => "—".to_string(),
    }
}

/// Short status label for the table's status column.
pub fn format_status(status: &str) -> &'static str {
    match status {
        "OK" => "ok",
        "NO_RESULTS" => "empty",
        "ERROR" => "error",
        "RATE_LIMITED" => "limited",
        "UNCHECKED" => "pending",
        _ => "?",
    }
}

/// True when the price is under the alert threshold.
pub fn below_threshold(price: Option<&PriceView>, threshold: Option<f64>) -> bool {
    matches!((price, threshold), (Some(p), Some(t)) if p.amount < t)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[allow(dead_code)]
fn main() {
    // Shared helpers for src/bin/tui.rs; the real entry point lives there.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur(amount: f64) -> PriceView {
        PriceView { amount, currency: "EUR".to_string() }
    }

    #[test]
    fn prices_and_dates_format() {
        assert_eq!(format_price(Some(&eur(912.5))), "912.50 EUR");
        assert_eq!(format_price(None), "—");
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day).unwrap();
        assert_eq!(format_dates(d(6, 30), d(7, 19)), "06-30 → 07-19 (19d)");
    }

    #[test]
    fn threshold_check_is_exclusive() {
        assert!(below_threshold(Some(&eur(999.99)), Some(1000.0)));
        assert!(!below_threshold(Some(&eur(1000.0)), Some(1000.0)));
        assert!(!below_threshold(None, Some(1000.0)));
        assert!(!below_threshold(Some(&eur(10.0)), None));
    }

    #[test]
    fn status_labels() {
        assert_eq!(format_status("RATE_LIMITED"), "limited");
        assert_eq!(format_status("UNCHECKED"), "pending");
        assert_eq!(format_status("whatever"), "?");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Málaga-Quito", 6), "Málag…");
    }

    #[test]
    fn window_view_parses_server_shape() {
        let json = r#"{
            "id": "AGP-UIO:2026-07-01:2026-07-20",
            "target": {"origin": "AGP", "destination": "UIO",
                       "outbound_date": "2026-07-01", "return_date": "2026-07-20",
                       "preferred_stopover": "MAD", "max_stopover_minutes": 300},
            "observation": {"status": "OK",
                            "best_price": {"amount": 899.0, "currency": "EUR"},
                            "offers": [{"provider": "synthetic", "airline": "IB",
                                        "price": {"amount": 899.0, "currency": "EUR"},
                                        "segments": [], "preferred_stop_matched": true,
                                        "purchase_links": []}],
                            "last_checked_at": "2026-06-01T10:00:00Z",
                            "last_error": null, "last_alerted_price": 899.0}
        }"#;
        let w: WindowView = serde_json::from_str(json).unwrap();
        assert_eq!(w.observation.offers[0].airline, "IB");
        assert_eq!(format_checked_at(w.observation.last_checked_at), "10:00:00");
    }
}
