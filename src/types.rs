use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Window identity and targets
// ---------------------------------------------------------------------------

/// Identity of one monitored window: route plus outbound/return dates.
/// Rendered as `AGP-UIO:2026-07-01:2026-07-20` in logs and URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId {
    pub origin: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}:{}:{}",
            self.origin, self.destination, self.outbound_date, self.return_date
        )
    }
}

impl FromStr for WindowId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AppError::InvalidRequest(format!("malformed window id '{s}'"));

        let mut parts = s.splitn(3, ':');
        let route = parts.next().ok_or_else(bad)?;
        let outbound = parts.next().ok_or_else(bad)?;
        let ret = parts.next().ok_or_else(bad)?;

        let (origin, destination) = route.split_once('-').ok_or_else(bad)?;
        Ok(Self {
            origin: origin.to_ascii_uppercase(),
            destination: destination.to_ascii_uppercase(),
            outbound_date: outbound.parse().map_err(|_| bad())?,
            return_date: ret.parse().map_err(|_| bad())?,
        })
    }
}

/// One configured window to monitor. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowTarget {
    pub origin: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub preferred_stopover: Option<String>,
    pub max_stopover_minutes: u32,
}

impl WindowTarget {
    pub fn id(&self) -> WindowId {
        WindowId {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            outbound_date: self.outbound_date,
            return_date: self.return_date,
        }
    }

    pub fn constraints(&self) -> SearchConstraints {
        SearchConstraints {
            preferred_stopover: self.preferred_stopover.clone(),
            max_stopover_minutes: self.max_stopover_minutes,
        }
    }
}

/// Per-search constraints handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchConstraints {
    pub preferred_stopover: Option<String>,
    pub max_stopover_minutes: u32,
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSegment {
    pub departure_airport: String,
    pub arrival_airport: String,
    pub departure_at: NaiveDateTime,
    pub arrival_at: NaiveDateTime,
    pub carrier: String,
    /// Ground time before the next segment of the same itinerary.
    pub layover_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLink {
    pub name: String,
    pub url: String,
}

impl PurchaseLink {
    /// Deep links for a route and date pair. Derived locally, never taken from upstream.
    pub fn for_route(
        origin: &str,
        destination: &str,
        outbound: NaiveDate,
        ret: NaiveDate,
    ) -> Vec<PurchaseLink> {
        let dep = outbound.format("%Y%m%d");
        let back = ret.format("%Y%m%d");
        vec![
            PurchaseLink {
                name: "Google Flights".to_string(),
                url: format!(
                    "https://www.google.com/travel/flights?q=Flights%20from%20{origin}%20to%20{destination}%20on%20{outbound}%20return%20{ret}"
                ),
            },
            PurchaseLink {
                name: "Skyscanner".to_string(),
                url: format!(
                    "https://www.skyscanner.es/transporte/vuelos/{origin}/{destination}/{dep}/{back}/"
                ),
            },
            PurchaseLink {
                name: "Kayak".to_string(),
                url: format!(
                    "https://www.kayak.es/flights/{origin}-{destination}/{outbound}/{ret}?fs=stops=0,1"
                ),
            },
        ]
    }
}

/// One bookable itinerary. Immutable once constructed by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub provider: String,
    pub airline: String,
    pub price: Price,
    pub segments: Vec<FlightSegment>,
    pub preferred_stop_matched: bool,
    pub purchase_links: Vec<PurchaseLink>,
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    Unchecked,
    Ok,
    NoResults,
    Error,
    RateLimited,
}

impl std::fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WindowStatus::Unchecked => "UNCHECKED",
            WindowStatus::Ok => "OK",
            WindowStatus::NoResults => "NO_RESULTS",
            WindowStatus::Error => "ERROR",
            WindowStatus::RateLimited => "RATE_LIMITED",
        };
        write!(f, "{s}")
    }
}

/// Latest recorded search outcome for one window.
///
/// `best_price` is set only for `Ok` observations with offers, except that a
/// `RateLimited` observation carries the previous price and offers forward
/// untouched while clearing `last_alerted_price`. `last_alerted_price` travels in the same record so a reader never
/// sees a price without its matching dedup state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub status: WindowStatus,
    pub best_price: Option<Price>,
    pub offers: Vec<Offer>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_alerted_price: Option<f64>,
}

impl Observation {
    pub fn unchecked() -> Self {
        Self {
            status: WindowStatus::Unchecked,
            best_price: None,
            offers: Vec::new(),
            last_checked_at: None,
            last_error: None,
            last_alerted_price: None,
        }
    }
}

impl Default for Observation {
    fn default() -> Self {
        Self::unchecked()
    }
}

/// Transient record handed to a notifier when the deduplicator fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub window: WindowId,
    pub price: Price,
    pub threshold: f64,
    pub airline: Option<String>,
    pub at: DateTime<Utc>,
}

/// Cheapest total price among `offers`. `None` when empty.
pub fn cheapest(offers: &[Offer]) -> Option<Price> {
    offers
        .iter()
        .map(|o| &o.price)
        .min_by(|a, b| a.amount.total_cmp(&b.amount))
        .cloned()
}
