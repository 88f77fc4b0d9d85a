//! Flight-offer search capability.
//!
//! The engine only ever talks to `dyn Provider`. Which implementation sits
//! behind it is decided once at startup by [`build_provider`].

pub mod amadeus;
pub mod amadeus_messages;
pub mod synthetic;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::{Offer, SearchConstraints};

pub use amadeus::AmadeusProvider;
pub use synthetic::SyntheticProvider;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("upstream rejected credentials")]
    Unauthenticated,

    #[error("rate limited by upstream{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl ProviderError {
    /// Failures worth another attempt inside the same window check.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) => true,
            ProviderError::Upstream { status, .. } => *status >= 500,
            ProviderError::Unauthenticated | ProviderError::RateLimited { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ProviderError::Upstream {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => ProviderError::Network(e.to_string()),
        }
    }
}

/// One round-trip search against some backing source.
///
/// Implementations return offers ranked most relevant first and must not
/// touch engine state.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        origin: &str,
        destination: &str,
        outbound_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &SearchConstraints,
    ) -> std::result::Result<Vec<Offer>, ProviderError>;
}

/// Picks the provider for the process lifetime: Amadeus when both credentials
/// are configured, the synthetic generator otherwise.
pub fn build_provider(cfg: &Config) -> Result<Arc<dyn Provider>> {
    if cfg.amadeus_configured() {
        info!("Using Amadeus provider at {}", cfg.amadeus_api_url);
        Ok(Arc::new(AmadeusProvider::new(cfg)?))
    } else {
        warn!("AMADEUS_CLIENT_ID / AMADEUS_CLIENT_SECRET not set, using synthetic offers");
        Ok(Arc::new(SyntheticProvider::default().with_currency(&cfg.currency)))
    }
}

/// Orders offers for display: preferred-stop matches first, then cheapest,
/// then airline code so equal prices keep a stable order.
///
/// Never drops offers. If nothing matches the preferred stop the cheapest
/// itinerary simply comes first.
pub fn rank_offers(offers: &mut [Offer]) {
    offers.sort_by(|a, b| {
        b.preferred_stop_matched
            .cmp(&a.preferred_stop_matched)
            .then_with(|| a.price.amount.total_cmp(&b.price.amount))
            .then_with(|| a.airline.cmp(&b.airline))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Price;

    fn offer(airline: &str, amount: f64, matched: bool) -> Offer {
        Offer {
            provider: "test".to_string(),
            airline: airline.to_string(),
            price: Price { amount, currency: "EUR".to_string() },
            segments: Vec::new(),
            preferred_stop_matched: matched,
            purchase_links: Vec::new(),
        }
    }

    #[test]
    fn preferred_stop_ranks_first() {
        let mut offers = vec![offer("KL", 700.0, false), offer("IB", 900.0, true), offer("LH", 650.0, false)];
        rank_offers(&mut offers);
        let order: Vec<_> = offers.iter().map(|o| o.airline.as_str()).collect();
        assert_eq!(order, vec!["IB", "LH", "KL"]);
    }

    #[test]
    fn no_preferred_match_falls_back_to_cheapest() {
        let mut offers = vec![offer("KL", 700.0, false), offer("LH", 650.0, false)];
        rank_offers(&mut offers);
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].airline, "LH");
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Network("reset".to_string()).is_transient());
        assert!(ProviderError::Upstream { status: 503, message: String::new() }.is_transient());
        assert!(!ProviderError::Upstream { status: 400, message: String::new() }.is_transient());
        assert!(!ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(!ProviderError::Unauthenticated.is_transient());
    }

    #[test]
    fn rate_limited_message_includes_retry_after() {
        let e = ProviderError::RateLimited { retry_after: Some(Duration::from_secs(30)) };
        assert_eq!(e.to_string(), "rate limited by upstream (retry after 30s)");
        let e = ProviderError::RateLimited { retry_after: None };
        assert_eq!(e.to_string(), "rate limited by upstream");
    }

    #[test]
    fn missing_credentials_select_synthetic() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        let provider = build_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "synthetic");
    }
}
