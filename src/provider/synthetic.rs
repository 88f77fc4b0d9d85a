use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::provider::{rank_offers, Provider, ProviderError};
use crate::types::{FlightSegment, Offer, Price, PurchaseLink, SearchConstraints};

/// Long-haul multiplier applied on top of the base fare.
const DISTANCE_FACTOR: f64 = 1.15;
/// Discount applied to the itinerary routed through the preferred stop.
const PREFERRED_STOP_BONUS: f64 = -35.0;
const PRICE_FLOOR: f64 = 450.0;
const FALLBACK_HUB: &str = "MAD";
const AIRLINES: &[&str] = &["IB", "LA", "UX", "KL", "LH"];
/// Alternative hubs: (airport, carrier, price delta vs. the main itinerary).
const ALT_HUBS: &[(&str, &str, f64)] = &[("AMS", "KL", 62.0), ("BOG", "AV", -18.5)];

/// Deterministic fare generator used when no upstream credentials exist.
///
/// Same window and constraints always yield bit-identical offers, and the
/// search never fails.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    base_price: f64,
    volatility: f64,
    currency: String,
}

impl SyntheticProvider {
    pub fn new(base_price: f64, volatility: f64) -> Self {
        Self {
            base_price,
            volatility,
            currency: "EUR".to_string(),
        }
    }

    /// Quote offers in `currency` so they compare against the configured threshold.
    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    fn price(&self, amount: f64) -> Price {
        Price {
            amount: (amount.max(PRICE_FLOOR) * 100.0).round() / 100.0,
            currency: self.currency.clone(),
        }
    }

    fn generate(
        &self,
        origin: &str,
        destination: &str,
        outbound_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &SearchConstraints,
    ) -> Vec<Offer> {
        let seed: u32 = format!("{outbound_date}{return_date}")
            .bytes()
            .map(u32::from)
            .sum();
        let stay_days = (return_date - outbound_date).num_days();
        let length_factor = 1.0 + (stay_days - 7).max(0) as f64 * 0.01;
        let oscillation = f64::from(seed).sin() * self.volatility;
        let base = self.base_price * DISTANCE_FACTOR * length_factor + oscillation;

        let preferred = constraints.preferred_stopover.as_deref();
        let main_hub = preferred.unwrap_or(FALLBACK_HUB);
        let bonus = if preferred.is_some() { PREFERRED_STOP_BONUS } else { 0.0 };
        let layover = match constraints.max_stopover_minutes {
            0 => 180,
            m => m.min(300),
        };

        let links = PurchaseLink::for_route(origin, destination, outbound_date, return_date);
        let airline = AIRLINES[seed as usize % AIRLINES.len()];

        let mut offers = vec![Offer {
            provider: self.name().to_string(),
            airline: airline.to_string(),
            price: self.price(base + bonus),
            segments: itinerary(origin, destination, main_hub, airline, outbound_date, return_date, layover),
            preferred_stop_matched: true,
            purchase_links: links.clone(),
        }];

        for (i, &(hub, carrier, delta)) in ALT_HUBS.iter().enumerate() {
            if hub == main_hub {
                continue;
            }
            let hub_layover = layover.min(90 + 30 * i as u32);
            offers.push(Offer {
                provider: self.name().to_string(),
                airline: carrier.to_string(),
                price: self.price(base + delta),
                segments: itinerary(origin, destination, hub, carrier, outbound_date, return_date, hub_layover),
                preferred_stop_matched: preferred.map_or(true, |p| p == hub),
                purchase_links: links.clone(),
            });
        }

        rank_offers(&mut offers);
        offers
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new(920.0, 120.0)
    }
}

#[async_trait]
impl Provider for SyntheticProvider {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn search(
        &self,
        origin: &str,
        destination: &str,
        outbound_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &SearchConstraints,
    ) -> Result<Vec<Offer>, ProviderError> {
        Ok(self.generate(origin, destination, outbound_date, return_date, constraints))
    }
}



fn at(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

/// Two legs each way through `hub`.
fn itinerary(
    origin: &str,
    destination: &str,
    hub: &str,
    carrier: &str,
    outbound_date: NaiveDate,
    return_date: NaiveDate,
    layover_minutes: u32,
) -> Vec<FlightSegment> {
    let layover = Duration::minutes(i64::from(layover_minutes));
    let leg = |from: &str, to: &str, dep: NaiveDateTime, minutes: i64, layover_after: Option<i64>| FlightSegment {
        departure_airport: from.to_string(),
        arrival_airport: to.to_string(),
        departure_at: dep,
        arrival_at: dep + Duration::minutes(minutes),
        carrier: carrier.to_string(),
        layover_minutes: layover_after,
    };

    let out_dep = at(outbound_date, 8);
    let out_first = leg(origin, hub, out_dep, 150, Some(i64::from(layover_minutes)));
    let out_second = leg(hub, destination, out_first.arrival_at + layover, 660, None);

    let back_dep = at(return_date, 14);
    let back_first = leg(destination, hub, back_dep, 630, Some(i64::from(layover_minutes)));
    let back_second = leg(hub, origin, back_first.arrival_at + layover, 150, None);

    vec![out_first, out_second, back_first, back_second]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(stop: Option<&str>) -> SearchConstraints {
        SearchConstraints {
            preferred_stopover: stop.map(str::to_string),
            max_stopover_minutes: 300,
        }
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_offers() {
        let provider = SyntheticProvider::default();
        let c = constraints(Some("MAD"));
        let first = provider.search("AGP", "UIO", d(7, 1), d(7, 20), &c).await.unwrap();
        let second = provider.search("AGP", "UIO", d(7, 1), d(7, 20), &c).await.unwrap();
        assert_eq!(first, second);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.price.amount.to_bits(), b.price.amount.to_bits());
        }
    }

    #[tokio::test]
    async fn different_dates_give_different_prices() {
        let provider = SyntheticProvider::default();
        let c = constraints(Some("MAD"));
        let a = provider.search("AGP", "UIO", d(7, 1), d(7, 20), &c).await.unwrap();
        let b = provider.search("AGP", "UIO", d(6, 30), d(7, 18), &c).await.unwrap();
        assert_ne!(a[0].price.amount, b[0].price.amount);
    }

    #[tokio::test]
    async fn preferred_stop_itinerary_ranks_first() {
        let provider = SyntheticProvider::default();
        let offers = provider
            .search("AGP", "UIO", d(7, 1), d(7, 20), &constraints(Some("MAD")))
            .await
            .unwrap();
        assert_eq!(offers.len(), 3);
        assert!(offers[0].preferred_stop_matched);
        assert_eq!(offers[0].segments[0].arrival_airport, "MAD");
        assert!(offers[1..].iter().all(|o| !o.preferred_stop_matched));
    }

    #[tokio::test]
    async fn preferred_stop_equal_to_alt_hub_is_not_duplicated() {
        let provider = SyntheticProvider::default();
        let offers = provider
            .search("AGP", "UIO", d(7, 1), d(7, 20), &constraints(Some("AMS")))
            .await
            .unwrap();
        assert_eq!(offers.len(), 2);
        let ams = offers.iter().filter(|o| o.segments[0].arrival_airport == "AMS").count();
        assert_eq!(ams, 1);
    }

    #[tokio::test]
    async fn layovers_respect_the_constraint_and_prices_the_floor() {
        let provider = SyntheticProvider::new(100.0, 0.0);
        let c = SearchConstraints {
            preferred_stopover: None,
            max_stopover_minutes: 60,
        };
        let offers = provider.search("AGP", "UIO", d(7, 1), d(7, 20), &c).await.unwrap();
        for offer in &offers {
            assert!((offer.price.amount - PRICE_FLOOR).abs() < 1e-9);
            for seg in &offer.segments {
                assert!(seg.layover_minutes.map_or(true, |m| m <= 60));
            }
        }
    }

    #[tokio::test]
    async fn offers_use_the_configured_currency() {
        let provider = SyntheticProvider::default().with_currency("USD");
        let offers = provider
            .search("AGP", "UIO", d(7, 1), d(7, 20), &constraints(Some("MAD")))
            .await
            .unwrap();
        assert!(offers.iter().all(|o| o.price.currency == "USD"));
    }

    #[tokio::test]
    async fn segments_chain_in_time() {
        let provider = SyntheticProvider::default();
        let offers = provider
            .search("AGP", "UIO", d(7, 1), d(7, 20), &constraints(Some("MAD")))
            .await
            .unwrap();
        let segs = &offers[0].segments;
        assert_eq!(segs[0].departure_airport, "AGP");
        assert_eq!(segs[1].arrival_airport, "UIO");
        assert_eq!(segs[3].arrival_airport, "AGP");
        assert_eq!(segs[1].departure_at - segs[0].arrival_at, Duration::minutes(300));
    }
}
