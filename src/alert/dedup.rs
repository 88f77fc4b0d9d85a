use crate::types::WindowStatus;

/// Outcome of running one observation through the deduplicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertDecision {
    pub fire: bool,
    /// Value to store as the window's `last_alerted_price`.
    pub last_alerted_price: Option<f64>,
}

/// Alerts on the first price under the threshold and again only on further
/// drops. Flat or rising prices stay quiet even while still under the
/// threshold. Going back to or above the threshold, or any status other than
/// OK (rate limits included), re-arms the window so the next breach is
/// treated as fresh.
#[derive(Debug, Clone, Copy)]
pub struct AlertDeduplicator {
    threshold: f64,
}

impl AlertDeduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `previous_alerted` is the stored `last_alerted_price`; `status` and
    /// `best_price` describe the new observation.
    pub fn decide(
        &self,
        previous_alerted: Option<f64>,
        status: WindowStatus,
        best_price: Option<f64>,
    ) -> AlertDecision {
        match (status, best_price) {
            (WindowStatus::Ok, Some(price)) if price < self.threshold => {
                let further_drop = previous_alerted.map_or(true, |last| price < last);
                AlertDecision {
                    fire: further_drop,
                    last_alerted_price: if further_drop { Some(price) } else { previous_alerted },
                }
            }
            _ => AlertDecision {
                fire: false,
                last_alerted_price: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(dedup: &AlertDeduplicator, prices: &[f64]) -> Vec<bool> {
        let mut last = None;
        prices
            .iter()
            .map(|&p| {
                let d = dedup.decide(last, WindowStatus::Ok, Some(p));
                last = d.last_alerted_price;
                d.fire
            })
            .collect()
    }

    #[test]
    fn fires_on_breach_and_further_drops_only() {
        let dedup = AlertDeduplicator::new(1000.0);
        let fired = run(&dedup, &[1200.0, 950.0, 950.0, 900.0, 1100.0, 850.0]);
        assert_eq!(fired, vec![false, true, false, true, false, true]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let dedup = AlertDeduplicator::new(1000.0);
        let d = dedup.decide(None, WindowStatus::Ok, Some(1000.0));
        assert!(!d.fire);
        assert_eq!(d.last_alerted_price, None);
    }

    #[test]
    fn rising_price_under_threshold_stays_quiet() {
        let dedup = AlertDeduplicator::new(1000.0);
        let fired = run(&dedup, &[900.0, 950.0, 920.0, 899.99]);
        assert_eq!(fired, vec![true, false, false, true]);
    }

    #[test]
    fn price_at_threshold_resets() {
        let dedup = AlertDeduplicator::new(1000.0);
        let fired = run(&dedup, &[900.0, 1000.0, 900.0]);
        assert_eq!(fired, vec![true, false, true]);
    }

    #[test]
    fn leaving_ok_status_resets() {
        let dedup = AlertDeduplicator::new(1000.0);
        for status in [WindowStatus::Error, WindowStatus::NoResults] {
            let d = dedup.decide(Some(900.0), status, None);
            assert!(!d.fire);
            assert_eq!(d.last_alerted_price, None);
        }
        let d = dedup.decide(None, WindowStatus::Ok, Some(900.0));
        assert!(d.fire);
    }

    #[test]
    fn rate_limited_rearms_even_with_carried_price() {
        let dedup = AlertDeduplicator::new(1000.0);
        let d = dedup.decide(Some(900.0), WindowStatus::RateLimited, Some(900.0));
        assert!(!d.fire);
        assert_eq!(d.last_alerted_price, None);

        let d = dedup.decide(d.last_alerted_price, WindowStatus::Ok, Some(900.0));
        assert!(d.fire);
        assert_eq!(d.last_alerted_price, Some(900.0));
    }
}
