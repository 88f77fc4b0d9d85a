use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tracing::warn;

use crate::types::AlertRecord;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivers price alerts. Delivery is best effort; the engine only logs failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Writes each alert to the log, naming the configured recipients.
pub struct LogNotifier {
    recipients: Vec<String>,
}

impl LogNotifier {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        let recipients = if self.recipients.is_empty() {
            "(no recipients configured)".to_string()
        } else {
            self.recipients.join(", ")
        };
        warn!(
            event = "PRICE_ALERT",
            window = %alert.window,
            price = alert.price.amount,
            currency = %alert.price.currency,
            threshold = alert.threshold,
            "PRICE ALERT | {} -> {} {} to {} | {} (threshold {:.2}) | airline: {} | recipients: {}",
            alert.window.origin,
            alert.window.destination,
            alert.window.outbound_date,
            alert.window.return_date,
            alert.price,
            alert.threshold,
            alert.airline.as_deref().unwrap_or("n/a"),
            recipients,
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// POSTs the alert as JSON to a configured URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("webhook answered {status}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FanoutNotifier
// ---------------------------------------------------------------------------

/// Sends to every inner notifier concurrently. Fails if any of them failed,
/// after all have been attempted.
pub struct FanoutNotifier {
    inner: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(inner: Vec<Arc<dyn Notifier>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        let results = join_all(self.inner.iter().map(|n| n.notify(alert))).await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Transport(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Price, WindowId};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Counting {
        async fn notify(&self, _alert: &AlertRecord) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Rejected("nope".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn alert() -> AlertRecord {
        AlertRecord {
            window: "AGP-UIO:2026-07-01:2026-07-20".parse::<WindowId>().unwrap(),
            price: Price { amount: 899.0, currency: "EUR".to_string() },
            threshold: 1000.0,
            airline: Some("IB".to_string()),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let n = LogNotifier::new(vec!["ops@example.com".to_string()]);
        assert!(n.notify(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn fanout_attempts_all_and_reports_failure() {
        let ok = Arc::new(Counting { calls: AtomicUsize::new(0), fail: false });
        let bad = Arc::new(Counting { calls: AtomicUsize::new(0), fail: true });
        let fanout = FanoutNotifier::new(vec![bad.clone(), ok.clone()]);

        let result = fanout.notify(&alert()).await;
        assert!(result.is_err());
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn webhook_to_closed_port_is_transport_error() {
        let n = WebhookNotifier::new("http://127.0.0.1:9/alerts".to_string()).unwrap();
        assert!(matches!(n.notify(&alert()).await, Err(NotifyError::Transport(_))));
    }
}
