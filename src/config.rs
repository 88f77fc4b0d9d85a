use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{AppError, Result};

pub const AMADEUS_API_URL: &str = "https://test.api.amadeus.com";

pub const DEFAULT_ORIGIN: &str = "AGP";
pub const DEFAULT_DESTINATION: &str = "UIO";
pub const DEFAULT_PREFERRED_STOP: &str = "MAD";

/// Outbound/return pairs monitored when TARGET_WINDOWS is not set.
pub const DEFAULT_TARGET_WINDOWS: &str = "2026-07-01:2026-07-20,2026-07-01:2026-07-21,\
2026-07-01:2026-07-19,2026-07-01:2026-07-18,2026-06-30:2026-07-19,\
2026-06-30:2026-07-20,2026-06-30:2026-07-18";

/// Backoff between attempts when a window check hits a transient failure.
/// The last value is reused if more retries are configured than entries.
pub const RETRY_BACKOFF_MS: &[u64] = &[500, 2_000, 5_000];

/// Refresh the upstream access token this long before it actually expires.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub origin: String,
    pub destination: String,
    /// (outbound, return) pairs, in the order they are monitored (TARGET_WINDOWS)
    pub target_windows: Vec<(NaiveDate, NaiveDate)>,
    /// Preferred stopover airport; None when PREFERRED_STOP is empty
    pub preferred_stop: Option<String>,
    pub max_stopover_minutes: u32,
    /// Alerts fire strictly below this amount (PRICE_THRESHOLD)
    pub price_threshold: f64,
    pub currency: String,
    pub check_interval: Duration,
    /// Upper bound for a single provider call (SEARCH_TIMEOUT_SECS)
    pub search_timeout: Duration,
    /// Extra attempts for transient failures within one window check (SEARCH_MAX_RETRIES)
    pub search_max_retries: u32,
    /// Pause between windows inside a sweep (SEARCH_SPACING_MS)
    pub search_spacing: Duration,
    pub amadeus_client_id: String,
    pub amadeus_client_secret: String,
    pub amadeus_api_url: String,
    pub amadeus_max_results: u32,
    pub email_recipients: Vec<String>,
    pub alert_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let check_interval_minutes = var("CHECK_INTERVAL_MINUTES")
            .unwrap_or_else(|| "360".to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Config("CHECK_INTERVAL_MINUTES must be a whole number".to_string()))?;
        if check_interval_minutes == 0 {
            return Err(AppError::Config("CHECK_INTERVAL_MINUTES must be greater than zero".to_string()));
        }
        let check_interval_secs = check_interval_minutes
            .checked_mul(60)
            .ok_or_else(|| AppError::Config("CHECK_INTERVAL_MINUTES is too large".to_string()))?;

        let search_timeout_secs = var("SEARCH_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Config("SEARCH_TIMEOUT_SECS must be a whole number".to_string()))?;
        if search_timeout_secs == 0 {
            return Err(AppError::Config("SEARCH_TIMEOUT_SECS must be greater than zero".to_string()));
        }

        let price_threshold = var("PRICE_THRESHOLD")
            .unwrap_or_else(|| "1000".to_string())
            .parse::<f64>()
            .map_err(|_| AppError::Config("PRICE_THRESHOLD must be a number".to_string()))?;
        if !price_threshold.is_finite() || price_threshold <= 0.0 {
            return Err(AppError::Config("PRICE_THRESHOLD must be a positive amount".to_string()));
        }

        Ok(Self {
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            api_port: var("API_PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            origin: var("ORIGIN")
                .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
                .trim()
                .to_ascii_uppercase(),
            destination: var("DESTINATION")
                .unwrap_or_else(|| DEFAULT_DESTINATION.to_string())
                .trim()
                .to_ascii_uppercase(),
            target_windows: parse_target_windows(
                &var("TARGET_WINDOWS").unwrap_or_else(|| DEFAULT_TARGET_WINDOWS.to_string()),
            )?,
            preferred_stop: Some(
                var("PREFERRED_STOP")
                    .unwrap_or_else(|| DEFAULT_PREFERRED_STOP.to_string())
                    .trim()
                    .to_ascii_uppercase(),
            )
            .filter(|s| !s.is_empty()),
            max_stopover_minutes: var("MAX_STOPOVER_MINUTES")
                .unwrap_or_else(|| "300".to_string())
                .parse::<u32>()
                .map_err(|_| AppError::Config("MAX_STOPOVER_MINUTES must be a whole number".to_string()))?,
            price_threshold,
            currency: var("CURRENCY")
                .unwrap_or_else(|| "EUR".to_string())
                .trim()
                .to_ascii_uppercase(),
            check_interval: Duration::from_secs(check_interval_secs),
            search_timeout: Duration::from_secs(search_timeout_secs),
            search_max_retries: var("SEARCH_MAX_RETRIES")
                .unwrap_or_else(|| "2".to_string())
                .parse::<u32>()
                .map_err(|_| AppError::Config("SEARCH_MAX_RETRIES must be a whole number".to_string()))?,
            search_spacing: Duration::from_millis(
                var("SEARCH_SPACING_MS")
                    .unwrap_or_else(|| "250".to_string())
                    .parse::<u64>()
                    .map_err(|_| AppError::Config("SEARCH_SPACING_MS must be a whole number".to_string()))?,
            ),
            amadeus_client_id: var("AMADEUS_CLIENT_ID").unwrap_or_default(),
            amadeus_client_secret: var("AMADEUS_CLIENT_SECRET").unwrap_or_default(),
            amadeus_api_url: var("AMADEUS_API_URL")
                .unwrap_or_else(|| AMADEUS_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            amadeus_max_results: var("AMADEUS_MAX_RESULTS")
                .unwrap_or_else(|| "10".to_string())
                .parse::<u32>()
                .map_err(|_| AppError::Config("AMADEUS_MAX_RESULTS must be a whole number".to_string()))?,
            email_recipients: var("EMAIL_RECIPIENTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            alert_webhook_url: var("ALERT_WEBHOOK_URL")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    /// Both halves of the credential pair must be present to use the real provider.
    pub fn amadeus_configured(&self) -> bool {
        !self.amadeus_client_id.is_empty() && !self.amadeus_client_secret.is_empty()
    }

    pub fn check_interval_minutes(&self) -> u64 {
        self.check_interval.as_secs() / 60
    }
}

/// Parse `YYYY-MM-DD:YYYY-MM-DD` pairs separated by commas.
fn parse_target_windows(raw: &str) -> Result<Vec<(NaiveDate, NaiveDate)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (outbound, ret) = pair.split_once(':').ok_or_else(|| {
                AppError::Config(format!("TARGET_WINDOWS entry '{pair}' must look like 2026-07-01:2026-07-20"))
            })?;
            let outbound = outbound
                .trim()
                .parse::<NaiveDate>()
                .map_err(|e| AppError::Config(format!("TARGET_WINDOWS outbound date '{outbound}': {e}")))?;
            let ret = ret
                .trim()
                .parse::<NaiveDate>()
                .map_err(|e| AppError::Config(format!("TARGET_WINDOWS return date '{ret}': {e}")))?;
            Ok((outbound, ret))
        })
        .collect()
}
