use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, TOKEN_REFRESH_MARGIN_SECS};
use crate::error::Result;
use crate::provider::amadeus_messages::{error_message, parse_offers, SearchContext, TokenResponse};
use crate::provider::{rank_offers, Provider, ProviderError};
use crate::types::{Offer, SearchConstraints};

const TOKEN_PATH: &str = "/v1/security/oauth2/token";
const OFFERS_PATH: &str = "/v2/shopping/flight-offers";

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// Amadeus Self-Service Flight Offers Search.
///
/// Holds an OAuth2 client-credentials token and refreshes it shortly before
/// expiry or after the upstream rejects it.
pub struct AmadeusProvider {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    currency: String,
    max_results: u32,
    token: Mutex<Option<AccessToken>>,
}

impl AmadeusProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.search_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.amadeus_api_url.clone(),
            client_id: cfg.amadeus_client_id.clone(),
            client_secret: cfg.amadeus_client_secret.clone(),
            currency: cfg.currency.clone(),
            max_results: cfg.amadeus_max_results,
            token: Mutex::new(None),
        })
    }

    /// Cached token, fetching a new one when missing or close to expiry.
    async fn access_token(&self) -> std::result::Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .client
            .post(format!("{}{TOKEN_PATH}", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            warn!("Amadeus token request rejected ({status}): {}", error_message(&body));
            return Err(ProviderError::Unauthenticated);
        }
        let resp = check_status(resp).await?;
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Network(format!("token response: {e}")))?;

        let lifetime = token.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        info!(expires_in = token.expires_in, "Amadeus access token refreshed");

        let value = token.access_token;
        *guard = Some(AccessToken {
            value: value.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl Provider for AmadeusProvider {
    fn name(&self) -> &'static str {
        "amadeus"
    }

    async fn search(
        &self,
        origin: &str,
        destination: &str,
        outbound_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &SearchConstraints,
    ) -> std::result::Result<Vec<Offer>, ProviderError> {
        let token = self.access_token().await?;

        let outbound = outbound_date.to_string();
        let ret = return_date.to_string();
        let max = self.max_results.to_string();
        let resp = self
            .client
            .get(format!("{}{OFFERS_PATH}", self.base_url))
            .bearer_auth(&token)
            .query(&[
                ("originLocationCode", origin),
                ("destinationLocationCode", destination),
                ("departureDate", outbound.as_str()),
                ("returnDate", ret.as_str()),
                ("adults", "1"),
                ("currencyCode", self.currency.as_str()),
                ("max", max.as_str()),
            ])
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
            return Err(ProviderError::Unauthenticated);
        }
        let resp = check_status(resp).await?;

        let body = resp.text().await?;
        let ctx = SearchContext {
            origin,
            destination,
            outbound_date,
            return_date,
            constraints,
        };
        let mut offers = parse_offers(&body, &ctx).map_err(|e| ProviderError::Upstream {
            status: StatusCode::OK.as_u16(),
            message: format!("unreadable offers body: {e}"),
        })?;
        rank_offers(&mut offers);

        debug!(
            origin,
            destination,
            outbound = %outbound_date,
            return_date = %return_date,
            offers = offers.len(),
            "Amadeus search returned {} offers",
            offers.len(),
        );
        Ok(offers)
    }
}

/// Maps 429 and other non-2xx responses onto `ProviderError`.
async fn check_status(resp: Response) -> std::result::Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            retry_after: retry_after(&resp),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Upstream {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
