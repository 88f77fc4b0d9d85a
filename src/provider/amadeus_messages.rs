use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{FlightSegment, Offer, Price, PurchaseLink, SearchConstraints};

static MALFORMED_OFFERS: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// OAuth2 token endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

// ---------------------------------------------------------------------------
// Flight Offers Search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawOffersResponse {
    /// Kept as raw values so one malformed offer doesn't sink the whole page.
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOffer {
    price: RawPrice,
    #[serde(default)]
    itineraries: Vec<RawItinerary>,
    #[serde(default)]
    validating_airline_codes: Vec<String>,
}

/// Amounts arrive as decimal strings. `grand_total` includes every fee;
/// `total` may leave some out.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    currency: String,
    total: Option<String>,
    grand_total: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItinerary {
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSegment {
    departure: RawEndpoint,
    arrival: RawEndpoint,
    carrier_code: Option<String>,
    operating: Option<RawOperating>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    iata_code: String,
    at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperating {
    carrier_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawErrorResponse {
    #[serde(default)]
    errors: Vec<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    title: Option<String>,
    detail: Option<String>,
}

/// Short human-readable message from an error body, falling back to the
/// first 200 bytes of whatever came back.
pub fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<RawErrorResponse>(body) {
        if let Some(first) = parsed.errors.first() {
            let text = match (&first.title, &first.detail) {
                (Some(t), Some(d)) => format!("{t}: {d}"),
                (Some(t), None) => t.clone(),
                (None, Some(d)) => d.clone(),
                (None, None) => String::new(),
            };
            if !text.is_empty() {
                return text;
            }
        }
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Offer conversion
// ---------------------------------------------------------------------------

/// The window an offers page was requested for. Purchase links and stop
/// matching are derived from it.
pub struct SearchContext<'a> {
    pub origin: &'a str,
    pub destination: &'a str,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub constraints: &'a SearchConstraints,
}

/// Parse a Flight Offers Search body into offers, unranked.
///
/// Offers that fail to parse are skipped and counted. Offers with a layover
/// longer than the constraint allows are dropped. Preferred-stop mismatches are
/// kept and only flagged.
pub fn parse_offers(body: &str, ctx: &SearchContext<'_>) -> Result<Vec<Offer>, serde_json::Error> {
    let resp: RawOffersResponse = serde_json::from_str(body)?;
    let links = PurchaseLink::for_route(ctx.origin, ctx.destination, ctx.outbound_date, ctx.return_date);

    let mut offers = Vec::with_capacity(resp.data.len());
    let mut over_layover = 0usize;

    for value in resp.data {
        let raw: RawOffer = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                let n = MALFORMED_OFFERS.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Skipping malformed offer: {e} (total skipped: {n})");
                continue;
            }
        };

        let Some(offer) = convert_offer(raw, ctx, &links) else {
            let n = MALFORMED_OFFERS.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Skipping offer with unusable price or times (total skipped: {n})");
            continue;
        };

        if exceeds_layover(&offer.segments, ctx.constraints.max_stopover_minutes) {
            over_layover += 1;
            continue;
        }
        offers.push(offer);
    }

    if over_layover > 0 {
        debug!(
            dropped = over_layover,
            max_stopover_minutes = ctx.constraints.max_stopover_minutes,
            "Dropped {over_layover} offers with layovers over the limit",
        );
    }

    Ok(offers)
}

fn convert_offer(raw: RawOffer, ctx: &SearchContext<'_>, links: &[PurchaseLink]) -> Option<Offer> {
    let amount = select_amount(&raw.price)?;

    let mut segments = Vec::new();
    let mut preferred_stop_matched = ctx.constraints.preferred_stopover.is_none();

    for itinerary in &raw.itineraries {
        let count = itinerary.segments.len();
        for (idx, seg) in itinerary.segments.iter().enumerate() {
            let departure_at = parse_at(&seg.departure.at)?;
            let arrival_at = parse_at(&seg.arrival.at)?;
            let layover_minutes = match itinerary.segments.get(idx + 1) {
                Some(next) => {
                    let next_departure = parse_at(&next.departure.at)?;
                    Some((next_departure - arrival_at).num_minutes().max(0))
                }
                None => None,
            };

            if idx + 1 < count {
                if let Some(stop) = &ctx.constraints.preferred_stopover {
                    if seg.arrival.iata_code.eq_ignore_ascii_case(stop) {
                        preferred_stop_matched = true;
                    }
                }
            }

            let carrier = seg
                .carrier_code
                .clone()
                .or_else(|| seg.operating.as_ref().and_then(|o| o.carrier_code.clone()))
                .unwrap_or_default();

            segments.push(FlightSegment {
                departure_airport: seg.departure.iata_code.clone(),
                arrival_airport: seg.arrival.iata_code.clone(),
                departure_at,
                arrival_at,
                carrier,
                layover_minutes,
            });
        }
    }

    if segments.is_empty() {
        return None;
    }

    let airline = segments
        .iter()
        .map(|s| s.carrier.as_str())
        .find(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| raw.validating_airline_codes.first().cloned())
        .unwrap_or_else(|| "unknown".to_string());

    Some(Offer {
        provider: "amadeus".to_string(),
        airline,
        price: Price {
            amount,
            currency: raw.price.currency,
        },
        segments,
        preferred_stop_matched,
        purchase_links: links.to_vec(),
    })
}

/// `grandTotal` when present and parseable, `total` otherwise.
fn select_amount(price: &RawPrice) -> Option<f64> {
    let parse = |s: &Option<String>| {
        s.as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    parse(&price.grand_total).or_else(|| parse(&price.total))
}

fn parse_at(s: &str) -> Option<NaiveDateTime> {
    s.parse::<NaiveDateTime>().ok()
}

fn exceeds_layover(segments: &[FlightSegment], max_minutes: u32) -> bool {
    if max_minutes == 0 {
        return false;
    }
    segments
        .iter()
        .filter_map(|s| s.layover_minutes)
        .any(|m| m > i64::from(max_minutes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
