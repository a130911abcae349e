//! HTTP client for the transaction-leg API.

use super::{LegPage, LegSource, LegSourceError, PageRequest, SourceWarnings};
use crate::domain::{
    Address, Asset, Classification, Decimal, Direction, LegFee, Network, TimeMs, TransactionLeg,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Leg source backed by `GET /api/transactions/{address}`.
#[derive(Debug, Clone)]
pub struct HttpLegSource {
    client: Client,
    base_url: String,
}

impl HttpLegSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn query_params(request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
            ("spamFilter", request.spam_filter.to_string()),
        ];
        if !request.networks.is_empty() {
            let networks: Vec<&str> = request.networks.iter().map(Network::as_str).collect();
            params.push(("networks", networks.join(",")));
        }
        if let Some(from) = request.from {
            params.push(("from", from.as_ms().to_string()));
        }
        if let Some(to) = request.to {
            params.push(("to", to.as_ms().to_string()));
        }
        if let Some(min_usd) = request.min_usd {
            params.push(("minUsd", min_usd.to_canonical_string()));
        }
        if let Some(class) = &request.class {
            params.push(("class", class.clone()));
        }
        if let Some(cursor) = &request.cursor {
            params.push(("cursor", cursor.clone()));
        }
        params
    }

    async fn get_json(&self, request: &PageRequest) -> Result<serde_json::Value, LegSourceError> {
        let url = format!(
            "{}/api/transactions/{}",
            self.base_url,
            request.address.as_str()
        );
        let params = Self::query_params(request);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(LegSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(LegSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(LegSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(LegSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(LegSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl LegSource for HttpLegSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<LegPage, LegSourceError> {
        debug!(
            "Fetching legs for address={}, page={}, cursor={:?}, limit={}",
            request.address, request.page, request.cursor, request.limit
        );

        let body = self.get_json(request).await?;
        parse_page(&body, request)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMeta {
    #[serde(default)]
    gas_usd_by_tx: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLeg {
    timestamp: serde_json::Value,
    transaction_hash: String,
    #[serde(default)]
    wallet_address: Option<String>,
    #[serde(default)]
    network: Option<String>,
    direction: Direction,
    #[serde(default)]
    classification: Option<Classification>,
    #[serde(default, alias = "class", alias = "type")]
    class_tag: Option<String>,
    asset: Asset,
    quantity: Decimal,
    #[serde(default)]
    price_usd_at_timestamp: Option<Decimal>,
    #[serde(default)]
    usd_value_at_timestamp: Option<Decimal>,
    #[serde(default)]
    counterparty_address: Option<String>,
    #[serde(default)]
    counterparty_label: Option<String>,
    #[serde(default)]
    fee: Option<LegFee>,
}

/// Parse a response envelope. Individual malformed legs are skipped; a
/// malformed envelope is an error.
fn parse_page(body: &serde_json::Value, request: &PageRequest) -> Result<LegPage, LegSourceError> {
    let rows = body
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LegSourceError::ParseError("Expected data array".to_string()))?;

    let mut legs = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_leg(row, request) {
            Ok(leg) => legs.push(leg),
            Err(e) => warn!("Failed to parse leg for {}: {}", request.address, e),
        }
    }

    let gas_usd_by_tx = match body.get("meta") {
        Some(meta) if !meta.is_null() => serde_json::from_value::<WireMeta>(meta.clone())
            .map(|m| {
                m.gas_usd_by_tx
                    .into_iter()
                    .map(|(hash, usd)| (hash.to_ascii_lowercase(), usd))
                    .collect()
            })
            .map_err(|e| LegSourceError::ParseError(format!("Invalid meta: {}", e)))?,
        _ => HashMap::new(),
    };

    let warnings = match body.get("warnings") {
        Some(w) if w.is_object() => parse_warnings(w),
        _ => SourceWarnings::new(),
    };

    let page = body
        .get("page")
        .and_then(|v| v.as_u64())
        .map(|p| p as u32)
        .unwrap_or(request.page);
    let limit = body
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|l| l as u32)
        .unwrap_or(request.limit);

    // Cursor pagination when the source speaks it, otherwise a full page
    // implies there may be more.
    let (next_cursor, has_next) = match body.get("nextCursor") {
        Some(cursor) => {
            let cursor = cursor.as_str().map(str::to_string);
            let has_next = cursor.is_some();
            (cursor, has_next)
        }
        None => (None, limit > 0 && rows.len() >= limit as usize),
    };

    if warnings.rate_limited() {
        warn!(
            "Leg source reported rate limiting for {}: {:?}",
            request.address,
            warnings.raised()
        );
    }

    Ok(LegPage {
        legs,
        gas_usd_by_tx,
        page,
        limit,
        next_cursor,
        has_next,
        warnings,
    })
}

fn parse_warnings(value: &serde_json::Value) -> SourceWarnings {
    let mut warnings = SourceWarnings::new();
    if let Some(map) = value.as_object() {
        for (name, flag) in map {
            if let Some(raised) = flag.as_bool() {
                warnings = warnings.with_flag(name, raised);
            }
        }
    }
    warnings
}

fn parse_leg(row: &serde_json::Value, request: &PageRequest) -> Result<TransactionLeg, LegSourceError> {
    let wire: WireLeg = serde_json::from_value(row.clone())
        .map_err(|e| LegSourceError::ParseError(e.to_string()))?;

    let timestamp = parse_timestamp(&wire.timestamp)?;
    let wallet = wire
        .wallet_address
        .as_deref()
        .map(Address::new)
        .unwrap_or_else(|| request.address.clone());
    let network = wire
        .network
        .as_deref()
        .map(Network::new)
        .or_else(|| request.networks.first().cloned())
        .unwrap_or_else(|| Network::new("unknown"));

    let mut leg = TransactionLeg::new(
        wallet,
        network,
        &wire.transaction_hash,
        timestamp,
        wire.direction,
        wire.asset,
        wire.quantity,
    )
    .with_pricing(wire.price_usd_at_timestamp, wire.usd_value_at_timestamp)
    .with_counterparty(
        wire.counterparty_address.as_deref(),
        wire.counterparty_label.as_deref(),
    );

    if let Some(tag) = wire.class_tag.as_deref() {
        leg = leg.with_class_tag(tag);
    }
    if let Some(classification) = wire.classification {
        leg = leg.with_classification(classification);
    }
    if let Some(fee) = wire.fee {
        leg = leg.with_fee(fee);
    }
    Ok(leg)
}

/// Timestamps arrive as epoch milliseconds or RFC 3339 strings.
fn parse_timestamp(value: &serde_json::Value) -> Result<TimeMs, LegSourceError> {
    if let Some(ms) = value.as_i64() {
        return Ok(TimeMs::new(ms));
    }
    if let Some(s) = value.as_str() {
        if let Ok(ms) = s.parse::<i64>() {
            return Ok(TimeMs::new(ms));
        }
        return chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| TimeMs::new(dt.timestamp_millis()))
            .map_err(|e| LegSourceError::ParseError(format!("Invalid timestamp {}: {}", s, e)));
    }
    Err(LegSourceError::ParseError(
        "Missing timestamp field".to_string(),
    ))
}
