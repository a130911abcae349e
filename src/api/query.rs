//! Query-string parsing shared by the handlers.

use crate::cache::{DateRange, LoadContext};
use crate::config::Config;
use crate::domain::{Address, AssetKey, Decimal, Network, TimeMs};
use crate::engine::CostBasisMethod;
use crate::error::AppError;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;

/// Build the load context from request parameters, falling back to the
/// configured wallets and networks.
pub fn resolve_context(
    wallets: Option<&str>,
    networks: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    config: &Config,
) -> Result<LoadContext, AppError> {
    let wallets = match non_empty(wallets) {
        Some(raw) => split(raw)
            .map(parse_address)
            .collect::<Result<Vec<_>, _>>()?,
        None => config.default_wallets.clone(),
    };
    if wallets.is_empty() {
        return Err(AppError::BadRequest("wallets is required".into()));
    }

    let networks = match non_empty(networks) {
        Some(raw) => split(raw).map(Network::new).collect(),
        None => config.default_networks.clone(),
    };

    let from = non_empty(from).map(|s| parse_time(s, false)).transpose()?;
    let to = non_empty(to).map(|s| parse_time(s, true)).transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::BadRequest("from must not be after to".into()));
        }
    }

    Ok(LoadContext::new(wallets, networks, DateRange::new(from, to)))
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn split(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Wallet addresses: EVM hex or base58-style alphanumerics.
pub fn parse_address(raw: &str) -> Result<Address, AppError> {
    let raw = raw.trim();
    let valid = if let Some(hex_part) = raw.strip_prefix("0x") {
        !hex_part.is_empty()
            && hex_part.len() <= 40
            && hex_part.chars().all(|c| c.is_ascii_hexdigit())
    } else {
        !raw.is_empty() && raw.len() <= 64 && raw.chars().all(|c| c.is_ascii_alphanumeric())
    };
    if !valid {
        return Err(AppError::BadRequest(format!("Invalid wallet address: {}", raw)));
    }
    Ok(Address::new(raw))
}

/// Accepts epoch milliseconds, RFC 3339, or `YYYY-MM-DD`. A bare date used as
/// an upper bound covers the whole day.
pub fn parse_time(raw: &str, end_of_day: bool) -> Result<TimeMs, AppError> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(TimeMs::new(ms));
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(TimeMs::new(dt.timestamp_millis()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        } else {
            NaiveTime::from_hms_opt(0, 0, 0)
        };
        if let Some(time) = time {
            let dt = Utc.from_utc_datetime(&date.and_time(time));
            return Ok(TimeMs::new(dt.timestamp_millis()));
        }
    }
    Err(AppError::BadRequest(format!("Invalid date: {}", raw)))
}

/// View names: up to 64 characters of ASCII alphanumerics, `-` or `_`.
pub fn parse_view<'a>(raw: Option<&'a str>, default: &'a str) -> Result<&'a str, AppError> {
    let Some(view) = non_empty(raw) else {
        return Ok(default);
    };
    let valid = view.len() <= 64
        && view
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(AppError::BadRequest(format!("Invalid view: {}", view)));
    }
    Ok(view)
}

pub fn parse_method(raw: Option<&str>) -> Result<Option<CostBasisMethod>, AppError> {
    non_empty(raw)
        .map(|s| {
            s.parse::<CostBasisMethod>()
                .map_err(|e| AppError::BadRequest(e.to_string()))
        })
        .transpose()
}

/// `ETH:2500,0xa0b8...:1.00` into a price map keyed like lots are.
pub fn parse_prices(raw: Option<&str>) -> Result<HashMap<AssetKey, Decimal>, AppError> {
    let mut prices = HashMap::new();
    let Some(raw) = non_empty(raw) else {
        return Ok(prices);
    };
    for pair in split(raw) {
        let (asset, price) = pair
            .rsplit_once(':')
            .ok_or_else(|| AppError::BadRequest(format!("Invalid price entry: {}", pair)))?;
        let price = Decimal::from_str_canonical(price)
            .map_err(|_| AppError::BadRequest(format!("Invalid price for {}", asset)))?;
        if price.is_negative() {
            return Err(AppError::BadRequest(format!("Negative price for {}", asset)));
        }
        prices.insert(AssetKey::parse(asset), price);
    }
    Ok(prices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut env = HashMap::new();
        env.insert("LEG_SOURCE_URL".to_string(), "http://localhost:1".to_string());
        Config::from_env_map(env).unwrap()
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("1700000000000", false).unwrap(), TimeMs::new(1_700_000_000_000));
        assert_eq!(
            parse_time("2024-01-01T00:00:00Z", false).unwrap(),
            TimeMs::new(1_704_067_200_000)
        );
        assert_eq!(parse_time("2024-01-01", false).unwrap(), TimeMs::new(1_704_067_200_000));
        assert_eq!(parse_time("2024-01-01", true).unwrap(), TimeMs::new(1_704_153_599_999));
        assert!(parse_time("yesterday", false).is_err());
    }

    #[test]
    fn test_resolve_context_requires_wallets() {
        let err = resolve_context(None, None, None, None, &config()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_resolve_context_normalizes() {
        let ctx = resolve_context(
            Some("0xBBB,0xaaa"),
            Some("Base"),
            Some("2024-01-01"),
            None,
            &config(),
        )
        .unwrap();
        assert_eq!(ctx.wallets(), &[Address::new("0xaaa"), Address::new("0xbbb")]);
        assert_eq!(ctx.networks(), &[Network::new("base")]);
        assert_eq!(ctx.range().from, Some(TimeMs::new(1_704_067_200_000)));
    }

    #[test]
    fn test_resolve_context_rejects_inverted_range() {
        let err = resolve_context(Some("0xaaa"), None, Some("2024-02-01"), Some("2024-01-01"), &config())
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0xAbC123").is_ok());
        assert!(parse_address("0x").is_err());
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("So11111111111111111111111111111111111111112").is_ok());
        assert!(parse_address("not an address").is_err());
    }

    #[test]
    fn test_parse_prices() {
        let prices = parse_prices(Some("eth:2500, 0xA0b8:1.00")).unwrap();
        assert_eq!(prices.get(&AssetKey::parse("ETH")), Some(&Decimal::from_i64(2500)));
        assert_eq!(
            prices.get(&AssetKey::parse("0xa0b8")),
            Some(&Decimal::from_str_canonical("1").unwrap())
        );
        assert!(parse_prices(Some("ETH")).is_err());
        assert!(parse_prices(Some("ETH:-1")).is_err());
        assert!(parse_prices(None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_view() {
        assert_eq!(parse_view(None, "transactions").unwrap(), "transactions");
        assert_eq!(parse_view(Some(" "), "transactions").unwrap(), "transactions");
        assert_eq!(parse_view(Some("sidebar_2"), "transactions").unwrap(), "sidebar_2");
        assert!(parse_view(Some("a b"), "transactions").is_err());
        assert!(parse_view(Some("x".repeat(65).as_str()), "transactions").is_err());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method(Some("lifo")).unwrap(), Some(CostBasisMethod::Lifo));
        assert_eq!(parse_method(Some("")).unwrap(), None);
        assert!(parse_method(Some("avg")).is_err());
    }
}
