//! Heuristic wash-sale flags.
//!
//! A loss is flagged when the same asset was bought within 30 days of the
//! sale. A forward repurchase (after the sale) wins over a backward one; when
//! both exist the backward candidate is ignored. This is a display hint, not a
//! tax determination.

use crate::domain::{AssetKey, Decimal, Direction, TimeMs, TransactionLeg};
use crate::engine::RealizedGainEntry;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const WASH_SALE_WINDOW_DAYS: i64 = 30;
pub const MAX_WASH_SALE_SIGNALS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepurchaseDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WashSaleSignal {
    pub asset_key: AssetKey,
    pub sale_date: TimeMs,
    pub loss_usd: Decimal,
    pub repurchase_date: TimeMs,
    pub days_apart: i64,
    pub direction: RepurchaseDirection,
    pub source_transaction_id: String,
}

#[derive(Debug, Clone)]
struct Buy<'a> {
    at: TimeMs,
    leg_id: &'a str,
}

/// Inbound leg timestamps per asset, ascending.
fn buys_by_asset(legs: &[TransactionLeg]) -> HashMap<AssetKey, Vec<Buy<'_>>> {
    let mut buys: HashMap<AssetKey, Vec<Buy<'_>>> = HashMap::new();
    for leg in legs.iter().filter(|l| l.direction == Direction::In) {
        buys.entry(leg.asset_key()).or_default().push(Buy {
            at: leg.timestamp,
            leg_id: &leg.id,
        });
    }
    for list in buys.values_mut() {
        list.sort_by_key(|b| b.at);
    }
    buys
}

/// One disposal's losing slices, keyed by asset and sale transaction.
struct LossGroup<'a> {
    asset_key: &'a AssetKey,
    source_transaction_id: &'a str,
    sale_date: TimeMs,
    loss_usd: Decimal,
}

/// At most one signal per disposal, however many lots it consumed.
pub fn wash_sale_signals(
    realized: &[RealizedGainEntry],
    legs: &[TransactionLeg],
) -> Vec<WashSaleSignal> {
    let buys = buys_by_asset(legs);
    let window_ms = WASH_SALE_WINDOW_DAYS * crate::domain::MS_PER_DAY;

    // Lots consumed by a disposal are never its repurchase, gains included.
    let mut consumed: HashMap<(&AssetKey, &str), HashSet<&str>> = HashMap::new();
    for entry in realized {
        consumed
            .entry((&entry.asset_key, entry.source_transaction_id.as_str()))
            .or_default()
            .insert(entry.lot_id.as_str());
    }

    let mut groups: Vec<LossGroup<'_>> = Vec::new();
    for entry in realized.iter().filter(|e| e.gain_usd.is_negative()) {
        let existing = groups.iter_mut().find(|g| {
            g.asset_key == &entry.asset_key
                && g.source_transaction_id == entry.source_transaction_id
        });
        match existing {
            Some(group) => group.loss_usd += entry.gain_usd.abs(),
            None => groups.push(LossGroup {
                asset_key: &entry.asset_key,
                source_transaction_id: &entry.source_transaction_id,
                sale_date: entry.sale_date,
                loss_usd: entry.gain_usd.abs(),
            }),
        }
    }

    let mut signals = Vec::new();
    for group in groups {
        if signals.len() == MAX_WASH_SALE_SIGNALS {
            break;
        }
        let Some(candidates) = buys.get(group.asset_key) else {
            continue;
        };
        let sale = group.sale_date;
        let own_lots = consumed.get(&(group.asset_key, group.source_transaction_id));
        let others = move || {
            candidates
                .iter()
                .filter(move |b| own_lots.map_or(true, |lots| !lots.contains(b.leg_id)))
        };

        let forward = others()
            .filter(|b| b.at > sale && b.at.as_ms() - sale.as_ms() <= window_ms)
            .min_by_key(|b| b.at);
        let backward = others()
            .filter(|b| b.at <= sale && sale.as_ms() - b.at.as_ms() <= window_ms)
            .max_by_key(|b| b.at);

        let (buy, direction) = match (forward, backward) {
            (Some(b), _) => (b, RepurchaseDirection::Forward),
            (None, Some(b)) => (b, RepurchaseDirection::Backward),
            (None, None) => continue,
        };

        signals.push(WashSaleSignal {
            asset_key: group.asset_key.clone(),
            sale_date: sale,
            loss_usd: group.loss_usd,
            repurchase_date: buy.at,
            days_apart: (buy.at.as_ms() - sale.as_ms()).abs() / crate::domain::MS_PER_DAY,
            direction,
            source_transaction_id: group.source_transaction_id.to_string(),
        });
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Asset, Network};

    fn buy(hash: &str, day: i64) -> TransactionLeg {
        TransactionLeg::new(
            Address::new("0xabc"),
            Network::new("ethereum"),
            hash,
            TimeMs::new(0).plus_days(day),
            Direction::In,
            Asset::native("ETH", 18),
            Decimal::from_i64(1),
        )
    }

    fn loss(lot_id: &str, day: i64, gain: i64) -> RealizedGainEntry {
        RealizedGainEntry {
            asset_key: AssetKey::parse("ETH"),
            lot_id: lot_id.to_string(),
            quantity_sold: Decimal::from_i64(1),
            sale_price_usd: Decimal::from_i64(100),
            proceeds_usd: Decimal::from_i64(100),
            cost_basis_usd: Decimal::from_i64(100 - gain),
            gain_usd: Decimal::from_i64(gain),
            holding_period_days: day,
            is_long_term: false,
            sale_date: TimeMs::new(0).plus_days(day),
            purchase_date: TimeMs::new(0),
            source_transaction_id: format!("0xsale{}", day),
        }
    }

    #[test]
    fn test_forward_repurchase_preferred() {
        let legs = vec![buy("0xlot", 0), buy("0xback", 95), buy("0xfwd", 110)];
        let signals = wash_sale_signals(&[loss(&legs[0].id, 100, -50)], &legs);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, RepurchaseDirection::Forward);
        assert_eq!(signals[0].days_apart, 10);
        assert_eq!(signals[0].loss_usd, Decimal::from_i64(50));
    }

    #[test]
    fn test_backward_fallback_and_window_edge() {
        let legs = vec![buy("0xlot", 0), buy("0xback", 70)];
        let signals = wash_sale_signals(&[loss(&legs[0].id, 100, -10)], &legs);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, RepurchaseDirection::Backward);
        assert_eq!(signals[0].days_apart, 30);

        let legs = vec![buy("0xlot", 0), buy("0xback", 69)];
        assert!(wash_sale_signals(&[loss(&legs[0].id, 100, -10)], &legs).is_empty());
    }

    #[test]
    fn test_gains_and_own_lot_are_not_flagged() {
        let legs = vec![buy("0xlot", 90)];
        assert!(wash_sale_signals(&[loss(&legs[0].id, 100, -10)], &legs).is_empty());
        let legs = vec![buy("0xlot", 0), buy("0xfwd", 101)];
        assert!(wash_sale_signals(&[loss(&legs[0].id, 100, 25)], &legs).is_empty());
    }

    #[test]
    fn test_signals_are_capped() {
        let legs: Vec<TransactionLeg> = (0..10).map(|i| buy(&format!("0x{}", i), i * 5)).collect();
        let losses: Vec<RealizedGainEntry> = (0..8).map(|i| loss("none", i * 5 + 1, -1)).collect();
        assert_eq!(wash_sale_signals(&losses, &legs).len(), MAX_WASH_SALE_SIGNALS);
    }

    #[test]
    fn test_disposal_spanning_lots_yields_one_signal() {
        let legs = vec![
            buy("0xlot1", 80),
            buy("0xlot2", 85),
            buy("0xlot3", 90),
            buy("0xfwd", 105),
        ];
        let slices: Vec<RealizedGainEntry> = legs[..3]
            .iter()
            .map(|lot| {
                let mut entry = loss(&lot.id, 100, -10);
                entry.source_transaction_id = "0xsale".to_string();
                entry
            })
            .collect();

        let signals = wash_sale_signals(&slices, &legs);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].loss_usd, Decimal::from_i64(30));
        assert_eq!(signals[0].direction, RepurchaseDirection::Forward);
        assert_eq!(signals[0].days_apart, 5);
    }

    #[test]
    fn test_lots_of_the_same_disposal_are_not_repurchases() {
        let legs = vec![buy("0xlot1", 80), buy("0xlot2", 90)];
        let mut first = loss(&legs[0].id, 100, -10);
        let mut second = loss(&legs[1].id, 100, 5);
        first.source_transaction_id = "0xsale".to_string();
        second.source_transaction_id = "0xsale".to_string();

        assert!(wash_sale_signals(&[first, second], &legs).is_empty());
    }
}
