//! Informational unrealized-gain view over open lots.

use super::CostBasisLot;
use crate::domain::{AssetKey, Decimal};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrealizedPosition {
    pub asset_key: AssetKey,
    pub quantity: Decimal,
    pub cost_basis_usd: Decimal,
    pub lot_count: usize,
    pub current_price_usd: Option<Decimal>,
    pub market_value_usd: Option<Decimal>,
    pub unrealized_gain_usd: Option<Decimal>,
    pub gain_percent: Option<Decimal>,
}

/// Aggregate open lots per asset and value them at externally supplied prices.
///
/// Assets without a price keep their quantity and basis but no valuation.
pub fn unrealized_positions(
    lots: &[CostBasisLot],
    prices: &HashMap<AssetKey, Decimal>,
) -> Vec<UnrealizedPosition> {
    let mut grouped: BTreeMap<&AssetKey, (Decimal, Decimal, usize)> = BTreeMap::new();
    for lot in lots {
        let entry = grouped
            .entry(&lot.asset)
            .or_insert((Decimal::zero(), Decimal::zero(), 0));
        entry.0 += lot.quantity;
        entry.1 += lot.cost_basis_usd;
        entry.2 += 1;
    }

    grouped
        .into_iter()
        .map(|(asset_key, (quantity, cost_basis_usd, lot_count))| {
            let current_price_usd = prices.get(asset_key).copied();
            let market_value_usd = current_price_usd.map(|price| price * quantity);
            let unrealized_gain_usd = market_value_usd.map(|value| value - cost_basis_usd);
            let gain_percent =
                unrealized_gain_usd.and_then(|gain| gain.percent_of(cost_basis_usd));
            UnrealizedPosition {
                asset_key: asset_key.clone(),
                quantity,
                cost_basis_usd,
                lot_count,
                current_price_usd,
                market_value_usd,
                unrealized_gain_usd,
                gain_percent,
            }
        })
        .collect()
}
