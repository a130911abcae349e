use crate::domain::{AssetKey, Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Holding periods of at least this many days are long-term.
pub const LONG_TERM_DAYS: i64 = 365;

/// Lot selection order used when matching a disposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBasisMethod {
    /// Oldest purchase first.
    #[default]
    Fifo,
    /// Newest purchase first.
    Lifo,
    /// Lots in the order they were added.
    SpecificId,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cost basis method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for CostBasisMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(CostBasisMethod::Fifo),
            "lifo" => Ok(CostBasisMethod::Lifo),
            "specific_id" | "specific-id" | "specificid" => Ok(CostBasisMethod::SpecificId),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for CostBasisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostBasisMethod::Fifo => write!(f, "fifo"),
            CostBasisMethod::Lifo => write!(f, "lifo"),
            CostBasisMethod::SpecificId => write!(f, "specific_id"),
        }
    }
}

/// An open acquisition. Quantity and cost basis only ever shrink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBasisLot {
    pub id: String,
    pub asset: AssetKey,
    pub quantity: Decimal,
    pub cost_basis_usd: Decimal,
    pub purchase_date: TimeMs,
    pub unit_price: Decimal,
}

/// One disposal matched against one lot (or a slice of it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedGainEntry {
    pub asset_key: AssetKey,
    pub lot_id: String,
    pub quantity_sold: Decimal,
    /// Sale price per unit.
    pub sale_price_usd: Decimal,
    pub proceeds_usd: Decimal,
    pub cost_basis_usd: Decimal,
    pub gain_usd: Decimal,
    pub holding_period_days: i64,
    pub is_long_term: bool,
    pub sale_date: TimeMs,
    pub purchase_date: TimeMs,
    pub source_transaction_id: String,
}

impl RealizedGainEntry {
    /// Gain relative to cost basis, in percent; `None` for a zero cost basis.
    pub fn gain_percent(&self) -> Option<Decimal> {
        self.gain_usd.percent_of(self.cost_basis_usd)
    }
}

/// Disposal quantity no open lot could cover. Usually means the asset was
/// acquired before the loaded window began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedSale {
    pub asset_key: AssetKey,
    pub quantity: Decimal,
    pub sale_price_usd: Decimal,
    pub sale_date: TimeMs,
    pub source_transaction_id: String,
}

/// Per-asset open-lot queues plus the record of uncovered disposals.
///
/// Callers must feed acquisitions and disposals in non-decreasing time order;
/// the engine does not re-sort its input.
#[derive(Debug, Clone, Default)]
pub struct CostBasisEngine {
    method: CostBasisMethod,
    lots: BTreeMap<AssetKey, Vec<CostBasisLot>>,
    unmatched: Vec<UnmatchedSale>,
}

impl CostBasisEngine {
    pub fn new(method: CostBasisMethod) -> Self {
        Self {
            method,
            lots: BTreeMap::new(),
            unmatched: Vec::new(),
        }
    }

    pub fn method(&self) -> CostBasisMethod {
        self.method
    }

    /// Append a lot. Lots with identical price and date are kept apart.
    pub fn add_to_cost_basis(&mut self, lot: CostBasisLot) {
        self.lots.entry(lot.asset.clone()).or_default().push(lot);
    }

    /// Match a disposal against the asset's open lots.
    ///
    /// Emits one entry per consumed lot slice. Quantity left over once every
    /// lot is used up is recorded as an `UnmatchedSale`.
    pub fn calculate_gains(
        &mut self,
        asset: &AssetKey,
        quantity: Decimal,
        sale_price_usd: Decimal,
        sale_date: TimeMs,
        source_id: &str,
    ) -> Vec<RealizedGainEntry> {
        let mut entries = Vec::new();
        if !quantity.is_positive() {
            return entries;
        }

        let mut remaining = quantity;
        if let Some(lots) = self.lots.get_mut(asset) {
            match self.method {
                CostBasisMethod::Fifo => lots.sort_by(|a, b| a.purchase_date.cmp(&b.purchase_date)),
                CostBasisMethod::Lifo => lots.sort_by(|a, b| b.purchase_date.cmp(&a.purchase_date)),
                CostBasisMethod::SpecificId => {}
            }

            for lot in lots.iter_mut() {
                if remaining.is_zero() {
                    break;
                }
                if !lot.quantity.is_positive() {
                    continue;
                }

                let consumed = remaining.min(lot.quantity);
                // Taken from the lot's current remainder, before it shrinks.
                let cost_basis = if consumed == lot.quantity {
                    lot.cost_basis_usd
                } else {
                    (lot.cost_basis_usd / lot.quantity) * consumed
                };
                lot.quantity -= consumed;
                lot.cost_basis_usd -= cost_basis;
                remaining -= consumed;

                let proceeds = sale_price_usd * consumed;
                let holding_period_days = sale_date.days_since(lot.purchase_date);
                entries.push(RealizedGainEntry {
                    asset_key: asset.clone(),
                    lot_id: lot.id.clone(),
                    quantity_sold: consumed,
                    sale_price_usd,
                    proceeds_usd: proceeds,
                    cost_basis_usd: cost_basis,
                    gain_usd: proceeds - cost_basis,
                    holding_period_days,
                    is_long_term: holding_period_days >= LONG_TERM_DAYS,
                    sale_date,
                    purchase_date: lot.purchase_date,
                    source_transaction_id: source_id.to_string(),
                });
            }

            lots.retain(|lot| lot.quantity.is_positive());
            if lots.is_empty() {
                self.lots.remove(asset);
            }
        }

        if remaining.is_positive() {
            self.unmatched.push(UnmatchedSale {
                asset_key: asset.clone(),
                quantity: remaining,
                sale_price_usd,
                sale_date,
                source_transaction_id: source_id.to_string(),
            });
        }

        entries
    }

    /// All open lots, grouped by asset key in key order.
    pub fn open_lots(&self) -> Vec<CostBasisLot> {
        self.lots.values().flatten().cloned().collect()
    }

    pub fn lots_for(&self, asset: &AssetKey) -> &[CostBasisLot] {
        self.lots.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn unmatched_sales(&self) -> &[UnmatchedSale] {
        &self.unmatched
    }
}
