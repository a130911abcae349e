use crate::domain::{Decimal, TimeMs};
use crate::engine::CostBasisLot;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AgingBand {
    #[serde(rename = "0-30d")]
    UpTo30Days,
    #[serde(rename = "31-90d")]
    UpTo90Days,
    #[serde(rename = "91-365d")]
    UpTo365Days,
    #[serde(rename = "1-2y")]
    OneToTwoYears,
    #[serde(rename = "2y+")]
    OverTwoYears,
}

impl AgingBand {
    pub const ALL: [AgingBand; 5] = [
        AgingBand::UpTo30Days,
        AgingBand::UpTo90Days,
        AgingBand::UpTo365Days,
        AgingBand::OneToTwoYears,
        AgingBand::OverTwoYears,
    ];

    /// Band for a lot age in whole days. Future-dated lots land in the first band.
    pub fn for_age(days: i64) -> Self {
        match days {
            d if d <= 30 => AgingBand::UpTo30Days,
            d if d <= 90 => AgingBand::UpTo90Days,
            d if d <= 365 => AgingBand::UpTo365Days,
            d if d <= 730 => AgingBand::OneToTwoYears,
            _ => AgingBand::OverTwoYears,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingBucket {
    pub band: AgingBand,
    pub lot_count: usize,
    pub quantity: Decimal,
    pub cost_basis_usd: Decimal,
}

/// Bucket open lots by age at `now`. Every band is present, empty or not.
pub fn aging_buckets(lots: &[CostBasisLot], now: TimeMs) -> Vec<AgingBucket> {
    let mut buckets: Vec<AgingBucket> = AgingBand::ALL
        .iter()
        .map(|band| AgingBucket {
            band: *band,
            lot_count: 0,
            quantity: Decimal::zero(),
            cost_basis_usd: Decimal::zero(),
        })
        .collect();

    for lot in lots {
        let band = AgingBand::for_age(now.days_since(lot.purchase_date));
        // ALL is declared in band order.
        let bucket = &mut buckets[band as usize];
        bucket.lot_count += 1;
        bucket.quantity += lot.quantity;
        bucket.cost_basis_usd += lot.cost_basis_usd;
    }

    buckets
}
