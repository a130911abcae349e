//! Derived analytics over a gains report plus the loaded leg set.
//!
//! All functions here are pure; memoization lives with the caller.

pub mod aging;
pub mod income;
pub mod ratios;
pub mod wash_sale;

pub use aging::{aging_buckets, AgingBand, AgingBucket};
pub use income::{income_breakdown, income_category, IncomeBreakdown, IncomeCategory};
pub use ratios::{
    financial_ratios, gas_vs_proceeds, stablecoin_buffer, FinancialRatios, GasVsProceeds,
    StablecoinBuffer,
};
pub use wash_sale::{wash_sale_signals, RepurchaseDirection, WashSaleSignal};

use crate::compile::GainsReport;
use crate::domain::{Decimal, TimeMs, TransactionLeg};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub income: IncomeBreakdown,
    pub wash_sales: Vec<WashSaleSignal>,
    pub aging: Vec<AgingBucket>,
    pub gas: GasVsProceeds,
    pub stablecoins: StablecoinBuffer,
    pub ratios: FinancialRatios,
}

pub fn summarize(
    legs: &[TransactionLeg],
    gas_usd_by_tx: &HashMap<String, Decimal>,
    gains: &GainsReport,
    now: TimeMs,
) -> AnalyticsReport {
    AnalyticsReport {
        income: income_breakdown(legs),
        wash_sales: wash_sale_signals(&gains.realized, legs),
        aging: aging_buckets(&gains.open_lots, now),
        gas: gas_vs_proceeds(legs, gas_usd_by_tx, gains.totals.proceeds_usd),
        stablecoins: stablecoin_buffer(legs),
        ratios: financial_ratios(legs, &gains.realized),
    }
}
