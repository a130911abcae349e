//! Flat aggregations over loaded legs. Every ratio is `None` on a zero denominator.

use crate::domain::{Classification, Decimal, Direction, TransactionLeg};
use crate::engine::RealizedGainEntry;
use serde::Serialize;
use std::collections::HashMap;

/// Symbols treated as USD-pegged.
pub const STABLECOIN_SYMBOLS: &[&str] = &[
    "USDC", "USDT", "DAI", "BUSD", "TUSD", "USDP", "GUSD", "FRAX", "LUSD", "PYUSD", "USDE",
    "FDUSD", "USDBC",
];

pub fn is_stablecoin(leg: &TransactionLeg) -> bool {
    let symbol = leg.asset.symbol.trim().to_ascii_uppercase();
    STABLECOIN_SYMBOLS.contains(&symbol.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasVsProceeds {
    pub gas_usd: Decimal,
    pub proceeds_usd: Decimal,
    pub transactions_with_gas: usize,
    pub gas_coverage_ratio: Option<Decimal>,
}

/// Gas per transaction comes from the source's `gasUsdByTx` map when it has
/// the hash, else from the first leg of that transaction carrying a fee value.
pub fn gas_vs_proceeds(
    legs: &[TransactionLeg],
    gas_usd_by_tx: &HashMap<String, Decimal>,
    proceeds_usd: Decimal,
) -> GasVsProceeds {
    let mut per_tx: HashMap<&str, Decimal> = HashMap::new();

    for leg in legs {
        let hash = leg.transaction_hash.as_str();
        if per_tx.contains_key(hash) {
            continue;
        }
        if let Some(gas) = gas_usd_by_tx.get(hash) {
            per_tx.insert(hash, *gas);
        } else if let Some(fee) = leg.fee_usd() {
            per_tx.insert(hash, fee);
        }
    }

    let gas_usd: Decimal = per_tx.values().sum();
    GasVsProceeds {
        gas_usd,
        proceeds_usd,
        transactions_with_gas: per_tx.values().filter(|g| g.is_positive()).count(),
        gas_coverage_ratio: gas_usd.checked_div(proceeds_usd),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StablecoinBuffer {
    pub inflow_usd: Decimal,
    pub outflow_usd: Decimal,
    pub net_usd: Decimal,
    /// Share of all priced outflows that left in stablecoins.
    pub stable_share_of_outflows: Option<Decimal>,
}

pub fn stablecoin_buffer(legs: &[TransactionLeg]) -> StablecoinBuffer {
    let mut inflow_usd = Decimal::zero();
    let mut outflow_usd = Decimal::zero();
    let mut all_outflows = Decimal::zero();

    for leg in legs {
        let stable = is_stablecoin(leg);
        // Unpriced stablecoin legs count at par.
        let value = match (leg.value_usd(), stable) {
            (Some(v), _) => v,
            (None, true) => leg.quantity,
            (None, false) => continue,
        };
        match leg.direction {
            Direction::In if stable => inflow_usd += value,
            Direction::Out => {
                all_outflows += value;
                if stable {
                    outflow_usd += value;
                }
            }
            Direction::In => {}
        }
    }

    StablecoinBuffer {
        inflow_usd,
        outflow_usd,
        net_usd: inflow_usd - outflow_usd,
        stable_share_of_outflows: outflow_usd.checked_div(all_outflows),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRatios {
    pub income_usd: Decimal,
    pub expense_usd: Decimal,
    pub net_income_usd: Decimal,
    pub net_margin: Option<Decimal>,
    pub expense_ratio: Option<Decimal>,
    pub realized_gain_usd: Decimal,
    pub win_rate: Option<Decimal>,
    pub long_term_share: Option<Decimal>,
}

/// Income is inbound income legs; expense is outbound expense and gas legs.
pub fn financial_ratios(
    legs: &[TransactionLeg],
    realized: &[RealizedGainEntry],
) -> FinancialRatios {
    let mut income_usd = Decimal::zero();
    let mut expense_usd = Decimal::zero();
    for leg in legs {
        let Some(value) = leg.value_usd() else {
            continue;
        };
        match (leg.direction, leg.classification) {
            (Direction::In, Classification::Income) => income_usd += value,
            (Direction::Out, Classification::Expense | Classification::Gas) => expense_usd += value,
            _ => {}
        }
    }

    let net_income_usd = income_usd - expense_usd;
    let entries = Decimal::from_i64(realized.len() as i64);
    let wins = realized.iter().filter(|e| e.gain_usd.is_positive()).count();
    let long_term = realized.iter().filter(|e| e.is_long_term).count();

    FinancialRatios {
        income_usd,
        expense_usd,
        net_income_usd,
        net_margin: net_income_usd.checked_div(income_usd),
        expense_ratio: expense_usd.checked_div(income_usd),
        realized_gain_usd: realized.iter().map(|e| e.gain_usd).sum(),
        win_rate: Decimal::from_i64(wins as i64).checked_div(entries),
        long_term_share: Decimal::from_i64(long_term as i64).checked_div(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Asset, LegFee, Network, TimeMs};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn leg(hash: &str, direction: Direction, symbol: &str, qty: &str) -> TransactionLeg {
        TransactionLeg::new(
            Address::new("0xabc"),
            Network::new("ethereum"),
            hash,
            TimeMs::new(0),
            direction,
            Asset::native(symbol, 18),
            d(qty),
        )
    }

    fn fee(usd: &str) -> LegFee {
        LegFee {
            quantity: None,
            usd_value_at_timestamp: Some(d(usd)),
        }
    }

    #[test]
    fn test_gas_prefers_meta_then_first_fee() {
        let legs = vec![
            leg("0x1", Direction::Out, "ETH", "1").with_fee(fee("3")),
            leg("0x1", Direction::In, "USDC", "1").with_fee(fee("99")),
            leg("0x2", Direction::Out, "ETH", "1"),
            leg("0x2", Direction::Out, "ETH", "2").with_fee(fee("2")),
            leg("0x3", Direction::Out, "ETH", "1").with_fee(fee("7")),
        ];
        let mut meta = HashMap::new();
        meta.insert("0x3".to_string(), d("5"));

        let gas = gas_vs_proceeds(&legs, &meta, d("100"));
        assert_eq!(gas.gas_usd, d("10"));
        assert_eq!(gas.transactions_with_gas, 3);
        assert_eq!(gas.gas_coverage_ratio, Some(d("0.1")));
    }

    #[test]
    fn test_zero_denominators_yield_none() {
        let gas = gas_vs_proceeds(&[], &HashMap::new(), Decimal::zero());
        assert_eq!(gas.gas_coverage_ratio, None);

        let ratios = financial_ratios(&[], &[]);
        assert_eq!(ratios.net_margin, None);
        assert_eq!(ratios.expense_ratio, None);
        assert_eq!(ratios.win_rate, None);
        assert_eq!(ratios.long_term_share, None);

        assert_eq!(stablecoin_buffer(&[]).stable_share_of_outflows, None);
    }

    #[test]
    fn test_financial_ratios() {
        let legs = vec![
            leg("0x1", Direction::In, "ETH", "1")
                .with_class_tag("staking")
                .with_pricing(None, Some(d("200"))),
            leg("0x2", Direction::Out, "USDC", "50")
                .with_class_tag("payment")
                .with_pricing(None, Some(d("50"))),
            leg("0x3", Direction::Out, "ETH", "0.01")
                .with_class_tag("gas")
                .with_pricing(None, Some(d("10"))),
        ];
        let ratios = financial_ratios(&legs, &[]);
        assert_eq!(ratios.income_usd, d("200"));
        assert_eq!(ratios.expense_usd, d("60"));
        assert_eq!(ratios.net_income_usd, d("140"));
        assert_eq!(ratios.net_margin, Some(d("0.7")));
        assert_eq!(ratios.expense_ratio, Some(d("0.3")));
    }

    #[test]
    fn test_stablecoin_buffer() {
        let legs = vec![
            leg("0x1", Direction::In, "USDC", "500"),
            leg("0x2", Direction::Out, "usdt", "100").with_pricing(None, Some(d("100"))),
            leg("0x3", Direction::Out, "ETH", "1").with_pricing(None, Some(d("300"))),
            leg("0x4", Direction::Out, "PEPE", "1000"),
        ];
        let buffer = stablecoin_buffer(&legs);
        assert_eq!(buffer.inflow_usd, d("500"));
        assert_eq!(buffer.outflow_usd, d("100"));
        assert_eq!(buffer.net_usd, d("400"));
        assert_eq!(buffer.stable_share_of_outflows, Some(d("0.25")));
    }
}
