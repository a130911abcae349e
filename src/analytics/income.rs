use crate::domain::{Classification, Decimal, Direction, TransactionLeg};
use serde::Serialize;
use std::collections::HashMap;

pub const STAKING_REWARDS: &str = "Staking rewards";
pub const AIRDROPS: &str = "Airdrops";
pub const INTEREST_AND_YIELD: &str = "Interest & yield";
pub const MINING: &str = "Mining";
pub const SALARY_AND_PAYMENTS: &str = "Salary & payments";
pub const REFUNDS: &str = "Refunds";
pub const TRANSFERS_IN: &str = "Transfers in";
pub const OTHER_INCOME: &str = "Other income";

/// Categories shown individually; the rest fold into `OTHER_INCOME`.
pub const MAX_INCOME_CATEGORIES: usize = 4;

// First match wins, so more specific keywords come first.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (AIRDROPS, &["airdrop", "claim"]),
    (REFUNDS, &["refund", "rebate", "cashback"]),
    (MINING, &["mining", "miner"]),
    (SALARY_AND_PAYMENTS, &["salary", "payroll", "payment", "invoice", "wage"]),
    (INTEREST_AND_YIELD, &["interest", "yield", "lend", "savings", "vault"]),
    (STAKING_REWARDS, &["staking", "stake", "validator", "reward"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeCategory {
    pub label: String,
    pub amount_usd: Decimal,
    pub leg_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeBreakdown {
    pub categories: Vec<IncomeCategory>,
    pub total_usd: Decimal,
    /// Income legs without a USD value; excluded from the sums.
    pub unpriced_legs: usize,
}

/// Category label for an inbound income leg, from its class tag and counterparty label.
pub fn income_category(leg: &TransactionLeg) -> &'static str {
    let haystack = [leg.class_tag.as_deref(), leg.counterparty_label.as_deref()]
        .into_iter()
        .flatten()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ");

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(label, _)| *label)
        .unwrap_or(TRANSFERS_IN)
}

pub fn income_breakdown(legs: &[TransactionLeg]) -> IncomeBreakdown {
    let mut sums: HashMap<&'static str, (Decimal, usize)> = HashMap::new();
    let mut unpriced_legs = 0;

    for leg in legs
        .iter()
        .filter(|l| l.direction == Direction::In && l.classification == Classification::Income)
    {
        let Some(value) = leg.value_usd() else {
            unpriced_legs += 1;
            continue;
        };
        let entry = sums
            .entry(income_category(leg))
            .or_insert((Decimal::zero(), 0));
        entry.0 += value;
        entry.1 += 1;
    }

    let mut categories: Vec<IncomeCategory> = sums
        .into_iter()
        .map(|(label, (amount_usd, leg_count))| IncomeCategory {
            label: label.to_string(),
            amount_usd,
            leg_count,
        })
        .collect();
    categories.sort_by(|a, b| {
        b.amount_usd
            .cmp(&a.amount_usd)
            .then_with(|| a.label.cmp(&b.label))
    });

    let total_usd = categories.iter().map(|c| c.amount_usd).sum();

    if categories.len() > MAX_INCOME_CATEGORIES {
        let rest = categories.split_off(MAX_INCOME_CATEGORIES);
        categories.push(IncomeCategory {
            label: OTHER_INCOME.to_string(),
            amount_usd: rest.iter().map(|c| c.amount_usd).sum(),
            leg_count: rest.iter().map(|c| c.leg_count).sum(),
        });
    }

    IncomeBreakdown {
        categories,
        total_usd,
        unpriced_legs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Asset, Network, TimeMs};

    fn income(hash: &str, tag: &str, usd: &str) -> TransactionLeg {
        TransactionLeg::new(
            Address::new("0xabc"),
            Network::new("ethereum"),
            hash,
            TimeMs::new(0),
            Direction::In,
            Asset::native("ETH", 18),
            Decimal::from_i64(1),
        )
        .with_class_tag(tag)
        .with_pricing(None, Some(Decimal::from_str_canonical(usd).unwrap()))
    }

    #[test]
    fn test_categories_from_tags() {
        assert_eq!(income_category(&income("0x1", "staking_reward", "1")), STAKING_REWARDS);
        assert_eq!(income_category(&income("0x1", "airdrop", "1")), AIRDROPS);
        assert_eq!(income_category(&income("0x1", "interest", "1")), INTEREST_AND_YIELD);
        assert_eq!(income_category(&income("0x1", "income", "1")), TRANSFERS_IN);
    }

    #[test]
    fn test_counterparty_label_is_considered() {
        let leg = income("0x1", "income", "1").with_counterparty(Some("0xpay"), Some("Acme Payroll"));
        assert_eq!(income_category(&leg), SALARY_AND_PAYMENTS);
    }

    #[test]
    fn test_received_payment_counts_as_income() {
        let leg = income("0x1", "payment", "500");
        assert_eq!(leg.classification, Classification::Income);

        let breakdown = income_breakdown(&[leg]);
        assert_eq!(breakdown.categories.len(), 1);
        assert_eq!(breakdown.categories[0].label, SALARY_AND_PAYMENTS);
        assert_eq!(breakdown.total_usd, Decimal::from_i64(500));
    }

    #[test]
    fn test_top_four_then_other() {
        let legs = vec![
            income("0x1", "staking", "500"),
            income("0x2", "airdrop", "400"),
            income("0x3", "interest", "300"),
            income("0x4", "mining", "200"),
            income("0x5", "refund", "50"),
            income("0x6", "income", "25"),
        ];
        let breakdown = income_breakdown(&legs);

        let labels: Vec<&str> = breakdown.categories.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![STAKING_REWARDS, AIRDROPS, INTEREST_AND_YIELD, MINING, OTHER_INCOME]
        );
        assert_eq!(breakdown.categories[4].amount_usd, Decimal::from_i64(75));
        assert_eq!(breakdown.categories[4].leg_count, 2);
        assert_eq!(breakdown.total_usd, Decimal::from_i64(1475));
    }

    #[test]
    fn test_unpriced_income_is_excluded() {
        let mut leg = income("0x1", "staking", "1");
        leg.usd_value_at_timestamp = None;
        let breakdown = income_breakdown(&[leg]);
        assert!(breakdown.categories.is_empty());
        assert_eq!(breakdown.unpriced_legs, 1);
        assert_eq!(breakdown.total_usd, Decimal::zero());
    }
}
