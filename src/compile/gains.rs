//! Drives the cost-basis engine over a chronological leg set.

use super::CompileError;
use crate::domain::{AssetKey, Decimal, Direction, TimeMs, TransactionLeg};
use crate::engine::{
    CostBasisEngine, CostBasisLot, CostBasisMethod, RealizedGainEntry, UnmatchedSale,
};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GainsTotals {
    pub proceeds_usd: Decimal,
    pub cost_basis_usd: Decimal,
    pub gain_usd: Decimal,
    pub short_term_gain_usd: Decimal,
    pub long_term_gain_usd: Decimal,
    pub unpriced_acquisitions: usize,
    pub unpriced_disposals: usize,
}

impl GainsTotals {
    fn record(&mut self, entry: &RealizedGainEntry) {
        self.proceeds_usd += entry.proceeds_usd;
        self.cost_basis_usd += entry.cost_basis_usd;
        self.gain_usd += entry.gain_usd;
        if entry.is_long_term {
            self.long_term_gain_usd += entry.gain_usd;
        } else {
            self.short_term_gain_usd += entry.gain_usd;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GainsReport {
    pub method: CostBasisMethod,
    pub realized: Vec<RealizedGainEntry>,
    pub unmatched: Vec<UnmatchedSale>,
    pub open_lots: Vec<CostBasisLot>,
    pub totals: GainsTotals,
}

impl GainsReport {
    /// True when some disposal predates the loaded acquisitions.
    pub fn has_unmatched(&self) -> bool {
        !self.unmatched.is_empty()
    }
}

/// Stateful compiler; feed legs with [`GainsCompiler::process`] then [`finish`].
///
/// [`finish`]: GainsCompiler::finish
#[derive(Debug)]
pub struct GainsCompiler {
    engine: CostBasisEngine,
    realized: Vec<RealizedGainEntry>,
    totals: GainsTotals,
    last: Option<(TimeMs, String)>,
}

impl GainsCompiler {
    pub fn new(method: CostBasisMethod) -> Self {
        Self {
            engine: CostBasisEngine::new(method),
            realized: Vec::new(),
            totals: GainsTotals::default(),
            last: None,
        }
    }

    /// Compile a whole chronological leg set in one call.
    pub fn compile(
        method: CostBasisMethod,
        legs: &[TransactionLeg],
    ) -> Result<GainsReport, CompileError> {
        let mut compiler = Self::new(method);
        for leg in legs {
            compiler.process(leg)?;
        }
        Ok(compiler.finish())
    }

    /// Apply one leg. Legs must arrive in non-decreasing timestamp order.
    pub fn process(&mut self, leg: &TransactionLeg) -> Result<(), CompileError> {
        if let Some((previous, previous_id)) = &self.last {
            if leg.timestamp < *previous {
                return Err(CompileError::OutOfOrder {
                    previous: *previous,
                    next: leg.timestamp,
                    leg_id: leg.id.clone(),
                    previous_leg_id: previous_id.clone(),
                });
            }
        }
        self.last = Some((leg.timestamp, leg.id.clone()));

        if leg.quantity.is_zero() {
            return Ok(());
        }

        let asset_key = leg.asset_key();
        match leg.direction {
            Direction::In => self.acquire(leg, asset_key),
            Direction::Out => self.dispose(leg, &asset_key),
        }
        Ok(())
    }

    fn acquire(&mut self, leg: &TransactionLeg, asset: AssetKey) {
        let Some(unit_price) = leg.unit_price_usd() else {
            self.totals.unpriced_acquisitions += 1;
            return;
        };
        let cost_basis_usd = leg
            .usd_value_at_timestamp
            .unwrap_or(unit_price * leg.quantity);

        self.engine.add_to_cost_basis(CostBasisLot {
            id: leg.id.clone(),
            asset,
            quantity: leg.quantity,
            cost_basis_usd,
            purchase_date: leg.timestamp,
            unit_price,
        });
    }

    fn dispose(&mut self, leg: &TransactionLeg, asset: &AssetKey) {
        let Some(sale_price) = leg.unit_price_usd() else {
            self.totals.unpriced_disposals += 1;
            debug!(leg = %leg.id, asset = %asset, "Skipping unpriced disposal");
            return;
        };

        let entries = self.engine.calculate_gains(
            asset,
            leg.quantity,
            sale_price,
            leg.timestamp,
            &leg.transaction_hash,
        );
        for entry in &entries {
            self.totals.record(entry);
        }
        self.realized.extend(entries);
    }

    pub fn finish(self) -> GainsReport {
        GainsReport {
            method: self.engine.method(),
            open_lots: self.engine.open_lots(),
            unmatched: self.engine.unmatched_sales().to_vec(),
            realized: self.realized,
            totals: self.totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Asset, Classification, Network};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn leg(hash: &str, day: i64, direction: Direction, qty: &str) -> TransactionLeg {
        TransactionLeg::new(
            Address::new("0xabc"),
            Network::new("ethereum"),
            hash,
            TimeMs::new(0).plus_days(day),
            direction,
            Asset::native("ETH", 18),
            d(qty),
        )
    }

    #[test]
    fn test_compile_buy_then_sell() {
        let legs = vec![
            leg("0x1", 0, Direction::In, "2").with_price(d("100")),
            leg("0x2", 400, Direction::Out, "1").with_price(d("150")),
        ];
        let report = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap();

        assert_eq!(report.realized.len(), 1);
        assert_eq!(report.realized[0].lot_id, legs[0].id);
        assert_eq!(report.realized[0].source_transaction_id, "0x2");
        assert_eq!(report.totals.gain_usd, d("50"));
        assert_eq!(report.totals.long_term_gain_usd, d("50"));
        assert_eq!(report.totals.short_term_gain_usd, Decimal::zero());
        assert_eq!(report.open_lots.len(), 1);
        assert_eq!(report.open_lots[0].quantity, d("1"));
    }

    #[test]
    fn test_cost_basis_prefers_reported_value() {
        let legs = vec![leg("0x1", 0, Direction::In, "2").with_pricing(Some(d("100")), Some(d("210")))];
        let report = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap();
        assert_eq!(report.open_lots[0].cost_basis_usd, d("210"));
    }

    #[test]
    fn test_unpriced_legs_are_counted_not_matched() {
        let legs = vec![
            leg("0x1", 0, Direction::In, "1"),
            leg("0x2", 1, Direction::Out, "1"),
        ];
        let report = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap();
        assert!(report.realized.is_empty());
        assert!(report.unmatched.is_empty());
        assert_eq!(report.totals.unpriced_acquisitions, 1);
        assert_eq!(report.totals.unpriced_disposals, 1);
    }

    #[test]
    fn test_gas_leg_is_a_disposal() {
        let legs = vec![
            leg("0x1", 0, Direction::In, "1").with_price(d("1000")),
            leg("0x2", 1, Direction::Out, "0.01")
                .with_classification(Classification::Gas)
                .with_price(d("1100")),
        ];
        let report = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap();
        assert_eq!(report.realized.len(), 1);
        assert_eq!(report.realized[0].quantity_sold, d("0.01"));
        assert_eq!(report.realized[0].gain_usd, d("1"));
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let legs = vec![
            leg("0x1", 5, Direction::In, "1").with_price(d("1")),
            leg("0x2", 1, Direction::In, "1").with_price(d("1")),
        ];
        let err = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap_err();
        assert!(matches!(err, CompileError::OutOfOrder { .. }));
    }

    #[test]
    fn test_zero_quantity_leg_is_ignored() {
        let legs = vec![leg("0x1", 0, Direction::Out, "0").with_price(d("5"))];
        let report = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap();
        assert!(report.unmatched.is_empty());
        assert_eq!(report.totals.unpriced_disposals, 0);
    }

    #[test]
    fn test_receive_and_forward_in_one_transaction_matches() {
        let mut legs = Vec::new();
        for i in 0..20 {
            let hash = format!("0x{:02x}", i);
            legs.push(leg(&hash, i, Direction::Out, "1").with_price(d("100")));
            legs.push(leg(&hash, i, Direction::In, "1").with_price(d("100")));
        }
        crate::domain::sort_legs_chronological(&mut legs);

        let report = GainsCompiler::compile(CostBasisMethod::Fifo, &legs).unwrap();
        assert!(report.unmatched.is_empty());
        assert!(report.open_lots.is_empty());
        assert_eq!(report.realized.len(), 20);
        assert_eq!(report.totals.gain_usd, Decimal::zero());
    }
}
