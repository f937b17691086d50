use crate::models::{PerformancePoint, Positions, Snapshot};
use crate::panel::CrossSection;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Cash, signed share positions and the per-date valuation history of one backtest.
///
/// Money and shares only move through [`Ledger::apply_trade`] and
/// [`Ledger::set_position`]; snapshots are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    initial_capital: f64,
    cash: f64,
    positions: Positions,
    snapshots: Vec<Snapshot>,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            positions: Positions::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// May be negative while short proceeds or commissions are outstanding.
    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn get_position(&self, ticker: &str) -> f64 {
        self.positions.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn set_position(&mut self, ticker: &str, quantity: f64) {
        if quantity == 0.0 {
            self.positions.remove(ticker);
        } else {
            self.positions.insert(ticker.to_string(), quantity);
        }
    }

    /// Cash plus the marked value of every held ticker quoted in `prices`.
    ///
    /// A held ticker absent from `prices` contributes nothing, so a missing quote
    /// understates the total until the ticker is quoted again.
    pub fn value(&self, prices: &CrossSection) -> f64 {
        let holdings: f64 = self
            .positions
            .iter()
            .filter_map(|(ticker, quantity)| prices.get(ticker).map(|price| quantity * price))
            .sum();
        self.cash + holdings
    }

    /// Debits `delta_shares * price` plus commission on the absolute notional and
    /// returns the commission charged.
    pub fn apply_trade(
        &mut self,
        ticker: &str,
        delta_shares: f64,
        price: f64,
        commission_rate: f64,
    ) -> f64 {
        let notional = delta_shares * price;
        let commission = commission_rate * notional.abs();
        self.cash -= notional + commission;

        let updated = self.get_position(ticker) + delta_shares;
        self.set_position(ticker, updated);
        commission
    }

    pub fn record_snapshot(&mut self, date: NaiveDate, prices: &CrossSection) -> &Snapshot {
        debug_assert!(
            self.snapshots.last().map_or(true, |last| last.date < date),
            "snapshots must be recorded in ascending date order"
        );
        let snapshot = Snapshot {
            date,
            total_value: self.value(prices),
            cash: self.cash,
            num_positions: self.positions.len(),
            positions: self.positions.clone(),
        };
        self.snapshots.push(snapshot);
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn performance_frame(&self) -> Vec<PerformancePoint> {
        self.snapshots
            .iter()
            .map(|snapshot| PerformancePoint {
                date: snapshot.date,
                total_value: snapshot.total_value,
                cash: snapshot.cash,
                num_positions: snapshot.num_positions,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn prices(entries: &[(&str, f64)]) -> CrossSection {
        entries
            .iter()
            .map(|(ticker, price)| (ticker.to_string(), *price))
            .collect()
    }

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    #[test]
    fn set_position_to_zero_removes_entry() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.set_position("AAA", 5.0);
        assert_eq!(ledger.get_position("AAA"), 5.0);

        ledger.set_position("AAA", 0.0);
        assert!(!ledger.positions().contains_key("AAA"));
        assert_eq!(ledger.get_position("AAA"), 0.0);
    }

    #[test]
    fn apply_trade_debits_cash_and_commission() {
        let mut ledger = Ledger::new(10_000.0);
        let commission = ledger.apply_trade("AAA", 10.0, 50.0, 0.001);
        assert!((commission - 0.5).abs() < 1e-12);
        assert!((ledger.cash() - (10_000.0 - 500.0 - 0.5)).abs() < 1e-9);

        // Shorting credits proceeds, commission is still a cost
        ledger.apply_trade("BBB", -4.0, 25.0, 0.001);
        assert!((ledger.cash() - (10_000.0 - 500.5 + 100.0 - 0.1)).abs() < 1e-9);
        assert_eq!(ledger.get_position("BBB"), -4.0);
    }

    #[test]
    fn closing_trade_removes_position() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.apply_trade("AAA", 3.0, 10.0, 0.0);
        ledger.apply_trade("AAA", -3.0, 12.0, 0.0);
        assert!(ledger.positions().is_empty());
        assert!((ledger.cash() - 1_006.0).abs() < 1e-12);
    }

    #[test]
    fn zero_commission_trades_are_value_neutral() {
        let mut rng = StdRng::seed_from_u64(7);
        let tickers = ["AAA", "BBB", "CCC", "DDD"];
        let quotes: CrossSection = tickers
            .iter()
            .map(|ticker| (ticker.to_string(), rng.gen_range(5.0..500.0)))
            .collect();
        let mut ledger = Ledger::new(50_000.0);

        for _ in 0..200 {
            let ticker = tickers[rng.gen_range(0..tickers.len())];
            let delta = rng.gen_range(-40.0..40.0);
            let before = ledger.value(&quotes);
            ledger.apply_trade(ticker, delta, quotes[ticker], 0.0);
            assert!((ledger.value(&quotes) - before).abs() < 1e-6);
        }
    }

    #[test]
    fn positions_never_hold_zero_quantities() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut ledger = Ledger::new(10_000.0);
        for _ in 0..500 {
            let ticker = ["AAA", "BBB", "CCC"][rng.gen_range(0..3)];
            if rng.gen_bool(0.3) {
                let current = ledger.get_position(ticker);
                ledger.apply_trade(ticker, -current, 10.0, 0.001);
            } else if rng.gen_bool(0.2) {
                ledger.set_position(ticker, 0.0);
            } else {
                ledger.apply_trade(ticker, rng.gen_range(-5..=5) as f64, 10.0, 0.001);
            }
            assert!(ledger.positions().values().all(|quantity| *quantity != 0.0));
        }
    }

    #[test]
    fn unquoted_holdings_contribute_nothing() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.set_position("AAA", 2.0);
        ledger.set_position("BBB", -1.0);

        let partial = prices(&[("AAA", 100.0)]);
        assert!((ledger.value(&partial) - 1_200.0).abs() < 1e-12);

        let full = prices(&[("AAA", 100.0), ("BBB", 50.0)]);
        assert!((ledger.value(&full) - 1_150.0).abs() < 1e-12);
    }

    #[test]
    fn snapshots_capture_post_trade_state() {
        let mut ledger = Ledger::new(1_000.0);
        let quotes = prices(&[("AAA", 10.0)]);
        ledger.record_snapshot(day(1), &quotes);
        ledger.apply_trade("AAA", 10.0, 10.0, 0.01);
        let snapshot = ledger.record_snapshot(day(2), &quotes).clone();

        assert_eq!(snapshot.num_positions, 1);
        assert_eq!(snapshot.positions.get("AAA"), Some(&10.0));
        assert!((snapshot.cash - 899.0).abs() < 1e-12);
        assert!((snapshot.total_value - 999.0).abs() < 1e-12);

        let frame = ledger.performance_frame();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].date, day(1));
        assert_eq!(frame[0].total_value, 1_000.0);
    }
}
