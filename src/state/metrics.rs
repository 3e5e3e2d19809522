//! Running session counters: what filled, for how much, and how long the
//! ladder has been waiting. Also owns the rebalance accumulator.

use serde::{Deserialize, Serialize};

use crate::types::{ExchangeOrder, Side, SideMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideTotals {
    pub count: u64,
    pub order_value: f64,
    pub quantity: f64,
}

/// Accumulates the price over a run of ticks; the average becomes the
/// rebalance target once `count` reaches the configured interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceWindow {
    pub count: u64,
    pub total_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub initial_price: Option<f64>,
    pub initial_holdings: Option<f64>,
    pub initial_buying_power: Option<f64>,
    #[serde(default)]
    pub last_price: f64,
    pub ticks_from_start: Option<u64>,
    pub ticks_since_last_fill: Option<u64>,
    #[serde(default)]
    pub longest_ticks_between_fills: u64,
    #[serde(default)]
    pub sides: SideMap<SideTotals>,
    pub rebalance: Option<RebalanceWindow>,
}

/// Account position reconstructed purely from recorded fills, priced at the
/// last observed quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountValues {
    pub usd_gained: f64,
    pub coin_gained: f64,
    pub last_price: f64,
    pub holdings: f64,
    pub buying_power: f64,
    pub account_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSummary {
    pub usd_gained: f64,
    pub coin_gained: f64,
    pub account_value_change_percent: f64,
    pub price_change_percent: f64,
}

fn round_to(value: f64, digits: i32) -> f64 {
    let m = 10f64.powi(digits);
    (value * m).round() / m
}

impl Metrics {
    /// Record the tick snapshot: capture initial values once, advance the
    /// tick counters, and track the longest gap between fills.
    pub fn record_base_tick(&mut self, price: f64, holdings: f64, buying_power: f64) {
        self.initial_price.get_or_insert(price);
        self.initial_holdings.get_or_insert(holdings);
        self.initial_buying_power.get_or_insert(buying_power);

        self.ticks_from_start = Some(self.ticks_from_start.map_or(0, |t| t + 1));
        self.ticks_since_last_fill = Some(self.ticks_since_last_fill.map_or(0, |t| t + 1));

        if let Some(since) = self.ticks_since_last_fill {
            if since > self.longest_ticks_between_fills {
                self.longest_ticks_between_fills = since;
            }
        }

        self.last_price = price;
    }

    /// Record a fill. Rebalance fills count toward value/quantity totals but
    /// not toward the ladder's fill count or gap tracking. Any fill discards
    /// the current rebalance accumulation.
    pub fn record_fill(&mut self, order: &ExchangeOrder, for_rebalance: bool) {
        if !for_rebalance {
            self.ticks_since_last_fill = Some(0);
        }

        let totals = self.sides.get_mut(order.side);
        if !for_rebalance {
            totals.count += 1;
        }
        totals.order_value += order.executed_notional;
        totals.quantity += order.quantity.round();

        self.rebalance = None;
    }

    /// Drive the rebalance accumulator for this tick. Starts a fresh
    /// accumulation when none is running and the cash/asset value split has
    /// drifted past `threshold` (or unconditionally with no threshold), and
    /// returns the accumulated average price once `interval` ticks are in.
    pub fn record_rebalance_check(
        &mut self,
        current_price: f64,
        interval: u64,
        threshold: Option<f64>,
    ) -> Option<f64> {
        if self.rebalance.is_none() {
            if let Some(values) = self.account_values() {
                let buying_power_perc = values.buying_power / values.account_value;
                let holdings_perc = values.holdings * current_price / values.account_value;
                let deviated =
                    threshold.is_none_or(|t| (buying_power_perc - holdings_perc).abs() > t);
                if deviated {
                    self.rebalance = Some(RebalanceWindow::default());
                }
            }
        }

        if let Some(rebalance) = &mut self.rebalance {
            rebalance.count += 1;
            rebalance.total_price += current_price;

            if rebalance.count >= interval {
                return Some(rebalance.total_price / rebalance.count as f64);
            }
        }

        None
    }

    pub fn account_values(&self) -> Option<AccountValues> {
        self.initial_price?;

        let buys = self.sides.get(Side::Buy);
        let sells = self.sides.get(Side::Sell);
        let usd_gained = sells.order_value - buys.order_value;
        let coin_gained = buys.quantity - sells.quantity;
        let holdings = self.initial_holdings.unwrap_or(0.0) + coin_gained;
        let buying_power = self.initial_buying_power.unwrap_or(0.0) + usd_gained;

        Some(AccountValues {
            usd_gained,
            coin_gained,
            last_price: self.last_price,
            holdings,
            buying_power,
            account_value: holdings * self.last_price + buying_power,
        })
    }

    pub fn summary(&self) -> Option<MetricsSummary> {
        let values = self.account_values()?;
        let initial_price = self.initial_price?;

        let initial_account_value = self.initial_holdings.unwrap_or(0.0) * initial_price
            + self.initial_buying_power.unwrap_or(0.0);

        Some(MetricsSummary {
            usd_gained: round_to(values.usd_gained, 2),
            coin_gained: round_to(values.coin_gained, 0),
            account_value_change_percent: round_to(
                values.account_value / initial_account_value,
                5,
            ),
            price_change_percent: round_to(values.last_price / initial_price, 5),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderState;

    fn fill(side: Side, quantity: f64, notional: f64) -> ExchangeOrder {
        ExchangeOrder {
            id: Some("x".to_string()),
            side,
            state: OrderState::Filled,
            quantity,
            price: notional / quantity,
            average_price: Some(notional / quantity),
            executed_notional: notional,
            last_transaction_at: None,
        }
    }

    #[test]
    fn base_tick_counters() {
        let mut m = Metrics::default();
        m.record_base_tick(10.0, 100.0, 1000.0);
        assert_eq!(m.ticks_from_start, Some(0));
        assert_eq!(m.ticks_since_last_fill, Some(0));
        assert_eq!(m.initial_price, Some(10.0));

        m.record_base_tick(11.0, 100.0, 1000.0);
        m.record_base_tick(12.0, 100.0, 1000.0);
        assert_eq!(m.ticks_from_start, Some(2));
        assert_eq!(m.longest_ticks_between_fills, 2);
        // initial values captured once
        assert_eq!(m.initial_price, Some(10.0));
        assert_eq!(m.last_price, 12.0);
    }

    #[test]
    fn fills_reset_the_gap_and_accumulate_totals() {
        let mut m = Metrics::default();
        m.record_base_tick(10.0, 100.0, 1000.0);
        m.record_base_tick(10.0, 100.0, 1000.0);

        m.record_fill(&fill(Side::Sell, 5.0, 55.0), false);
        assert_eq!(m.ticks_since_last_fill, Some(0));
        assert_eq!(m.sides.sell.count, 1);
        assert_eq!(m.sides.sell.order_value, 55.0);
        assert_eq!(m.sides.sell.quantity, 5.0);

        // rebalance fills accumulate value but not the fill count
        m.record_fill(&fill(Side::Buy, 2.0, 20.0), true);
        assert_eq!(m.sides.buy.count, 0);
        assert_eq!(m.sides.buy.order_value, 20.0);
    }

    #[test]
    fn account_values_reconstruct_from_fills() {
        let mut m = Metrics::default();
        m.record_base_tick(10.0, 100.0, 1000.0);
        m.record_fill(&fill(Side::Sell, 10.0, 110.0), false);
        m.record_fill(&fill(Side::Buy, 4.0, 36.0), false);

        let values = m.account_values().unwrap();
        assert_eq!(values.usd_gained, 74.0);
        assert_eq!(values.coin_gained, -6.0);
        assert_eq!(values.holdings, 94.0);
        assert_eq!(values.buying_power, 1074.0);
        assert_eq!(values.account_value, 94.0 * 10.0 + 1074.0);
    }

    #[test]
    fn rebalance_accumulates_to_an_average() {
        let mut m = Metrics::default();
        m.record_base_tick(10.0, 0.0, 1000.0);

        // all-cash account deviates well past the threshold
        assert_eq!(m.record_rebalance_check(10.0, 3, Some(0.1)), None);
        assert_eq!(m.record_rebalance_check(11.0, 3, Some(0.1)), None);
        let target = m.record_rebalance_check(12.0, 3, Some(0.1)).unwrap();
        assert!((target - 11.0).abs() < 1e-9);
    }

    #[test]
    fn balanced_account_never_starts_accumulating() {
        let mut m = Metrics::default();
        m.record_base_tick(10.0, 100.0, 1000.0);

        // holdings value == cash, deviation 0
        assert_eq!(m.record_rebalance_check(10.0, 1, Some(0.05)), None);
        assert!(m.rebalance.is_none());
    }

    #[test]
    fn a_fill_discards_the_running_accumulation() {
        let mut m = Metrics::default();
        m.record_base_tick(10.0, 0.0, 1000.0);
        m.record_rebalance_check(10.0, 5, None);
        assert!(m.rebalance.is_some());

        m.record_fill(&fill(Side::Buy, 1.0, 10.0), false);
        assert!(m.rebalance.is_none());
    }
}
