pub mod metrics;
pub mod orders;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::types::{ExchangeOrder, SideMap};
use metrics::Metrics;
use orders::OpenOrder;

/// Everything the engine persists between ticks: the per-side order slots,
/// the per-side terminal quantities, and the running metrics. A tick loads
/// this at the start and saves it only after completing fully.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotState {
    #[serde(default)]
    pub open_orders: SideMap<Option<OpenOrder>>,

    /// Quantity that, if filled, is known to exhaust that side's resources
    /// down to the minimum tradable unit. Read by the opposite side's sizing
    /// whenever this side has no live room left.
    #[serde(default)]
    pub terminal_quantity: SideMap<Option<f64>>,

    #[serde(default)]
    pub metrics: Metrics,

    /// Fills recorded this tick, drained into the history log at save time.
    #[serde(skip)]
    pub pending_history: Vec<ExchangeOrder>,
}

impl BotState {
    pub fn has_open_orders(&self) -> bool {
        self.open_orders.buy.is_some() || self.open_orders.sell.is_some()
    }

    pub fn record_base_tick(&mut self, price: f64, holdings: f64, buying_power: f64) {
        self.metrics.record_base_tick(price, holdings, buying_power);
    }

    pub fn record_fill(&mut self, order: &ExchangeOrder, for_rebalance: bool) {
        self.metrics.record_fill(order, for_rebalance);
        self.pending_history.push(order.clone());
    }

    pub fn record_rebalance_check(
        &mut self,
        current_price: f64,
        interval: u64,
        threshold: Option<f64>,
    ) -> Option<f64> {
        self.metrics
            .record_rebalance_check(current_price, interval, threshold)
    }
}
