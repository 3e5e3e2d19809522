//! 50/50 rebalancing: when the cash/asset split drifts and stays drifted,
//! move half the account back to each side with a market order and re-ladder
//! around the new balance.

use crate::exec::{OrderService, ServiceError};
use crate::types::{OrderState, Side};

use super::Snapshot;
use super::manager::OrderManager;

impl<S: OrderService> OrderManager<S> {
    /// Run the rebalance accumulator for this tick and execute a rebalance
    /// when it matures. No-op unless an interval is configured.
    pub(crate) async fn check_rebalance(&mut self, snap: Snapshot) -> Result<(), ServiceError> {
        let Some(interval) = self.cfg.rebalance_interval else {
            return Ok(());
        };
        let Some(to_price) =
            self.state
                .record_rebalance_check(snap.price, interval, self.cfg.rebalance_threshold)
        else {
            return Ok(());
        };

        tracing::info!(
            holdings = snap.holdings,
            buying_power = snap.buying_power,
            to_price,
            "rebalancing"
        );

        let target_holdings = snap.total_holdings(to_price) / 2.0;
        let target_cash_value = snap.account_value(to_price) / 2.0;

        // Cancel resting orders first, otherwise the market order would be
        // competing with them for the same balance.
        for side in Side::BOTH {
            let open_id = self
                .backend_orders
                .get(side)
                .as_ref()
                .filter(|order| order.state.is_open())
                .and_then(|order| order.id.clone());
            if let Some(id) = open_id {
                tracing::info!(side = side.as_str(), id, "canceling order for rebalance");
                self.service.cancel_order(&id).await?;
            }
        }

        let order = if snap.buying_power > target_cash_value {
            let buy_value = snap.buying_power - target_cash_value;
            tracing::info!(value = buy_value, "rebalance purchase");
            Some(self.service.buy_market(buy_value).await?)
        } else if target_holdings < snap.holdings {
            let sell_quantity = self.cfg.quantity_floor(snap.holdings - target_holdings);
            tracing::info!(quantity = sell_quantity, "rebalance sale");
            Some(self.service.sell_market(sell_quantity).await?)
        } else {
            None
        };

        if let Some(order) = order {
            if order.id.is_some() && order.state == OrderState::Filled {
                self.state.record_fill(&order, true);

                // Balances and tracked orders changed under us; re-read them
                // before laddering around the new split.
                let snap = self.refresh_snapshot().await?;
                self.create_new_orders(snap, None).await?;
            } else {
                tracing::warn!(
                    side = order.side.as_str(),
                    state = ?order.state,
                    "rebalance order did not fill"
                );
            }
        }

        Ok(())
    }
}
