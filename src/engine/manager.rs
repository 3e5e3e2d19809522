//! Order lifecycle: one tick of fill detection, window narrowing and
//! order replacement against a generic backend.

use crate::config::LadderConfig;
use crate::exec::{OrderService, ServiceError};
use crate::state::BotState;
use crate::state::orders::OpenOrder;
use crate::types::{ExchangeOrder, OrderState, Side, SideMap, price_floor};

use super::Snapshot;
use super::window::{OrderDetails, next_order_details};

/// Drives a two-sided ladder over any [`OrderService`] backend. Holds the
/// persistent [`BotState`] plus the per-tick cache of backend order records.
pub struct OrderManager<S> {
    pub(crate) cfg: LadderConfig,
    pub(crate) service: S,
    pub(crate) state: BotState,
    pub(crate) backend_orders: SideMap<Option<ExchangeOrder>>,
}

impl<S: OrderService> OrderManager<S> {
    pub fn new(cfg: LadderConfig, service: S, state: BotState) -> Self {
        Self {
            cfg,
            service,
            state,
            backend_orders: SideMap::default(),
        }
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BotState {
        &mut self.state
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Fetch everything a single tick needs from the backend: the quote,
    /// account balances, and the live record of each tracked order.
    pub async fn refresh_snapshot(&mut self) -> Result<Snapshot, ServiceError> {
        let price = self.service.quote().await?;
        let holdings = self.service.holdings().await?;
        let buying_power = self.service.buying_power().await?;

        for side in Side::BOTH {
            let slot_id = self
                .state
                .open_orders
                .get(side)
                .as_ref()
                .map(|slot| slot.id.clone());
            *self.backend_orders.get_mut(side) = match slot_id {
                Some(id) => Some(self.service.order_info(&id).await?),
                None => None,
            };
        }

        Ok(Snapshot {
            price,
            holdings,
            buying_power,
        })
    }

    /// One tick: refresh the snapshot, record metrics, process fills and
    /// window narrowing, then give rebalancing a chance to act.
    pub async fn run(&mut self) -> Result<(), ServiceError> {
        let snap = self.refresh_snapshot().await?;
        self.state
            .record_base_tick(snap.price, snap.holdings, snap.buying_power);
        self.check_orders(snap).await?;
        self.check_rebalance(snap).await
    }

    /// Detect fills and replace both sides anchored at the fill; otherwise
    /// age the windows and re-place any order whose window narrowed.
    async fn check_orders(&mut self, snap: Snapshot) -> Result<(), ServiceError> {
        if !self.state.has_open_orders() {
            return self.create_new_orders(snap, None).await;
        }

        let sell_fill = filled(&self.backend_orders.sell);
        let buy_fill = filled(&self.backend_orders.buy);

        match (sell_fill, buy_fill) {
            (Some(sell), Some(buy)) => {
                self.record_filled(&sell);
                self.record_filled(&buy);
                // Both sides filled since the last tick: anchor on whichever
                // executed later.
                let filled_side = if buy.last_transaction_at > sell.last_transaction_at {
                    Side::Buy
                } else {
                    Side::Sell
                };
                self.replace_orders(snap, filled_side).await
            }
            (Some(sell), None) => {
                self.record_filled(&sell);
                self.replace_orders(snap, Side::Sell).await
            }
            (None, Some(buy)) => {
                self.record_filled(&buy);
                self.replace_orders(snap, Side::Buy).await
            }
            (None, None) => {
                tracing::debug!("no orders filled");
                for side in Side::BOTH {
                    if self.decrement_window(side) {
                        let Some(slot) = self.state.open_orders.get(side) else {
                            continue;
                        };
                        let base_price = slot.base_price;
                        let window_size = self.window_size_for(slot.window_duration_remaining);
                        let details = next_order_details(
                            &self.cfg,
                            &snap,
                            &mut self.state.terminal_quantity,
                            side,
                            base_price,
                            window_size,
                        );
                        self.place_order(side, base_price, details).await?;
                    }
                }
                Ok(())
            }
        }
    }

    fn record_filled(&mut self, order: &ExchangeOrder) {
        tracing::info!(
            side = order.side.as_str(),
            id = order.id.as_deref().unwrap_or(""),
            quantity = order.quantity,
            notional = order.executed_notional,
            "order filled"
        );
        self.state.record_fill(order, false);
    }

    /// Re-place both sides anchored at the filled slot's request price.
    async fn replace_orders(
        &mut self,
        snap: Snapshot,
        filled_side: Side,
    ) -> Result<(), ServiceError> {
        let Some(filled_slot) = self.state.open_orders.get(filled_side) else {
            return Ok(());
        };
        let anchor_price = filled_slot.price;

        for side in Side::BOTH {
            let mut window_size = self
                .state
                .open_orders
                .get(side)
                .as_ref()
                .map_or(0, |slot| self.window_size_for(slot.window_duration_remaining));
            // The filled side starts one window wider so a run in one
            // direction does not churn orders at every rung.
            if side == filled_side && self.cfg.window_duration.is_some() {
                window_size += 1;
            }

            let details = next_order_details(
                &self.cfg,
                &snap,
                &mut self.state.terminal_quantity,
                side,
                anchor_price,
                window_size,
            );
            self.place_order(side, anchor_price, details).await?;
        }
        Ok(())
    }

    /// Place a fresh pair of orders anchored at `base_price`, or the current
    /// quote when none is given.
    pub(crate) async fn create_new_orders(
        &mut self,
        snap: Snapshot,
        base_price: Option<f64>,
    ) -> Result<(), ServiceError> {
        let anchor = base_price.unwrap_or(snap.price);

        let sell = next_order_details(
            &self.cfg,
            &snap,
            &mut self.state.terminal_quantity,
            Side::Sell,
            anchor,
            0,
        );
        let buy = next_order_details(
            &self.cfg,
            &snap,
            &mut self.state.terminal_quantity,
            Side::Buy,
            anchor,
            0,
        );

        tracing::debug!(buy_price = buy.price, sell_price = sell.price, "next prices");
        self.place_order(Side::Sell, anchor, sell).await?;
        self.place_order(Side::Buy, anchor, buy).await
    }

    /// Age this side's window by one tick. Returns true when the order
    /// should be canceled and re-created with a narrower price window.
    fn decrement_window(&mut self, side: Side) -> bool {
        if self.state.open_orders.get(side).is_none() {
            return false;
        }

        if self.cfg.window_duration.is_some() {
            if let Some(slot) = self.state.open_orders.get_mut(side) {
                slot.window_duration_remaining = slot.window_duration_remaining.saturating_sub(1);
            }
        }

        self.should_replace_order(side)
    }

    fn should_replace_order(&self, side: Side) -> bool {
        let Some(slot) = self.state.open_orders.get(side) else {
            return false;
        };

        if slot.force_replace {
            return true;
        }
        if self
            .backend_orders
            .get(side)
            .as_ref()
            .is_some_and(|order| order.state.needs_replace())
        {
            return true;
        }

        if self.cfg.window_duration.is_none() {
            return false;
        }
        slot.window_size > self.window_size_for(slot.window_duration_remaining)
    }

    fn window_size_for(&self, duration_remaining: u64) -> u64 {
        match self.cfg.window_duration {
            Some(duration) if duration > 0 => duration_remaining.div_ceil(duration),
            _ => 0,
        }
    }

    /// Apply one resolved order to the backend. May instead drop the slot
    /// (zero quantity), leave it untouched (same anchor, nothing to replace)
    /// or cancel the live order and defer placement to the next tick.
    async fn place_order(
        &mut self,
        side: Side,
        base_price: f64,
        details: OrderDetails,
    ) -> Result<(), ServiceError> {
        if details.quantity == 0.0 {
            // This side cannot be sized right now; drop the slot and let a
            // later tick recreate it.
            if self.state.open_orders.get(side).is_some() {
                tracing::info!(side = side.as_str(), "dropping unsizable order slot");
            }
            *self.state.open_orders.get_mut(side) = None;
            return Ok(());
        }

        if let Some(slot) = self.state.open_orders.get(side) {
            if slot.base_price == base_price && !self.should_replace_order(side) {
                return Ok(());
            }

            if self
                .backend_orders
                .get(side)
                .as_ref()
                .is_some_and(|order| order.state.is_open())
            {
                // Cancel now and record the new anchor; the replacement goes
                // out on the next tick once the backend confirms the cancel.
                let id = slot.id.clone();
                tracing::info!(side = side.as_str(), id, "canceling order");
                self.service.cancel_order(&id).await?;
                if let Some(slot) = self.state.open_orders.get_mut(side) {
                    slot.base_price = base_price;
                }
                return Ok(());
            }
        }

        let window_duration_remaining =
            details.window_size * self.cfg.window_duration.unwrap_or(0);
        let limit_price = price_floor(details.price);
        let placed = match side {
            Side::Sell => self.service.sell_limit(details.quantity, limit_price).await,
            Side::Buy => self.service.buy_limit(details.quantity, limit_price).await,
        };

        match placed {
            Ok(order) => match order.id.clone() {
                Some(id) => {
                    tracing::info!(
                        side = side.as_str(),
                        id,
                        price = limit_price,
                        quantity = details.quantity,
                        window_size = details.window_size,
                        "new order"
                    );
                    *self.state.open_orders.get_mut(side) = Some(OpenOrder {
                        id,
                        base_price,
                        price: details.price,
                        quantity: details.quantity,
                        window_size: details.window_size,
                        window_duration_remaining,
                        force_replace: false,
                    });
                    *self.backend_orders.get_mut(side) = Some(order);
                }
                None => {
                    tracing::warn!(side = side.as_str(), "backend declined order");
                }
            },
            Err(ServiceError::InsufficientResource(reason)) => {
                tracing::warn!(
                    side = side.as_str(),
                    reason,
                    price = limit_price,
                    quantity = details.quantity,
                    "order rejected"
                );
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

fn filled(order: &Option<ExchangeOrder>) -> Option<ExchangeOrder> {
    order
        .clone()
        .filter(|order| order.state == OrderState::Filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    struct FakeService {
        price: f64,
        holdings: f64,
        buying_power: f64,
        orders: HashMap<String, ExchangeOrder>,
        next_id: u32,
        canceled: Vec<String>,
        placed: Vec<(Side, f64, f64)>,
    }

    impl FakeService {
        fn new(price: f64, holdings: f64, buying_power: f64) -> Self {
            Self {
                price,
                holdings,
                buying_power,
                orders: HashMap::new(),
                next_id: 0,
                canceled: Vec::new(),
                placed: Vec::new(),
            }
        }

        fn submit(&mut self, side: Side, quantity: f64, price: f64) -> ExchangeOrder {
            self.next_id += 1;
            let id = format!("fake-{}", self.next_id);
            let order = ExchangeOrder {
                id: Some(id.clone()),
                side,
                state: OrderState::Confirmed,
                quantity,
                price,
                average_price: None,
                executed_notional: 0.0,
                last_transaction_at: None,
            };
            self.orders.insert(id, order.clone());
            self.placed.push((side, quantity, price));
            order
        }

        fn mark_filled(&mut self, id: &str, at_secs: i64) {
            let order = self.orders.get_mut(id).unwrap();
            order.state = OrderState::Filled;
            order.average_price = Some(order.price);
            order.executed_notional = order.price * order.quantity;
            order.last_transaction_at = Some(Utc.timestamp_opt(at_secs, 0).unwrap());
        }
    }

    impl OrderService for FakeService {
        async fn quote(&mut self) -> Result<f64, ServiceError> {
            Ok(self.price)
        }

        async fn holdings(&mut self) -> Result<f64, ServiceError> {
            Ok(self.holdings)
        }

        async fn buying_power(&mut self) -> Result<f64, ServiceError> {
            Ok(self.buying_power)
        }

        async fn order_info(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError> {
            self.orders
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::UnknownOrder(id.to_string()))
        }

        async fn cancel_order(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError> {
            self.canceled.push(id.to_string());
            let order = self
                .orders
                .get_mut(id)
                .ok_or_else(|| ServiceError::UnknownOrder(id.to_string()))?;
            order.state = OrderState::Canceled;
            Ok(order.clone())
        }

        async fn buy_limit(
            &mut self,
            quantity: f64,
            price: f64,
        ) -> Result<ExchangeOrder, ServiceError> {
            Ok(self.submit(Side::Buy, quantity, price))
        }

        async fn sell_limit(
            &mut self,
            quantity: f64,
            price: f64,
        ) -> Result<ExchangeOrder, ServiceError> {
            Ok(self.submit(Side::Sell, quantity, price))
        }

        async fn buy_market(&mut self, value: f64) -> Result<ExchangeOrder, ServiceError> {
            let quantity = value / self.price;
            let mut order = self.submit(Side::Buy, quantity, self.price);
            order.state = OrderState::Filled;
            order.executed_notional = value;
            order.average_price = Some(self.price);
            Ok(order)
        }

        async fn sell_market(&mut self, quantity: f64) -> Result<ExchangeOrder, ServiceError> {
            let mut order = self.submit(Side::Sell, quantity, self.price);
            order.state = OrderState::Filled;
            order.executed_notional = quantity * self.price;
            order.average_price = Some(self.price);
            Ok(order)
        }
    }

    fn cfg() -> LadderConfig {
        LadderConfig {
            price_increment_ratio: 1.1,
            order_quantity_ratio: 0.1,
            order_holdings_threshold: 0.25,
            window_duration: Some(2),
            window_factor: 1.0,
            round_quantity_digits: 0,
            rebalance_interval: None,
            rebalance_threshold: None,
        }
    }

    fn manager(cfg: LadderConfig) -> OrderManager<FakeService> {
        OrderManager::new(
            cfg,
            FakeService::new(100.0, 100.0, 10_000.0),
            BotState::default(),
        )
    }

    #[tokio::test]
    async fn first_run_places_a_sell_and_a_buy() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();

        let sell = mgr.state.open_orders.sell.as_ref().unwrap();
        let buy = mgr.state.open_orders.buy.as_ref().unwrap();
        assert_eq!(sell.base_price, 100.0);
        assert_eq!(buy.base_price, 100.0);
        assert!((sell.price - 110.0).abs() < 1e-9);
        assert!((buy.price - 100.0 / 1.1).abs() < 1e-9);
        assert_eq!(mgr.service.placed.len(), 2);
        // sell goes out first
        assert_eq!(mgr.service.placed[0].0, Side::Sell);
        assert!(mgr.backend_orders.sell.is_some());
        assert!(mgr.backend_orders.buy.is_some());
    }

    #[tokio::test]
    async fn unchanged_orders_are_left_alone() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();
        let placed = mgr.service.placed.len();

        mgr.run().await.unwrap();
        mgr.run().await.unwrap();
        assert_eq!(mgr.service.placed.len(), placed);
        assert!(mgr.service.canceled.is_empty());
    }

    #[tokio::test]
    async fn a_fill_re_anchors_both_sides() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();

        let sell_id = mgr.state.open_orders.sell.as_ref().unwrap().id.clone();
        let sell_price = mgr.state.open_orders.sell.as_ref().unwrap().price;
        let buy_id = mgr.state.open_orders.buy.as_ref().unwrap().id.clone();
        mgr.service.mark_filled(&sell_id, 1_000);
        mgr.service.price = sell_price;

        mgr.run().await.unwrap();

        let new_sell = mgr.state.open_orders.sell.as_ref().unwrap();
        let new_buy = mgr.state.open_orders.buy.as_ref().unwrap();
        assert_ne!(new_sell.id, sell_id);
        assert_eq!(new_sell.base_price, sell_price);
        // the filled side starts one window wider
        assert_eq!(new_sell.window_size, 1);
        assert_eq!(new_sell.window_duration_remaining, 2);
        assert_eq!(new_buy.window_size, 0);

        // the still-open buy was canceled before being re-anchored
        assert!(mgr.service.canceled.contains(&buy_id));
        assert_eq!(mgr.state.open_orders.buy.as_ref().unwrap().id, buy_id);
        assert_eq!(new_buy.base_price, sell_price);

        assert_eq!(mgr.state.metrics.sides.sell.count, 1);
        assert_eq!(mgr.state.pending_history.len(), 1);
    }

    #[tokio::test]
    async fn deferred_replacement_lands_on_the_following_tick() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();

        let sell_id = mgr.state.open_orders.sell.as_ref().unwrap().id.clone();
        let buy_id = mgr.state.open_orders.buy.as_ref().unwrap().id.clone();
        mgr.service.mark_filled(&sell_id, 1_000);

        // tick 1 cancels the buy, tick 2 re-places it
        mgr.run().await.unwrap();
        assert!(mgr.service.canceled.contains(&buy_id));
        mgr.run().await.unwrap();
        assert_ne!(mgr.state.open_orders.buy.as_ref().unwrap().id, buy_id);
    }

    #[tokio::test]
    async fn double_fill_anchors_on_the_later_transaction() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();

        let sell_id = mgr.state.open_orders.sell.as_ref().unwrap().id.clone();
        let buy_id = mgr.state.open_orders.buy.as_ref().unwrap().id.clone();
        let buy_price = mgr.state.open_orders.buy.as_ref().unwrap().price;
        mgr.service.mark_filled(&sell_id, 1_000);
        mgr.service.mark_filled(&buy_id, 2_000);

        mgr.run().await.unwrap();

        // the buy executed later, so both sides anchor at its price
        assert_eq!(
            mgr.state.open_orders.sell.as_ref().unwrap().base_price,
            buy_price
        );
        assert_eq!(mgr.state.metrics.sides.sell.count, 1);
        assert_eq!(mgr.state.metrics.sides.buy.count, 1);
    }

    #[tokio::test]
    async fn window_narrowing_cancels_and_re_places() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();

        // widen the stored sell window by hand: size 1, two ticks remaining
        {
            let slot = mgr.state.open_orders.sell.as_mut().unwrap();
            slot.window_size = 1;
            slot.window_duration_remaining = 2;
        }
        let sell_id = mgr.state.open_orders.sell.as_ref().unwrap().id.clone();

        // remaining 2 -> 1, ceil(1/2) = 1, still current
        mgr.run().await.unwrap();
        assert!(mgr.service.canceled.is_empty());

        // remaining 1 -> 0, window narrows to 0: cancel and defer
        mgr.run().await.unwrap();
        assert!(mgr.service.canceled.contains(&sell_id));

        // the canceled backend state triggers the replacement
        mgr.run().await.unwrap();
        let slot = mgr.state.open_orders.sell.as_ref().unwrap();
        assert_ne!(slot.id, sell_id);
        assert_eq!(slot.window_size, 0);
    }

    #[tokio::test]
    async fn zero_quantity_drops_the_slot() {
        let mut mgr = manager(cfg());
        mgr.service.buying_power = 0.5;
        mgr.run().await.unwrap();

        assert!(mgr.state.open_orders.sell.is_some());
        assert!(mgr.state.open_orders.buy.is_none());
        assert_eq!(mgr.service.placed.len(), 1);
    }

    #[tokio::test]
    async fn force_replace_cancels_on_the_next_tick() {
        let mut mgr = manager(cfg());
        mgr.run().await.unwrap();
        let sell_id = mgr.state.open_orders.sell.as_ref().unwrap().id.clone();
        mgr.state.open_orders.sell.as_mut().unwrap().force_replace = true;

        mgr.run().await.unwrap();
        assert!(mgr.service.canceled.contains(&sell_id));
    }
}
