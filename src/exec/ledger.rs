//! Locally simulated account state: holdings, buying power, and at most one
//! resting limit order per side. A backend composes this with a quote source
//! to satisfy the full `OrderService` contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::ServiceError;
use crate::types::{BUY_ORDER_COLLAR, ExchangeOrder, OrderState, SELL_ORDER_COLLAR, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLedger {
    pub holdings: f64,
    pub buying_power: f64,
    pub buy_order: Option<ExchangeOrder>,
    pub sell_order: Option<ExchangeOrder>,
}

impl LocalLedger {
    pub fn new(holdings: f64, buying_power: f64) -> Self {
        Self {
            holdings,
            buying_power,
            buy_order: None,
            sell_order: None,
        }
    }

    fn new_order(side: Side, price: f64, quantity: f64) -> ExchangeOrder {
        ExchangeOrder {
            id: Some(format!("sim-{}", Uuid::new_v4())),
            side,
            state: OrderState::Confirmed,
            quantity,
            price,
            average_price: None,
            executed_notional: 0.0,
            last_transaction_at: None,
        }
    }

    pub fn order_info(&self, id: &str) -> Option<ExchangeOrder> {
        [&self.buy_order, &self.sell_order]
            .into_iter()
            .find_map(|slot| {
                slot.as_ref()
                    .filter(|o| o.id.as_deref() == Some(id))
                    .cloned()
            })
    }

    pub fn cancel(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError> {
        for slot in [&mut self.buy_order, &mut self.sell_order] {
            if let Some(order) = slot {
                if order.id.as_deref() == Some(id) {
                    if order.state.is_open() {
                        order.state = OrderState::Canceled;
                    }
                    return Ok(order.clone());
                }
            }
        }
        Err(ServiceError::UnknownOrder(id.to_string()))
    }

    pub fn buy_limit(&mut self, quantity: f64, price: f64) -> Result<ExchangeOrder, ServiceError> {
        self.check_buying_power(price * quantity)?;
        let order = Self::new_order(Side::Buy, price, quantity);
        self.buy_order = Some(order.clone());
        Ok(order)
    }

    pub fn sell_limit(&mut self, quantity: f64, price: f64) -> Result<ExchangeOrder, ServiceError> {
        self.check_holdings(quantity)?;
        let order = Self::new_order(Side::Sell, price, quantity);
        self.sell_order = Some(order.clone());
        Ok(order)
    }

    /// Immediate buy of `value` cash worth at the collared quote. The filled
    /// order is returned but not stored; resting slots are untouched.
    pub fn buy_market(
        &mut self,
        value: f64,
        quote: f64,
        at: DateTime<Utc>,
    ) -> Result<ExchangeOrder, ServiceError> {
        let price = quote * BUY_ORDER_COLLAR;
        let quantity = value / price;
        self.take_buying_power(value)?;
        self.holdings += quantity;

        let mut order = Self::new_order(Side::Buy, price, quantity);
        Self::fill(&mut order, price, value, at);
        Ok(order)
    }

    /// Immediate sell of `quantity` units at the collared quote.
    pub fn sell_market(
        &mut self,
        quantity: f64,
        quote: f64,
        at: DateTime<Utc>,
    ) -> Result<ExchangeOrder, ServiceError> {
        let price = quote * SELL_ORDER_COLLAR;
        let value = price * quantity;
        self.take_holdings(quantity)?;
        self.buying_power += value;

        let mut order = Self::new_order(Side::Sell, price, quantity);
        Self::fill(&mut order, price, value, at);
        Ok(order)
    }

    /// Fill any resting order the bar's low/high crossed, collar-adjusted.
    /// Filled orders keep their slot (state `Filled`) so later `order_info`
    /// queries still see them; only a fresh limit replaces them.
    pub fn check_orders(
        &mut self,
        low: f64,
        high: f64,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(order) = &self.buy_order {
            if order.state.is_open() && order.price > low * BUY_ORDER_COLLAR {
                let (price, quantity) = (order.price, order.quantity);
                let notional = price * quantity;
                self.take_buying_power(notional)?;
                self.holdings += quantity;
                if let Some(order) = &mut self.buy_order {
                    Self::fill(order, price, notional, at);
                    debug!(price, quantity, "buy order filled");
                }
            }
        }

        if let Some(order) = &self.sell_order {
            if order.state.is_open() && order.price < high * SELL_ORDER_COLLAR {
                let (price, quantity) = (order.price, order.quantity);
                let notional = price * quantity;
                self.take_holdings(quantity)?;
                self.buying_power += notional;
                if let Some(order) = &mut self.sell_order {
                    Self::fill(order, price, notional, at);
                    debug!(price, quantity, "sell order filled");
                }
            }
        }

        Ok(())
    }

    fn fill(order: &mut ExchangeOrder, price: f64, notional: f64, at: DateTime<Utc>) {
        order.state = OrderState::Filled;
        order.average_price = Some(price);
        order.executed_notional = notional;
        order.last_transaction_at = Some(at);
    }

    fn check_holdings(&self, quantity: f64) -> Result<(), ServiceError> {
        if quantity > self.holdings {
            return Err(ServiceError::InsufficientResource(format!(
                "selling {} with only {} held",
                quantity, self.holdings
            )));
        }
        Ok(())
    }

    fn take_holdings(&mut self, quantity: f64) -> Result<(), ServiceError> {
        self.check_holdings(quantity)?;
        self.holdings -= quantity;
        Ok(())
    }

    fn check_buying_power(&self, value: f64) -> Result<(), ServiceError> {
        if value > self.buying_power {
            return Err(ServiceError::InsufficientResource(format!(
                "buying ${} with only ${} available",
                value, self.buying_power
            )));
        }
        Ok(())
    }

    fn take_buying_power(&mut self, value: f64) -> Result<(), ServiceError> {
        self.check_buying_power(value)?;
        self.buying_power -= value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn limit_orders_validate_resources() {
        let mut ledger = LocalLedger::new(10.0, 100.0);

        assert!(ledger.sell_limit(5.0, 2.0).is_ok());
        assert!(matches!(
            ledger.sell_limit(11.0, 2.0),
            Err(ServiceError::InsufficientResource(_))
        ));

        assert!(ledger.buy_limit(10.0, 10.0).is_ok());
        assert!(matches!(
            ledger.buy_limit(11.0, 10.0),
            Err(ServiceError::InsufficientResource(_))
        ));
    }

    #[test]
    fn bar_crossing_fills_with_collar() {
        let mut ledger = LocalLedger::new(10.0, 100.0);
        let buy = ledger.buy_limit(5.0, 9.0).unwrap();
        ledger.check_orders(9.1, 9.5, now()).unwrap();
        // low * collar is above the limit price, no fill yet
        assert!(
            ledger
                .order_info(buy.id.as_deref().unwrap())
                .unwrap()
                .state
                .is_open()
        );

        ledger.check_orders(8.9, 9.5, now()).unwrap();
        let filled = ledger.order_info(buy.id.as_deref().unwrap()).unwrap();
        assert_eq!(filled.state, OrderState::Filled);
        assert_eq!(ledger.holdings, 15.0);
        assert_eq!(ledger.buying_power, 100.0 - 45.0);
        assert!(filled.last_transaction_at.is_some());
    }

    #[test]
    fn market_orders_fill_immediately_and_keep_resting_slots() {
        let mut ledger = LocalLedger::new(10.0, 1000.0);
        let resting = ledger.sell_limit(2.0, 150.0).unwrap();

        let order = ledger.buy_market(100.0, 100.0, now()).unwrap();
        assert_eq!(order.state, OrderState::Filled);
        assert!((ledger.buying_power - 900.0).abs() < 1e-9);
        assert!(ledger.holdings > 10.0);

        // the resting sell survives a market buy
        let still = ledger.order_info(resting.id.as_deref().unwrap()).unwrap();
        assert!(still.state.is_open());
    }

    #[test]
    fn cancel_marks_open_orders_only() {
        let mut ledger = LocalLedger::new(10.0, 100.0);
        let order = ledger.sell_limit(1.0, 20.0).unwrap();
        let id = order.id.as_deref().unwrap().to_string();

        let canceled = ledger.cancel(&id).unwrap();
        assert_eq!(canceled.state, OrderState::Canceled);

        // cancelling again is a no-op on the state
        let again = ledger.cancel(&id).unwrap();
        assert_eq!(again.state, OrderState::Canceled);

        assert!(matches!(
            ledger.cancel("missing"),
            Err(ServiceError::UnknownOrder(_))
        ));
    }
}
