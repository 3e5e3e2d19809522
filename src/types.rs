use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Margin applied to the live quote when pricing an immediate (market-style)
/// buy, so the executable price clears the spread. The sell collar is the
/// reciprocal.
pub const BUY_ORDER_COLLAR: f64 = 1.0025;
pub const SELL_ORDER_COLLAR: f64 = 1.0 / BUY_ORDER_COLLAR;

const PRICE_FLOOR_MULTIPLIER: f64 = 1e5;

/// Floor a price to 5 decimal digits before submission. Floor, never round:
/// rounding up can request more resource than the account actually holds.
pub fn price_floor(price: f64) -> f64 {
    (price * PRICE_FLOOR_MULTIPLIER).floor() / PRICE_FLOOR_MULTIPLIER
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Buy, Side::Sell];

    pub fn other(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Pair of per-side slots. Most engine state comes in buy/sell pairs, so this
/// shows up everywhere a map keyed by `Side` would.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideMap<T> {
    pub buy: T,
    pub sell: T,
}

impl<T> SideMap<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Unconfirmed,
    Confirmed,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderState {
    /// States in which the backend still considers the order live.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            OrderState::Unconfirmed | OrderState::Confirmed | OrderState::PartiallyFilled
        )
    }

    /// Terminal states that mean the resting order is gone without filling
    /// and its slot should be re-placed.
    pub fn needs_replace(self) -> bool {
        matches!(self, OrderState::Canceled | OrderState::Rejected)
    }
}

/// Backend view of an order. The engine never mutates these; it only requests
/// cancel/create and re-reads.
///
/// `id` is `None` when the backend declined the submission. That is a
/// non-fatal placement failure: the caller logs it and leaves the slot empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub id: Option<String>,
    pub side: Side,
    pub state: OrderState,
    pub quantity: f64,
    pub price: f64,
    pub average_price: Option<f64>,
    #[serde(default)]
    pub executed_notional: f64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}
