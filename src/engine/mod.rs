pub mod manager;
pub mod rebalance;
pub mod sizing;
pub mod window;

/// Backend values read once per tick and shared by every decision in that
/// tick. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub price: f64,
    /// Asset units held.
    pub holdings: f64,
    /// Cash available.
    pub buying_power: f64,
}

impl Snapshot {
    /// Asset-denominated combined wealth if all cash were converted at
    /// `price`. Unrounded: intermediate value only.
    pub fn total_holdings(&self, price: f64) -> f64 {
        self.holdings + self.buying_power / price
    }

    /// Cash value of the account at `price`. Unrounded: intermediate value
    /// only.
    pub fn account_value(&self, price: f64) -> f64 {
        self.holdings * price + self.buying_power
    }
}
