use serde::{Deserialize, Serialize};

/// A ladder slot: the engine's own record of one outstanding limit order.
/// At most one exists per side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// Backend order id.
    pub id: String,
    /// Price this order's window is anchored to: the last fill, or the tick
    /// quote for a fresh ladder.
    pub base_price: f64,
    /// Unrounded limit price; floored only at submission.
    pub price: f64,
    pub quantity: f64,
    pub window_size: u64,
    /// Ticks left before the window is considered one step narrower.
    pub window_duration_remaining: u64,
    /// Set externally (e.g. by hand in the state file) to force the next
    /// tick to cancel and re-place this order.
    #[serde(default)]
    pub force_replace: bool,
}
