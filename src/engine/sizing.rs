//! Ratio/window math and order-quantity sizing.
//!
//! Sizing is a greedy per-tick constraint rule: it sees only the current
//! snapshot plus one remembered scalar per side (the terminal quantity), yet
//! must never let one side's past exhaustion starve the other side's ladder.

use crate::config::LadderConfig;
use crate::types::{Side, SideMap};

use super::Snapshot;

/// Quantity/price multiplier for a window size. Window size 0 is always 1.
pub fn multiplier_for_window(cfg: &LadderConfig, window_size: u64) -> f64 {
    window_size as f64 * cfg.window_factor + 1.0
}

/// Compound `ratio` over `multiplier` steps: `(total, complement)` where
/// `complement = (1-ratio)^multiplier` is the fraction left and `total` the
/// fraction consumed. `total` is rounded to 10 digits to absorb
/// repeating-nines float artifacts.
pub fn apply_multiplier_to_ratio(ratio: f64, multiplier: f64) -> (f64, f64) {
    let complement = (1.0 - ratio).powf(multiplier);
    let total = round_digits(1.0 - complement, 10);
    (total, complement)
}

fn round_digits(value: f64, digits: i32) -> f64 {
    let m = 10f64.powi(digits);
    (value * m).round() / m
}

/// Next order quantity for `side` at `target_price`, respecting three caps
/// at once: the default sizing ratio, this side's holdings threshold, and a
/// reservation for what the opposite side could still absorb. Updates the
/// terminal-quantity slot for `side` as a side effect.
pub fn next_quantity(
    cfg: &LadderConfig,
    snap: &Snapshot,
    terminal: &mut SideMap<Option<f64>>,
    side: Side,
    base_price: f64,
    target_price: f64,
    multiplier: f64,
) -> f64 {
    let minimum = cfg.minimum_quantity();

    if side == Side::Buy && snap.buying_power / target_price <= minimum {
        return 0.0;
    }

    let order_ratio = apply_multiplier_to_ratio(cfg.order_quantity_ratio, multiplier).0;
    let default_quantity = snap.total_holdings(target_price) * order_ratio;

    let (total_threshold, complement_threshold) =
        apply_multiplier_to_ratio(cfg.order_holdings_threshold, multiplier);

    let own_cap = match side {
        Side::Sell => snap.holdings * total_threshold,
        Side::Buy => (snap.buying_power * total_threshold) / target_price,
    };

    // Convert the opposite side's live resource into this side's quantity
    // unit so the caps are comparable.
    let opposite = side.other();
    let opposite_available = match opposite {
        Side::Sell => snap.holdings * base_price / target_price,
        Side::Buy => snap.buying_power / base_price,
    };

    let opposite_cap = if cfg.quantity_floor(opposite_available) <= minimum {
        // Opposite side is already exhausted: fall back to its remembered
        // terminal quantity so a fill here can still be reversed.
        (*terminal.get(opposite)).unwrap_or(minimum)
    } else if complement_threshold > 0.0 {
        // How much of the opposite ladder is still reachable under the same
        // threshold compounding.
        opposite_available * (1.0 / complement_threshold - 1.0)
    } else {
        // Threshold allows 100% and no terminal value constrains us.
        f64::INFINITY
    };

    let quantity = cfg.quantity_floor(default_quantity.min(own_cap).min(opposite_cap));

    if quantity > 0.0 {
        // If this fill would exhaust our own resource, remember the quantity
        // so the opposite side can size against it later. Normalize it down
        // to what a window size of 1 would have consumed.
        let mut terminal_value = quantity;
        if multiplier > 1.0 {
            let stepped_down_total =
                apply_multiplier_to_ratio(cfg.order_holdings_threshold, multiplier - 1.0).0;
            let threshold_delta = 1.0 - stepped_down_total / total_threshold;
            terminal_value = cfg.quantity_floor(threshold_delta * quantity).max(minimum);
        }

        let remaining = match side {
            Side::Sell => snap.holdings - quantity,
            Side::Buy => snap.buying_power / target_price - quantity,
        };
        *terminal.get_mut(side) = if cfg.quantity_floor(remaining) <= minimum {
            Some(terminal_value)
        } else {
            None
        };
    }

    quantity
}
