//! Window resolution: turn an anchor price into the next order's price,
//! quantity and window size, growing the window while the quoted price sits
//! more than one ratio step past the candidate.

use crate::config::LadderConfig;
use crate::types::{Side, SideMap};

use super::Snapshot;
use super::sizing::{multiplier_for_window, next_quantity};

/// Resolved details for the next resting order on one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderDetails {
    pub price: f64,
    pub quantity: f64,
    /// Multiplicative ratio applied to the base price.
    pub ratio: f64,
    pub window_size: u64,
}

/// Checks use a window size of 1 so the resulting limit price is allowed to
/// remain one step past the current quote, triggering an immediate fill at
/// the optimum price after a large jump.
pub fn sell_price_too_low(cfg: &LadderConfig, snap: &Snapshot, candidate: f64) -> bool {
    let step = cfg.sell_ratio().powf(multiplier_for_window(cfg, 1));
    if candidate * step < snap.price {
        tracing::debug!(candidate, quote = snap.price, "next sell price too low");
        return true;
    }
    false
}

pub fn buy_price_too_high(cfg: &LadderConfig, snap: &Snapshot, candidate: f64) -> bool {
    let step = cfg.buy_ratio().powf(multiplier_for_window(cfg, 1));
    if candidate * step > snap.price {
        tracing::debug!(candidate, quote = snap.price, "next buy price too high");
        return true;
    }
    false
}

/// Resolve the next order for `side` anchored at `base_price`, starting from
/// `window_size` and growing the window while the resulting price is still
/// more than one step on the wrong side of the live quote.
pub fn next_order_details(
    cfg: &LadderConfig,
    snap: &Snapshot,
    terminal: &mut SideMap<Option<f64>>,
    side: Side,
    base_price: f64,
    mut window_size: u64,
) -> OrderDetails {
    let price_ratio = match side {
        Side::Sell => cfg.sell_ratio(),
        Side::Buy => cfg.buy_ratio(),
    };

    loop {
        let multiplier = multiplier_for_window(cfg, window_size);
        let ratio = price_ratio.powf(multiplier);
        let price = base_price * ratio;
        let quantity = next_quantity(cfg, snap, terminal, side, base_price, price, multiplier);

        let too_narrow = match side {
            Side::Sell => sell_price_too_low(cfg, snap, price),
            Side::Buy => buy_price_too_high(cfg, snap, price),
        };
        if too_narrow {
            window_size += 1;
            continue;
        }

        return OrderDetails {
            price,
            quantity,
            ratio,
            // Without a window duration there is nothing to narrow back, so
            // the stored size stays at 0 and only the loop above widens.
            window_size: if cfg.window_duration.is_some() {
                window_size
            } else {
                0
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LadderConfig {
        LadderConfig {
            price_increment_ratio: 1.1,
            order_quantity_ratio: 0.1,
            order_holdings_threshold: 0.25,
            window_duration: Some(5),
            window_factor: 0.9,
            round_quantity_digits: 0,
            rebalance_interval: None,
            rebalance_threshold: None,
        }
    }

    fn snap() -> Snapshot {
        Snapshot {
            price: 1.0,
            holdings: 10_000.0,
            buying_power: 10_000.0,
        }
    }

    #[test]
    fn price_window_checks_allow_one_factor_step() {
        let cfg = cfg();
        let snap = snap();
        // one step at factor 0.9 covers 1.1^1.9 in either direction
        assert!(!sell_price_too_low(&cfg, &snap, 0.85));
        assert!(sell_price_too_low(&cfg, &snap, 0.8));
        assert!(!buy_price_too_high(&cfg, &snap, 1.15));
        assert!(buy_price_too_high(&cfg, &snap, 1.2));
    }

    #[test]
    fn resolves_at_the_starting_window_when_price_is_in_range() {
        let cfg = cfg();
        let snap = snap();
        let mut terminal = SideMap::default();
        let details = next_order_details(&cfg, &snap, &mut terminal, Side::Sell, 1.0 / 1.1, 0);
        assert!((details.price - 1.0).abs() < 1e-9);
        assert!((details.quantity - 2000.0).abs() < 1e-6);
        assert!((details.ratio - 1.1).abs() < 1e-12);
        assert_eq!(details.window_size, 0);
    }

    #[test]
    fn grows_the_window_until_the_price_is_reachable() {
        let cfg = cfg();
        let snap = snap();
        let base = 0.8 / 1.1;

        let mut terminal = SideMap::default();
        let details = next_order_details(&cfg, &snap, &mut terminal, Side::Sell, base, 0);

        // window 0 resolves to 0.8, too far below the $1 quote; one widening
        // step lands at multiplier 1.9
        assert!((details.ratio - 1.1f64.powf(1.9)).abs() < 1e-12);
        assert!((details.price - 0.8716525472287794).abs() < 1e-12);
        assert_eq!(details.window_size, 1);
        assert!((details.quantity - 3895.0).abs() < 1e-6);
    }

    #[test]
    fn window_size_collapses_to_zero_without_a_duration() {
        let mut cfg = cfg();
        cfg.window_duration = None;
        let snap = snap();
        let mut terminal = SideMap::default();
        let details = next_order_details(&cfg, &snap, &mut terminal, Side::Sell, 0.8 / 1.1, 0);
        assert_eq!(details.window_size, 0);
        // the price still reflects the grown window
        assert!((details.price - 0.8716525472287794).abs() < 1e-12);
    }
}
