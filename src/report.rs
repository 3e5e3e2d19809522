// src/report.rs
use tracing::info;

use crate::state::BotState;

/// Log a session summary from the recorded metrics. Quiet until the first
/// tick has seeded the counters.
pub fn log_metrics(state: &BotState) {
    let Some(summary) = state.metrics.summary() else {
        return;
    };

    let sells = state.metrics.sides.sell;
    let buys = state.metrics.sides.buy;

    info!(
        sell_fills = sells.count,
        buy_fills = buys.count,
        usd_gained = summary.usd_gained,
        coin_gained = summary.coin_gained,
        account_value_change = summary.account_value_change_percent,
        price_change = summary.price_change_percent,
        ticks = state.metrics.ticks_from_start.unwrap_or(0),
        longest_fill_gap = state.metrics.longest_ticks_between_fills,
        "session summary"
    );
}
