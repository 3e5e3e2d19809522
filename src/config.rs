use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Ladder tuning parameters.
///
/// Defaults are reasonable starter values for a liquid crypto pair ticked
/// every few minutes; you will want to tune these against replay data before
/// trusting them with a real account.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    /// Multiplicative price step between rungs. Sell orders are priced at
    /// base * ratio^multiplier; buys use the reciprocal ratio. Must be > 1.
    pub price_increment_ratio: f64,

    /// Fraction of combined wealth (holdings + converted cash) an order
    /// targets before caps apply.
    pub order_quantity_ratio: f64,

    /// Fraction of one side's own resource that may be committed across all
    /// outstanding exposure, compounded by window size.
    pub order_holdings_threshold: f64,

    /// Ticks per window step. When unset, duration-based narrowing is
    /// disabled and resolved window sizes collapse to 0.
    pub window_duration: Option<u64>,

    /// How much each window-size increment widens the multiplier.
    pub window_factor: f64,

    /// Quantities are floored to this many decimal digits; the minimum
    /// tradable unit is 10^-digits.
    pub round_quantity_digits: i32,

    /// Rebalance after the accumulator has seen this many ticks. Unset
    /// disables rebalancing entirely.
    pub rebalance_interval: Option<u64>,

    /// Only start a rebalance accumulation when the cash/asset value split
    /// deviates by more than this fraction. Unset means always accumulate.
    pub rebalance_threshold: Option<f64>,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            price_increment_ratio: 1.05,
            order_quantity_ratio: 0.1,
            order_holdings_threshold: 0.25,
            window_duration: None,
            window_factor: 1.0,
            round_quantity_digits: 0,
            rebalance_interval: None,
            rebalance_threshold: None,
        }
    }
}

impl LadderConfig {
    pub fn sell_ratio(&self) -> f64 {
        self.price_increment_ratio
    }

    pub fn buy_ratio(&self) -> f64 {
        1.0 / self.price_increment_ratio
    }

    /// Smallest tradable quantity at the configured rounding.
    pub fn minimum_quantity(&self) -> f64 {
        10f64.powi(-self.round_quantity_digits)
    }

    /// Floor a quantity to the configured digits. Floor, never round, so a
    /// computed order can never exceed the resources it was sized against.
    pub fn quantity_floor(&self, quantity: f64) -> f64 {
        let m = 10f64.powi(self.round_quantity_digits);
        (quantity * m).floor() / m
    }
}

/// Where persisted engine state lives between ticks.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// JSON document with open-order slots, terminal quantities, and metrics.
    pub orders_file: PathBuf,
    /// Append-only JSON-lines log of every fill.
    pub history_file: PathBuf,
}

/// CSV bar replay backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// CSV with `date,open,low,high` columns, one bar per row.
    pub bars_file: PathBuf,
    /// Bars consumed per tick.
    pub minute_increments: usize,
    /// Fraction of the starting account value held as cash; the rest is
    /// converted to holdings at the first bar's open.
    pub cash_percentage: f64,
    pub start_account_value: f64,
    /// Row to start the replay from.
    pub start_minute: usize,
    /// chrono format string for the `date` column.
    pub datetime_format: String,
    /// Stop after this many ticks even if bars remain.
    pub max_ticks: Option<u64>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            bars_file: PathBuf::from("bars.csv"),
            minute_increments: 5,
            cash_percentage: 0.5,
            start_account_value: 10_000.0,
            start_minute: 0,
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ladder: LadderConfig,
    pub state: StateConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }
}
