//! CSV bar replay backend: historical quotes composed with a `LocalLedger`
//! for fills. Used to exercise ladder configurations against real price
//! history without touching a brokerage.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::ledger::LocalLedger;
use super::{OrderService, ServiceError};
use crate::config::ReplayConfig;
use crate::types::ExchangeOrder;

/// One OHLC bar from the input file. Only open/low/high drive the sim: the
/// open is the tick quote, low/high decide which resting orders filled.
#[derive(Debug, Clone, Deserialize)]
pub struct Bar {
    pub date: String,
    pub open: f64,
    pub low: f64,
    pub high: f64,
}

/// Load the bar history once into a shared, read-only dataset. Every replay
/// service that needs the same file takes a clone of the `Arc`.
pub fn load_bars(path: &Path) -> Result<Arc<[Bar]>, ServiceError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| ServiceError::Parse(e.to_string()))?;
    let mut bars = Vec::new();
    for row in reader.deserialize() {
        let bar: Bar = row.map_err(|e| ServiceError::Parse(e.to_string()))?;
        bars.push(bar);
    }
    info!(path = %path.display(), bars = bars.len(), "loaded bar history");
    Ok(bars.into())
}

pub struct ReplayService {
    bars: Arc<[Bar]>,
    cursor: usize,
    minute_increments: usize,
    datetime_format: String,
    pub ledger: LocalLedger,
}

impl ReplayService {
    pub fn new(bars: Arc<[Bar]>, cfg: &ReplayConfig, ledger: LocalLedger) -> Self {
        Self {
            bars,
            cursor: cfg.start_minute,
            minute_increments: cfg.minute_increments.max(1),
            datetime_format: cfg.datetime_format.clone(),
            ledger,
        }
    }

    /// Seed a fresh ledger from the configured cash split, converting the
    /// non-cash remainder to holdings at the first bar's open.
    pub fn from_config(bars: Arc<[Bar]>, cfg: &ReplayConfig) -> Result<Self, ServiceError> {
        let open = bars
            .get(cfg.start_minute)
            .ok_or_else(|| {
                ServiceError::Unavailable(format!("no bar at start minute {}", cfg.start_minute))
            })?
            .open;
        let buying_power = (cfg.cash_percentage * cfg.start_account_value * 100.0).round() / 100.0;
        let holdings = ((cfg.start_account_value - buying_power) / open).round();
        Ok(Self::new(bars, cfg, LocalLedger::new(holdings, buying_power)))
    }

    fn current(&self) -> Result<&Bar, ServiceError> {
        self.bars
            .get(self.cursor)
            .ok_or_else(|| ServiceError::Unavailable("bar history exhausted".to_string()))
    }

    fn bar_time(&self, bar: &Bar) -> Result<DateTime<Utc>, ServiceError> {
        let naive = NaiveDateTime::parse_from_str(&bar.date, &self.datetime_format)
            .map_err(|e| ServiceError::Parse(format!("bar date {:?}: {}", bar.date, e)))?;
        Ok(naive.and_utc())
    }

    fn now(&self) -> Result<DateTime<Utc>, ServiceError> {
        let bar = self.current()?;
        self.bar_time(bar)
    }

    /// Step forward `minute_increments` bars, filling resting orders against
    /// each bar's low/high on the way. Returns false once the history is
    /// exhausted.
    pub fn advance(&mut self) -> Result<bool, ServiceError> {
        for _ in 0..self.minute_increments {
            let (low, high, at) = {
                let bar = self.current()?;
                (bar.low, bar.high, self.bar_time(bar)?)
            };
            self.ledger.check_orders(low, high, at)?;

            self.cursor += 1;
            if self.cursor >= self.bars.len() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl OrderService for ReplayService {
    async fn quote(&mut self) -> Result<f64, ServiceError> {
        Ok(self.current()?.open)
    }

    async fn holdings(&mut self) -> Result<f64, ServiceError> {
        Ok(self.ledger.holdings)
    }

    async fn buying_power(&mut self) -> Result<f64, ServiceError> {
        Ok(self.ledger.buying_power)
    }

    async fn order_info(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError> {
        self.ledger
            .order_info(id)
            .ok_or_else(|| ServiceError::UnknownOrder(id.to_string()))
    }

    async fn cancel_order(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError> {
        self.ledger.cancel(id)
    }

    async fn buy_limit(&mut self, quantity: f64, price: f64) -> Result<ExchangeOrder, ServiceError> {
        self.ledger.buy_limit(quantity, price)
    }

    async fn sell_limit(
        &mut self,
        quantity: f64,
        price: f64,
    ) -> Result<ExchangeOrder, ServiceError> {
        self.ledger.sell_limit(quantity, price)
    }

    async fn buy_market(&mut self, value: f64) -> Result<ExchangeOrder, ServiceError> {
        let quote = self.current()?.open;
        let at = self.now()?;
        self.ledger.buy_market(value, quote, at)
    }

    async fn sell_market(&mut self, quantity: f64) -> Result<ExchangeOrder, ServiceError> {
        let quote = self.current()?.open;
        let at = self.now()?;
        self.ledger.sell_market(quantity, quote, at)
    }
}
