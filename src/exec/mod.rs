pub mod ledger;
pub mod replay;

use thiserror::Error;

use crate::types::ExchangeOrder;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A request would exceed live holdings or buying power. Non-fatal: the
    /// engine logs the rejection and leaves the slot for the next tick.
    #[error("insufficient resource: {0}")]
    InsufficientResource(String),

    #[error("unknown order id {0}")]
    UnknownOrder(String),

    /// Transient backend failure. Aborts the remainder of the tick; nothing
    /// is persisted and the next tick re-derives from a fresh snapshot.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Backend contract the engine runs against: quotes, account balances, and
/// order create/cancel/query. One tick makes a handful of these calls and
/// treats the answers as a consistent snapshot.
///
/// `cancel_order` resolves only once the backend reflects the cancellation.
/// Market orders resolve at fill or a terminal state.
#[allow(async_fn_in_trait)]
pub trait OrderService {
    async fn quote(&mut self) -> Result<f64, ServiceError>;
    async fn holdings(&mut self) -> Result<f64, ServiceError>;
    async fn buying_power(&mut self) -> Result<f64, ServiceError>;

    async fn order_info(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError>;
    async fn cancel_order(&mut self, id: &str) -> Result<ExchangeOrder, ServiceError>;

    async fn buy_limit(&mut self, quantity: f64, price: f64)
    -> Result<ExchangeOrder, ServiceError>;
    async fn sell_limit(
        &mut self,
        quantity: f64,
        price: f64,
    ) -> Result<ExchangeOrder, ServiceError>;

    /// Market buy sized in cash.
    async fn buy_market(&mut self, value: f64) -> Result<ExchangeOrder, ServiceError>;
    /// Market sell sized in asset units.
    async fn sell_market(&mut self, quantity: f64) -> Result<ExchangeOrder, ServiceError>;
}
