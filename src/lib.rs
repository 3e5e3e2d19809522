//! Two-sided limit-order laddering engine.
//!
//! The engine keeps one resting sell above and one resting buy below an
//! anchor price. A fill re-anchors both sides at the filled price, so a
//! ranging market is harvested one rung at a time; a widening window absorbs
//! runaway moves, and an optional rebalancer pulls the account back toward a
//! 50/50 cash/asset split when the ladder stops filling.
//!
//! [`engine::manager::OrderManager`] drives the tick loop against any
//! [`exec::OrderService`] backend; [`exec::replay::ReplayService`] replays
//! CSV bar history against a locally simulated account.

pub mod config;
pub mod engine;
pub mod exec;
pub mod report;
pub mod state;
pub mod types;
