//! Event-driven execution engine shared by deterministic backtests and live trading.

pub mod alerts;
pub mod clock;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod io;
pub mod ledger;
pub mod models;
pub mod risk_guard;
pub mod store;
pub mod strategy;
pub mod watchdog;

pub use engine::{BacktestEngine, BacktestReport, EngineCore, LiveEngine, LiveReport};
pub use error::{EngineError, EngineResult};
