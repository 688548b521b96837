use thiserror::Error;
use trading::{ComponentId, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The ledger failed its accounting identity. Trading must stop.
    #[error("accounting violation: {0}")]
    AccountingViolation(String),

    /// A critical component was confirmed dead by the watchdog.
    #[error("component {0} is dead")]
    ComponentDeath(ComponentId),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine was halted and refuses further work.
    #[error("engine halted: {0}")]
    Halted(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
