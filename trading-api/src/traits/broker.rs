use crate::model::execution::GatewayEvent;
use crate::model::order::OrderRequest;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("not connected")]
    NotConnected,
    #[error("network error: {0}")]
    Network(String),
    #[error("order rejected by venue: {0}")]
    Rejected(String),
}

/// External broker used in live mode.
///
/// Fills are delivered at least once and in no particular order through `next_event`.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Hands an order to the venue. Success means the venue accepted it for working,
    /// not that it filled.
    async fn submit_order(&self, order: &OrderRequest) -> Result<(), GatewayError>;

    /// Waits for the next message from the venue. `None` means the stream ended and
    /// the caller should reconnect.
    async fn next_event(&self) -> Option<GatewayEvent>;
}
