use trading::{ExecutionReport, Heartbeat, MarketEvent, OrderId, OrderRequest, PendingOrder};

pub mod backoff;
pub mod correlator;
pub mod live;
pub mod paper;
pub mod simulated;

pub use backoff::BackoffConfig;
pub use correlator::FillCorrelator;
pub use live::{LiveConfig, LiveExchange};
pub use paper::PaperGateway;
pub use simulated::{SimulatedExchange, SimulationConfig};

/// Interface for executing orders against a market, simulated or real.
///
/// Submitting an order starts a stream of fills rather than returning one. The
/// simulated variant produces them from later market events; the live variant
/// delivers them asynchronously through the engine's intake queue.
pub trait ExecutionAdapter: Send {
    /// Hands over an admitted order. Returns failures known immediately.
    fn submit(&mut self, order: &OrderRequest) -> Vec<ExecutionReport>;

    /// Lets the adapter react to a market event before strategies see it.
    fn on_market_event(&mut self, event: &MarketEvent) -> Vec<ExecutionReport>;

    /// Withdraws every working order.
    fn cancel_all(&mut self, timestamp: i64) -> Vec<ExecutionReport>;

    fn working_orders(&self) -> usize;

    /// The engine considers the order finished; stop tracking it.
    fn order_closed(&mut self, _order_id: OrderId) {}

    /// Re-adopts orders that were still working when a snapshot was taken.
    fn restore(&mut self, _pending: &[PendingOrder]) {}

    fn heartbeat(&self, now: i64) -> Heartbeat;
}
