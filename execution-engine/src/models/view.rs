use std::sync::Arc;
use trading::{PendingOrder, PortfolioSnapshot};

/// Read-only picture of the engine published after every serialized step.
///
/// Both halves are immutable once published, so readers never need a lock.
#[derive(Debug, Clone)]
pub struct EngineView {
    pub snapshot: Arc<PortfolioSnapshot>,
    pub pending: Arc<Vec<PendingOrder>>,
}

impl EngineView {
    pub fn new(snapshot: Arc<PortfolioSnapshot>, pending: Vec<PendingOrder>) -> Self {
        Self {
            snapshot,
            pending: Arc::new(pending),
        }
    }

    pub fn initial(cash: f64) -> Self {
        Self::new(Arc::new(PortfolioSnapshot::empty(cash)), Vec::new())
    }
}
