pub mod macros;
pub mod model;
pub mod traits;

pub use model::execution::{
    ExecutionReport, FailureKind, GatewayEvent, GatewayFill, OrderFailure, OrderFill,
};
pub use model::health::{Heartbeat, HealthStatus};
pub use model::identity::{ComponentId, FillId, InstrumentId, OrderId, StrategyId};
pub use model::market_data::{EventKind, MarketEvent, MarketRecord, RecordError};
pub use model::notification::{Notification, Severity};
pub use model::order::{OrderRequest, OrderStatus, OrderType, Side};
pub use model::portfolio::{PortfolioSnapshot, Position};
pub use model::recovery::{PendingOrder, RecoveryState, SnapshotKey, SnapshotReason};
pub use model::risk::{RiskLimit, RiskMetric, RiskScope};
pub use model::signal::{Direction, Signal, SignalSize};
pub use traits::alerting::AlertSink;
pub use traits::broker::{BrokerGateway, GatewayError};
pub use traits::data_feed::{DataSource, VecSource};
pub use traits::persistence::{SnapshotStore, StoreError};
pub use traits::strategist::{SizingDecision, Strategy, StrategyError, default_sizing};

pub mod prelude {
    pub use crate::export_strategy;
    pub use crate::model::market_data::MarketEvent;
    pub use crate::model::portfolio::PortfolioSnapshot;
    pub use crate::model::signal::{Direction, Signal, SignalSize};
    pub use crate::traits::strategist::{Strategy, StrategyError};
}
