use crate::error::{EngineError, EngineResult};
use crate::exchange::{BackoffConfig, SimulationConfig};
use crate::ledger::FeeSchedule;
use crate::watchdog::WatchdogConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use trading::{RiskLimit, RiskMetric, RiskScope, StrategyId};

fn default_initial_cash() -> f64 {
    1_000_000.0
}

fn default_reorder_window() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_participation_rate() -> f64 {
    1.0
}

fn default_broker_timeout_ms() -> u64 {
    5_000
}

fn default_snapshot_interval_ms() -> u64 {
    60_000
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_journal_enabled() -> bool {
    true
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_intake_capacity() -> usize {
    1_024
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Events held back for reordering.
    #[serde(default = "default_reorder_window")]
    pub reorder_window: usize,
    /// Live heartbeat and idle-flush period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reorder_window: default_reorder_window(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub limits: Vec<RiskLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub fees: FeeSchedule,
    /// Simulated price impact against the order, in basis points.
    #[serde(default)]
    pub slippage_bps: f64,
    /// Share of an event's volume a simulated order may take. Non-positive disables the cap.
    #[serde(default = "default_participation_rate")]
    pub participation_rate: f64,
    #[serde(default = "default_broker_timeout_ms")]
    pub broker_timeout_ms: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl ExecutionConfig {
    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            fees: self.fees,
            slippage_bps: self.slippage_bps,
            participation_rate: self.participation_rate,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            slippage_bps: 0.0,
            participation_rate: default_participation_rate(),
            broker_timeout_ms: default_broker_timeout_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
    /// Live periodic snapshot period.
    #[serde(default = "default_snapshot_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            interval_ms: default_snapshot_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_enabled")]
    pub enabled: bool,
    #[serde(default = "default_journal_dir")]
    pub dir: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: default_journal_enabled(),
            dir: default_journal_dir(),
        }
    }
}

/// One hosted strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    /// Registry key selecting the implementation.
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Generated when absent.
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            initial_cash: default_initial_cash(),
            feed: FeedConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            watchdog: WatchdogConfig::default(),
            snapshot: SnapshotConfig::default(),
            journal: JournalConfig::default(),
            intake_capacity: default_intake_capacity(),
            strategies: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Optional file, then `ENGINE__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix("ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Configured run id, or a fresh one.
    pub fn run_id(&self) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));
        if !self.initial_cash.is_finite() || self.initial_cash < 0.0 {
            return invalid(format!("initial_cash must be non-negative, got {}", self.initial_cash));
        }
        if self.feed.reorder_window == 0 {
            return invalid("feed.reorder_window must be at least 1".into());
        }
        if self.feed.poll_interval_ms == 0 {
            return invalid("feed.poll_interval_ms must be positive".into());
        }
        if self.intake_capacity == 0 {
            return invalid("intake_capacity must be positive".into());
        }
        if self.watchdog.interval_ms == 0 {
            return invalid("watchdog.interval_ms must be positive".into());
        }
        if self.watchdog.dead_after <= self.watchdog.degraded_after {
            return invalid(format!(
                "watchdog.dead_after ({}) must exceed degraded_after ({})",
                self.watchdog.dead_after, self.watchdog.degraded_after
            ));
        }
        for limit in &self.risk.limits {
            if !limit.threshold.is_finite() || limit.threshold < 0.0 {
                return invalid(format!("risk limit {} has a negative threshold", limit));
            }
            if limit.metric == RiskMetric::MaxDailyLoss
                && matches!(limit.scope, RiskScope::Strategy(_))
            {
                return invalid(format!("daily loss limits cannot be per strategy: {}", limit));
            }
        }
        let fees = &self.execution.fees;
        if fees.commission_rate < 0.0 || fees.minimum_commission < 0.0 || fees.sell_tax_rate < 0.0
        {
            return invalid("fee rates must be non-negative".into());
        }
        if !(0.0..10_000.0).contains(&self.execution.slippage_bps) {
            return invalid(format!(
                "slippage_bps must be in [0, 10000), got {}",
                self.execution.slippage_bps
            ));
        }
        let backoff = &self.execution.backoff;
        if backoff.base_ms == 0 || backoff.cap_ms < backoff.base_ms {
            return invalid("backoff requires 0 < base_ms <= cap_ms".into());
        }
        let mut ids: Vec<&StrategyId> = self.strategies.iter().map(|s| &s.id).collect();
        ids.sort();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return invalid("strategy ids must be unique".into());
        }
        Ok(())
    }
}
