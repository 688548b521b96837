use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Deterministic replay with simulated fills.
    Backtest,
    /// Real-time session against the in-process paper gateway.
    Live,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML, JSON or YAML). ENGINE__* variables override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Backtest)]
    pub mode: Mode,

    /// JSON-lines market data. In live mode it is replayed into the paper venue.
    #[arg(long)]
    pub data: PathBuf,

    /// Overrides the configured run id.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Live only: resume from the newest snapshot of the run.
    #[arg(long, default_value_t = false)]
    pub restore: bool,

    /// Live only: pause between replayed records.
    #[arg(long, default_value_t = 100)]
    pub replay_delay_ms: u64,
}
