use anyhow::{Context, Result};
use clap::Parser;
use execution_engine::exchange::PaperGateway;
use execution_engine::feed::JsonLinesSource;
use execution_engine::io::admin::spawn_stdin_commands;
use execution_engine::io::args::{Args, Mode};
use execution_engine::io::replay::paper_replay;
use execution_engine::models::{AdminCommand, EngineConfig, TradeJournal};
use execution_engine::store::FileSnapshotStore;
use execution_engine::strategy::{OrderIdGenerator, StrategyRegistry, StrategyRuntime};
use execution_engine::{BacktestEngine, LiveEngine};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config =
        EngineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(run_id) = args.run_id.clone() {
        config.run_id = Some(run_id);
    }
    config.run_id = Some(config.run_id());

    let (runtime, faults) = StrategyRuntime::from_config(
        &config.strategies,
        &StrategyRegistry::default(),
        OrderIdGenerator::default(),
    )?;
    for fault in &faults {
        warn!("{}", fault);
    }
    if runtime.is_empty() {
        warn!("No strategies configured; the engine will only mark prices");
    }

    let store = Arc::new(FileSnapshotStore::new(config.snapshot.dir.clone()));
    let journal = if config.journal.enabled {
        TradeJournal::in_dir(&config.journal.dir)
    } else {
        TradeJournal::disabled()
    };
    let source = JsonLinesSource::open(&args.data)?;

    match args.mode {
        Mode::Backtest => {
            let report = BacktestEngine::new(&config, runtime)?
                .with_store(store)
                .with_journal(journal)
                .run(source)?;
            info!(
                "{} signals, {} fills, {} notifications",
                report.signal_log.len(),
                report.fills.len(),
                report.notifications.len()
            );
            println!("{}", serde_json::to_string_pretty(&report.final_snapshot)?);
        }
        Mode::Live => {
            let gateway = Arc::new(PaperGateway::new());
            let (record_tx, record_rx) = mpsc::channel(config.intake_capacity);
            let (command_tx, command_rx) = mpsc::channel(16);

            let mut engine = LiveEngine::new(config.clone(), runtime, gateway.clone())?
                .with_store(store)
                .with_journal(journal);
            if args.restore {
                engine = engine.restore_latest()?;
            }

            tokio::spawn(paper_replay(
                source,
                gateway,
                record_tx,
                Duration::from_millis(args.replay_delay_ms),
            ));
            spawn_stdin_commands(command_tx.clone());
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, shutting down");
                    let _ = command_tx.send(AdminCommand::Shutdown).await;
                }
            });

            let report = engine.run(record_rx, command_rx).await?;
            println!("{}", serde_json::to_string_pretty(&report.final_snapshot)?);
        }
    }
    Ok(())
}
