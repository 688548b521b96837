use crate::exchange::PaperGateway;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use trading::{DataSource, InstrumentId, MarketRecord};

fn reference_price(record: &MarketRecord) -> (InstrumentId, f64) {
    match record {
        MarketRecord::Tick {
            instrument, last, ..
        } => (InstrumentId::new(instrument.clone()), *last),
        MarketRecord::Bar {
            instrument, close, ..
        } => (InstrumentId::new(instrument.clone()), *close),
    }
}

/// Plays a historical source into a live session: the paper venue learns each price
/// just before the feed sees the record. Dropping the sender ends the feed.
pub async fn paper_replay<S: DataSource>(
    mut source: S,
    gateway: Arc<PaperGateway>,
    records: mpsc::Sender<MarketRecord>,
    delay: Duration,
) {
    let mut sent = 0u64;
    while let Some(record) = source.next_record() {
        let (instrument_id, price) = reference_price(&record);
        gateway.set_price(instrument_id, price);
        if records.send(record).await.is_err() {
            break;
        }
        sent += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    info!("Paper replay finished after {} records", sent);
}
