use super::reorder::{LateArrival, ReorderBuffer};
use super::FeedItem;
use crate::clock::{Clock, WallClock};
use crate::models::Intake;
use crate::watchdog::HeartbeatSender;
use log::{info, warn};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use trading::{ComponentId, Heartbeat, MarketRecord};

/// Live market feed task.
///
/// Pulls raw records from a channel, orders them through the reorder buffer and
/// pushes them into the engine intake. The intake send is awaited, so a slow engine
/// blocks ingestion instead of losing events. The heartbeat ticks on the polling
/// interval whether or not data arrived; an idle interval also releases whatever
/// the buffer is holding.
pub struct LiveFeed {
    records: mpsc::Receiver<MarketRecord>,
    intake: mpsc::Sender<Intake>,
    heartbeats: HeartbeatSender,
    buffer: ReorderBuffer,
    poll_interval: Duration,
    stop: watch::Receiver<bool>,
    next_sequence: u64,
    clock: WallClock,
}

impl LiveFeed {
    pub fn new(
        records: mpsc::Receiver<MarketRecord>,
        intake: mpsc::Sender<Intake>,
        heartbeats: HeartbeatSender,
        window: usize,
        poll_interval: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            records,
            intake,
            heartbeats,
            buffer: ReorderBuffer::new(window),
            poll_interval,
            stop,
            next_sequence: 0,
            clock: WallClock::new(),
        }
    }

    fn beat(&self) {
        self.heartbeats
            .beat(Heartbeat::alive(ComponentId::MarketFeed, self.clock.now()));
    }

    async fn send(&self, item: FeedItem) -> bool {
        let intake = match item {
            FeedItem::Event(event) => Intake::Market(event),
            FeedItem::Late(notification) => Intake::LateArrival(notification),
        };
        self.intake.send(intake).await.is_ok()
    }

    async fn flush(&mut self) -> bool {
        for event in self.buffer.drain() {
            if !self.send(FeedItem::Event(event)).await {
                return false;
            }
        }
        true
    }

    async fn ingest(&mut self, record: MarketRecord) -> bool {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let event = match record.into_event(sequence) {
            Ok(event) => event,
            Err(e) => {
                warn!("skipping malformed live record #{}: {}", sequence, e);
                return true;
            }
        };
        let item = match self.buffer.push(event) {
            Ok(Some(event)) => FeedItem::Event(event),
            Ok(None) => return true,
            Err(LateArrival { event, watermark }) => FeedItem::late(event, watermark),
        };
        self.send(item).await
    }

    /// Runs until stopped or the source closes. Returns how many held events were
    /// discarded because the feed was stopped before it could release them.
    pub async fn run(mut self) -> usize {
        info!("Live feed started (window {})", self.buffer.window());
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut received_since_tick = false;
        self.beat();
        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                _ = ticker.tick() => {
                    self.beat();
                    if !received_since_tick && !self.buffer.is_empty() && !self.flush().await {
                        break;
                    }
                    received_since_tick = false;
                }
                record = self.records.recv() => match record {
                    Some(record) => {
                        received_since_tick = true;
                        if !self.ingest(record).await {
                            break;
                        }
                    }
                    None => {
                        info!("Live market source closed");
                        if self.flush().await {
                            let _ = self.intake.send(Intake::FeedClosed).await;
                        }
                        break;
                    }
                },
            }
        }
        let discarded = self.buffer.len();
        if discarded > 0 {
            warn!("Live feed stopped with {} held events discarded", discarded);
        } else {
            info!("Live feed stopped");
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts: i64, price: f64) -> MarketRecord {
        MarketRecord::Tick {
            instrument: "AAPL".to_string(),
            timestamp: ts,
            bid: price - 0.01,
            ask: price + 0.01,
            last: price,
            volume: 100.0,
        }
    }

    #[tokio::test]
    async fn live_feed_orders_events_and_reports_close() {
        let (record_tx, record_rx) = mpsc::channel(16);
        let (intake_tx, mut intake_rx) = mpsc::channel(16);
        let (beats, mut beat_rx) = HeartbeatSender::channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let feed = LiveFeed::new(record_rx, intake_tx, beats, 2, Duration::from_millis(200), stop_rx);
        let task = tokio::spawn(feed.run());

        for (ts, px) in [(2, 10.0), (1, 11.0), (3, 12.0), (4, 13.0)] {
            record_tx.send(tick(ts, px)).await.unwrap();
        }
        drop(record_tx);

        let mut timestamps = Vec::new();
        while let Some(item) = intake_rx.recv().await {
            match item {
                Intake::Market(event) => timestamps.push(event.timestamp()),
                Intake::FeedClosed => break,
                other => panic!("unexpected intake {:?}", other),
            }
        }
        task.await.unwrap();

        assert_eq!(timestamps, vec![1, 2, 3, 4]);
        let beat = beat_rx.recv().await.unwrap();
        assert_eq!(beat.component, ComponentId::MarketFeed);
    }

    #[tokio::test]
    async fn idle_interval_releases_held_events() {
        let (record_tx, record_rx) = mpsc::channel(16);
        let (intake_tx, mut intake_rx) = mpsc::channel(16);
        let (beats, _beat_rx) = HeartbeatSender::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let feed = LiveFeed::new(record_rx, intake_tx, beats, 5, Duration::from_millis(20), stop_rx);
        let task = tokio::spawn(feed.run());

        record_tx.send(tick(1, 10.0)).await.unwrap();
        let item = tokio::time::timeout(Duration::from_secs(2), intake_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(item, Intake::Market(ref e) if e.timestamp() == 1));

        stop_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stop_reports_events_still_held() {
        let (record_tx, record_rx) = mpsc::channel(16);
        let (intake_tx, mut intake_rx) = mpsc::channel(16);
        let (beats, _beat_rx) = HeartbeatSender::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let feed = LiveFeed::new(record_rx, intake_tx, beats, 5, Duration::from_secs(60), stop_rx);
        let task = tokio::spawn(feed.run());

        record_tx.send(tick(1, 10.0)).await.unwrap();
        record_tx.send(tick(2, 10.5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        assert_eq!(task.await.unwrap(), 2);
        assert!(intake_rx.try_recv().is_err());
    }
}
