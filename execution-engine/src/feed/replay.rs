use super::reorder::{LateArrival, ReorderBuffer};
use super::FeedItem;
use log::{debug, warn};
use std::collections::VecDeque;
use trading::{ComponentId, DataSource, Heartbeat};

/// Finite, ordered feed over a historical source.
///
/// Sequence numbers are assigned at ingestion, before reordering, so ties keep
/// arrival order. Ends once the source is exhausted and the buffer has drained.
pub struct ReplayFeed<S: DataSource> {
    source: S,
    buffer: ReorderBuffer,
    next_sequence: u64,
    exhausted: bool,
    ready: VecDeque<FeedItem>,
    heartbeat: Option<Heartbeat>,
    emitted: u64,
    invalid_records: u64,
}

impl<S: DataSource> ReplayFeed<S> {
    pub fn new(source: S, window: usize) -> Self {
        Self {
            source,
            buffer: ReorderBuffer::new(window),
            next_sequence: 0,
            exhausted: false,
            ready: VecDeque::new(),
            heartbeat: None,
            emitted: 0,
            invalid_records: 0,
        }
    }

    /// Refreshed on every emitted event, stamped with the event's time.
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        self.heartbeat
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn invalid_records(&self) -> u64 {
        self.invalid_records
    }

    fn pull(&mut self) {
        match self.source.next_record() {
            None => {
                self.exhausted = true;
                let rest = self.buffer.drain();
                debug!("replay source exhausted, draining {} held events", rest.len());
                self.ready.extend(rest.into_iter().map(FeedItem::Event));
            }
            Some(record) => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                match record.into_event(sequence) {
                    Err(e) => {
                        self.invalid_records += 1;
                        warn!("skipping malformed market record #{}: {}", sequence, e);
                    }
                    Ok(event) => match self.buffer.push(event) {
                        Ok(Some(event)) => self.ready.push_back(FeedItem::Event(event)),
                        Ok(None) => {}
                        Err(LateArrival { event, watermark }) => {
                            self.ready.push_back(FeedItem::late(event, watermark));
                        }
                    },
                }
            }
        }
    }
}

impl<S: DataSource> Iterator for ReplayFeed<S> {
    type Item = FeedItem;

    fn next(&mut self) -> Option<FeedItem> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                if let FeedItem::Event(event) = &item {
                    self.emitted += 1;
                    self.heartbeat = Some(Heartbeat::alive(
                        ComponentId::MarketFeed,
                        event.timestamp(),
                    ));
                }
                return Some(item);
            }
            if self.exhausted {
                return None;
            }
            self.pull();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{MarketRecord, VecSource};

    fn tick(ts: i64) -> MarketRecord {
        MarketRecord::Tick {
            instrument: "X".into(),
            timestamp: ts,
            bid: 1.0,
            ask: 1.0,
            last: 1.0,
            volume: 1.0,
        }
    }

    fn timestamps(items: &[FeedItem]) -> Vec<i64> {
        items
            .iter()
            .filter_map(|i| match i {
                FeedItem::Event(e) => Some(e.timestamp()),
                FeedItem::Late(_) => None,
            })
            .collect()
    }

    #[test]
    fn in_order_source_passes_through() {
        let source = VecSource::new((1..=5).map(tick).collect());
        let items: Vec<FeedItem> = ReplayFeed::new(source, 3).collect();
        assert_eq!(timestamps(&items), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn late_event_is_dropped_not_delivered() {
        // Window of 3: by the time ts=1 arrives, ts=2 through ts=4 have been emitted.
        let records = vec![2, 3, 4, 5, 6, 7, 1, 8].into_iter().map(tick).collect();
        let items: Vec<FeedItem> = ReplayFeed::new(VecSource::new(records), 3).collect();
        assert_eq!(timestamps(&items), vec![2, 3, 4, 5, 6, 7, 8]);
        let late: Vec<_> = items
            .iter()
            .filter(|i| matches!(i, FeedItem::Late(_)))
            .collect();
        assert_eq!(late.len(), 1);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let mut records: Vec<MarketRecord> = (1..=3).map(tick).collect();
        records.insert(
            1,
            MarketRecord::Tick {
                instrument: "".into(),
                timestamp: 2,
                bid: 1.0,
                ask: 1.0,
                last: 1.0,
                volume: 0.0,
            },
        );
        let mut feed = ReplayFeed::new(VecSource::new(records), 1);
        let items: Vec<FeedItem> = feed.by_ref().collect();
        assert_eq!(timestamps(&items), vec![1, 2, 3]);
        assert_eq!(feed.invalid_records(), 1);
        assert_eq!(feed.heartbeat().map(|h| h.timestamp), Some(3));
    }
}
