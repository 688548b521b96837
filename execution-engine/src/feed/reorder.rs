use std::cmp::Reverse;
use std::collections::BinaryHeap;
use trading::MarketEvent;

/// An event that arrived too late to be placed in order.
#[derive(Debug, Clone, PartialEq)]
pub struct LateArrival {
    pub event: MarketEvent,
    /// Timestamp of the last event already emitted.
    pub watermark: i64,
}

/// Holds back up to `window` events and releases them in (timestamp, sequence) order.
///
/// Once an event is emitted nothing earlier can follow it. Arrivals older than the
/// last emitted timestamp are refused.
#[derive(Debug)]
pub struct ReorderBuffer {
    window: usize,
    held: BinaryHeap<Reverse<MarketEvent>>,
    watermark: Option<i64>,
}

impl ReorderBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            held: BinaryHeap::with_capacity(window + 1),
            watermark: None,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    /// Inserts an event and returns the one that falls out of the window, if any.
    pub fn push(&mut self, event: MarketEvent) -> Result<Option<MarketEvent>, LateArrival> {
        if let Some(watermark) = self.watermark {
            if event.timestamp() < watermark {
                return Err(LateArrival { event, watermark });
            }
        }
        self.held.push(Reverse(event));
        if self.held.len() > self.window {
            return Ok(self.pop());
        }
        Ok(None)
    }

    /// Releases every held event, earliest first.
    pub fn drain(&mut self) -> Vec<MarketEvent> {
        let mut out = Vec::with_capacity(self.held.len());
        while let Some(event) = self.pop() {
            out.push(event);
        }
        out
    }

    fn pop(&mut self) -> Option<MarketEvent> {
        let Reverse(event) = self.held.pop()?;
        self.watermark = Some(event.timestamp());
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::InstrumentId;

    fn tick(ts: i64, seq: u64) -> MarketEvent {
        MarketEvent::tick(InstrumentId::new("X"), ts, seq, 1.0, 1.0, 1.0, 0.0)
    }

    #[test]
    fn reorders_within_window() {
        let mut buffer = ReorderBuffer::new(2);
        assert_eq!(buffer.push(tick(3, 0)).unwrap(), None);
        assert_eq!(buffer.push(tick(1, 1)).unwrap(), None);
        let out = buffer.push(tick(2, 2)).unwrap().unwrap();
        assert_eq!(out.timestamp(), 1);
        let rest: Vec<i64> = buffer.drain().iter().map(|e| e.timestamp()).collect();
        assert_eq!(rest, vec![2, 3]);
    }

    #[test]
    fn refuses_events_behind_the_watermark() {
        let mut buffer = ReorderBuffer::new(1);
        buffer.push(tick(10, 0)).unwrap();
        buffer.push(tick(20, 1)).unwrap();
        let late = buffer.push(tick(5, 2)).unwrap_err();
        assert_eq!(late.watermark, 10);
        assert_eq!(late.event.timestamp(), 5);
    }

    #[test]
    fn equal_timestamp_to_watermark_is_accepted() {
        let mut buffer = ReorderBuffer::new(0);
        buffer.push(tick(10, 0)).unwrap();
        assert!(buffer.push(tick(10, 1)).is_ok());
    }
}
