//! Defines the `DataSource` trait for historical market data.
//!
//! The market feed pulls typed records from a source, one at a time, and owns
//! sequencing and reordering. Sources never see downstream components.

use crate::model::market_data::MarketRecord;

/// Pull-based iterator over raw market records.
///
/// Returning `None` means the source is exhausted; the replay run ends once the
/// feed has drained its reorder buffer.
///
/// # Examples
///
/// ```
/// use trading::traits::data_feed::{DataSource, VecSource};
/// use trading::model::market_data::MarketRecord;
///
/// let mut source = VecSource::new(vec![MarketRecord::Bar {
///     instrument: "X".into(),
///     timestamp: 1,
///     open: 1.0,
///     high: 1.0,
///     low: 1.0,
///     close: 1.0,
///     volume: 10.0,
/// }]);
/// assert!(source.next_record().is_some());
/// assert!(source.next_record().is_none());
/// ```
pub trait DataSource: Send {
    fn next_record(&mut self) -> Option<MarketRecord>;
}

impl DataSource for Box<dyn DataSource> {
    fn next_record(&mut self) -> Option<MarketRecord> {
        (**self).next_record()
    }
}

/// In-memory source, mostly for tests and small replays.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: std::collections::VecDeque<MarketRecord>,
}

impl VecSource {
    pub fn new(records: Vec<MarketRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }
}

impl DataSource for VecSource {
    fn next_record(&mut self) -> Option<MarketRecord> {
        self.records.pop_front()
    }
}
