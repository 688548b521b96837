//! Market feed: turns raw records into a strictly ordered stream of `MarketEvent`.

pub mod live;
pub mod reorder;
pub mod replay;
pub mod source;

pub use live::LiveFeed;
pub use reorder::{LateArrival, ReorderBuffer};
pub use replay::ReplayFeed;
pub use source::JsonLinesSource;

use log::warn;
use trading::{MarketEvent, Notification};

/// One step of the feed: an event for downstream, or a record of a dropped late arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Event(MarketEvent),
    Late(Notification),
}

impl FeedItem {
    pub(crate) fn late(event: MarketEvent, watermark: i64) -> Self {
        warn!(
            "late arrival dropped: {} at {} is older than watermark {}",
            event.instrument_id(),
            event.timestamp(),
            watermark
        );
        FeedItem::Late(Notification::LateArrivalDrop {
            instrument_id: event.instrument_id().clone(),
            event_timestamp: event.timestamp(),
            watermark,
        })
    }
}
