//! Market data models.
//!
//! `MarketRecord` is the raw, loosely validated shape delivered by a data source.
//! `MarketEvent` is the normalized, immutable value the feed emits downstream.

use crate::model::identity::InstrumentId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while converting a raw record into a `MarketEvent`.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("record for {0} has an empty instrument id")]
    MissingInstrument(String),
    #[error("record for {instrument} has a non-finite or non-positive price field `{field}`")]
    InvalidPrice {
        instrument: String,
        field: &'static str,
    },
    #[error("record for {instrument} has a crossed quote (bid {bid} > ask {ask})")]
    CrossedQuote {
        instrument: String,
        bid: f64,
        ask: f64,
    },
    #[error("record for {0} has a negative volume")]
    NegativeVolume(String),
}

/// A raw market record as pulled from a historical or live source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketRecord {
    Tick {
        instrument: String,
        timestamp: i64,
        bid: f64,
        ask: f64,
        last: f64,
        #[serde(default)]
        volume: f64,
    },
    Bar {
        instrument: String,
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        #[serde(default)]
        volume: f64,
    },
}

impl MarketRecord {
    pub fn timestamp(&self) -> i64 {
        match self {
            MarketRecord::Tick { timestamp, .. } | MarketRecord::Bar { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Validates the record and stamps it with the ingestion sequence number.
    pub fn into_event(self, sequence: u64) -> Result<MarketEvent, RecordError> {
        match self {
            MarketRecord::Tick {
                instrument,
                timestamp,
                bid,
                ask,
                last,
                volume,
            } => {
                check_instrument(&instrument)?;
                check_price(&instrument, "bid", bid)?;
                check_price(&instrument, "ask", ask)?;
                check_price(&instrument, "last", last)?;
                if bid > ask {
                    return Err(RecordError::CrossedQuote {
                        instrument,
                        bid,
                        ask,
                    });
                }
                check_volume(&instrument, volume)?;
                Ok(MarketEvent {
                    instrument_id: InstrumentId::new(instrument),
                    timestamp,
                    sequence,
                    kind: EventKind::Tick { bid, ask, last },
                    volume,
                })
            }
            MarketRecord::Bar {
                instrument,
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            } => {
                check_instrument(&instrument)?;
                check_price(&instrument, "open", open)?;
                check_price(&instrument, "high", high)?;
                check_price(&instrument, "low", low)?;
                check_price(&instrument, "close", close)?;
                check_volume(&instrument, volume)?;
                Ok(MarketEvent {
                    instrument_id: InstrumentId::new(instrument),
                    timestamp,
                    sequence,
                    kind: EventKind::Bar {
                        open,
                        high,
                        low,
                        close,
                    },
                    volume,
                })
            }
        }
    }
}

fn check_instrument(instrument: &str) -> Result<(), RecordError> {
    if instrument.trim().is_empty() {
        return Err(RecordError::MissingInstrument(instrument.to_string()));
    }
    Ok(())
}

fn check_price(instrument: &str, field: &'static str, value: f64) -> Result<(), RecordError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RecordError::InvalidPrice {
            instrument: instrument.to_string(),
            field,
        });
    }
    Ok(())
}

fn check_volume(instrument: &str, volume: f64) -> Result<(), RecordError> {
    if volume < 0.0 || volume.is_nan() {
        return Err(RecordError::NegativeVolume(instrument.to_string()));
    }
    Ok(())
}

/// Price payload of a market event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Tick { bid: f64, ask: f64, last: f64 },
    Bar {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// A normalized market event. Immutable once emitted by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    instrument_id: InstrumentId,
    /// Unix milliseconds.
    timestamp: i64,
    /// Arrival sequence assigned at ingestion. Breaks timestamp ties.
    sequence: u64,
    kind: EventKind,
    volume: f64,
}

impl MarketEvent {
    pub fn tick(
        instrument_id: InstrumentId,
        timestamp: i64,
        sequence: u64,
        bid: f64,
        ask: f64,
        last: f64,
        volume: f64,
    ) -> Self {
        Self {
            instrument_id,
            timestamp,
            sequence,
            kind: EventKind::Tick { bid, ask, last },
            volume,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bar(
        instrument_id: InstrumentId,
        timestamp: i64,
        sequence: u64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            instrument_id,
            timestamp,
            sequence,
            kind: EventKind::Bar {
                open,
                high,
                low,
                close,
            },
            volume,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Reference price used for marking positions: last trade or bar close.
    pub fn price(&self) -> f64 {
        match self.kind {
            EventKind::Tick { last, .. } => last,
            EventKind::Bar { close, .. } => close,
        }
    }

    /// Position of this event in the total replay order.
    pub fn order_key(&self) -> (i64, u64) {
        (self.timestamp, self.sequence)
    }
}

impl Eq for MarketEvent {}

impl PartialOrd for MarketEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MarketEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}
