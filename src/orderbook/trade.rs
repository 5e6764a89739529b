//! Trade records: the exchange tape entries the engine consumes and the
//! canonical trades it emits.

use super::error::BookError;
use super::level::Price;
use super::order::{MemberClass, OrderId};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Aggressor flag on a trade tape entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Aggressor {
    /// The buy side was the newly arriving order (`'A'`)
    Buy,
    /// The sell side was the newly arriving order (`'V'`)
    Sell,
    /// Auction print, no aggressor (`'2'`, blank on raw files)
    Auction,
}

impl Aggressor {
    /// Decode the tape flag. Auction prints carry `'2'` or nothing at all.
    pub fn from_code(code: &str) -> Result<Aggressor, BookError> {
        match code.trim() {
            "A" => Ok(Aggressor::Buy),
            "V" => Ok(Aggressor::Sell),
            "2" | "" => Ok(Aggressor::Auction),
            other => Err(BookError::UnknownAggressor(other.to_string())),
        }
    }
}

/// One executed trade as recorded by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TapeTrade {
    /// Negotiation time, microsecond precision
    pub time: NaiveDateTime,
    /// Buy-side fundamental order id
    pub bid_fid: OrderId,
    /// Sell-side fundamental order id
    pub ask_fid: OrderId,
    /// Quantity exchanged
    pub qty: u64,
    /// Trade price
    pub price: Price,
    /// Aggressor flag
    pub aggressor: Aggressor,
}

/// Provenance of an engine-emitted trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSource {
    /// Synthesized by the auction uncrossing walk
    Auction,
    /// Applied from the exchange trade tape during continuous trading
    Tape,
}

/// Canonical trade record emitted by the engine.
///
/// `seq` comes from a per-book monotonic counter so books replayed on
/// different workers stay independent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    /// Per-book trade sequence number
    pub seq: u64,
    /// Trade time
    pub time: NaiveDateTime,
    /// Trade price
    pub price: Price,
    /// Quantity exchanged
    pub qty: u64,
    /// Buy-side order id
    pub bid_fid: OrderId,
    /// Sell-side order id
    pub ask_fid: OrderId,
    /// Buy-side member class
    pub bid_member: MemberClass,
    /// Sell-side member class
    pub ask_member: MemberClass,
    /// Where the trade came from
    pub source: TradeSource,
}

impl Trade {
    /// Traded capital, price times quantity.
    pub fn capital(&self) -> f64 {
        self.price.as_f64() * self.qty as f64
    }
}
