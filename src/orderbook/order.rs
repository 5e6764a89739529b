//! The mutable record for a single resting or contingent order.
//!
//! An [`Order`] lives in exactly one container at a time: a price level's
//! FIFO, a stop bucket, or the closing-auction queue. The book's order index
//! maps the exchange-assigned fundamental id to the arena slot holding the
//! record. Quantity bookkeeping follows the exchange convention:
//! `qty_remaining + qty_negotiated == qty_initial` at all times, and the
//! disclosed (iceberg) cap never exceeds the remaining quantity.

use super::error::BookError;
use super::level::Price;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fundamental order id, stable across the whole life of an order.
pub type OrderId = u64;

/// Side of the book an order rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side
    Bid,
    /// Sell side
    Ask,
}

impl Side {
    /// The opposite side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Tape code for this side.
    pub fn code(self) -> char {
        match self {
            Side::Bid => 'B',
            Side::Ask => 'S',
        }
    }
}

impl TryFrom<char> for Side {
    type Error = BookError;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            'B' => Ok(Side::Bid),
            'S' => Ok(Side::Ask),
            other => Err(BookError::UnknownSide(other)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Order kind, decoded from the tape's single-character type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Plain market order (`'1'`)
    Market,
    /// Limit order (`'2'`)
    Limit,
    /// Stop order that becomes a market order on trigger (`'3'`)
    StopMarket,
    /// Stop order that becomes a limit order on trigger (`'4'`)
    StopLimit,
    /// Pegged order tracking the same-side touch (`'P'`)
    Pegged,
    /// Market order whose residual converts to a limit at the touch (`'K'`)
    MarketToLimit,
}

impl OrderKind {
    /// True for both stop kinds.
    pub fn is_stop(self) -> bool {
        matches!(self, OrderKind::StopMarket | OrderKind::StopLimit)
    }

    /// Tape code for this kind.
    pub fn code(self) -> char {
        match self {
            OrderKind::Market => '1',
            OrderKind::Limit => '2',
            OrderKind::StopMarket => '3',
            OrderKind::StopLimit => '4',
            OrderKind::Pegged => 'P',
            OrderKind::MarketToLimit => 'K',
        }
    }
}

impl TryFrom<char> for OrderKind {
    type Error = BookError;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            '1' => Ok(OrderKind::Market),
            '2' => Ok(OrderKind::Limit),
            '3' => Ok(OrderKind::StopMarket),
            '4' => Ok(OrderKind::StopLimit),
            'P' => Ok(OrderKind::Pegged),
            'K' => Ok(OrderKind::MarketToLimit),
            other => Err(BookError::UnknownOrderKind(other)),
        }
    }
}

/// Latency class of the submitting member, as declared by the exchange.
///
/// Used for microstructure accounting only; it never influences matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberClass {
    /// Pure high-frequency member
    Hft,
    /// Member running both HFT and non-HFT flow
    Mix,
    /// Non-HFT member
    Non,
}

impl std::str::FromStr for MemberClass {
    type Err = BookError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "HFT" => Ok(MemberClass::Hft),
            "MIX" => Ok(MemberClass::Mix),
            "NON" => Ok(MemberClass::Non),
            other => Err(BookError::UnknownMemberClass(other.to_string())),
        }
    }
}

impl fmt::Display for MemberClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberClass::Hft => write!(f, "HFT"),
            MemberClass::Mix => write!(f, "MIX"),
            MemberClass::Non => write!(f, "NON"),
        }
    }
}

/// Validity code: day order eligible for auctions.
pub const VALIDITY_AUCTIONS_ONLY: char = '2';
/// Validity code: order participates in the closing auction only.
pub const VALIDITY_CLOSING_ONLY: char = '7';

/// Signed deltas an order mutation induces on its level's aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QtyDeltas {
    /// Change in total level size
    pub size: i64,
    /// Change in the disclosed portion for the order's member class
    pub disclosed: i64,
    /// Change in the hidden portion for the order's member class
    pub hidden: i64,
}

/// One resting or contingent order.
///
/// `prev`/`next` are arena slot indices linking the order into its level's
/// FIFO; they are `None` while the order sits in a stop bucket or on the
/// closing-auction queue.
#[derive(Debug, Clone)]
pub struct Order {
    /// Fundamental id
    pub fid: OrderId,
    /// Characteristic (chain) id, bumped by the exchange on each life-cycle event
    pub chain: u32,
    /// Raw state code from the message that created this record
    pub state: char,
    /// Book-entry time, the time-priority key
    pub entered_at: NaiveDateTime,
    /// Validity time of the message that created this record
    pub valid_at: NaiveDateTime,
    /// Side of the book
    pub side: Side,
    /// Order kind
    pub kind: OrderKind,
    /// Raw execution-condition code (carried, not interpreted)
    pub execution: char,
    /// Raw validity code; see [`VALIDITY_CLOSING_ONLY`]
    pub validity: char,
    /// Expiration, when the order carries one
    pub expires_at: Option<NaiveDateTime>,
    /// Limit price (synthetic sentinel for market kinds)
    pub price: Price,
    /// Stop trigger price; for pegged orders, the band limit
    pub stop_price: Price,
    /// Initial quantity
    pub qty_initial: u64,
    /// Remaining quantity
    pub qty_remaining: u64,
    /// Negotiated (filled) quantity
    pub qty_negotiated: u64,
    /// Minimum execution quantity
    pub qty_min: u64,
    /// Disclosed (iceberg peak) quantity cap
    pub qty_disclosed: u64,
    /// Submitting member latency class
    pub member: MemberClass,
    /// Account code, carried for research output
    pub account: String,

    /// Previous order in the level FIFO (arena slot)
    pub(crate) prev: Option<usize>,
    /// Next order in the level FIFO (arena slot)
    pub(crate) next: Option<usize>,
    /// Set once a stop order has been promoted into the book
    pub(crate) triggered: bool,
    /// Set while a closing-only order waits on the closing queue
    pub(crate) queued_for_close: bool,
}

impl Order {
    /// Currently disclosed quantity: `min(qty_disclosed, qty_remaining)`.
    pub fn disclosed(&self) -> u64 {
        self.qty_disclosed.min(self.qty_remaining)
    }

    /// Currently hidden quantity.
    pub fn hidden(&self) -> u64 {
        self.qty_remaining - self.disclosed()
    }

    /// True when the order sits in a price level FIFO (as opposed to a stop
    /// bucket or the closing-auction queue).
    pub(crate) fn is_resting(&self) -> bool {
        !self.queued_for_close && (!self.kind.is_stop() || self.triggered)
    }

    /// Execute `qty` against this order.
    ///
    /// Decrements the remaining quantity, increments the negotiated quantity
    /// and shrinks the iceberg cap to the new remainder. Returns the signed
    /// deltas to apply to the owning level. The caller must have checked
    /// `qty <= qty_remaining` and removes the order when the remainder hits
    /// zero.
    pub(crate) fn fill(&mut self, qty: u64) -> QtyDeltas {
        debug_assert!(qty <= self.qty_remaining);

        let disclosed_before = self.disclosed();
        self.qty_remaining -= qty;
        self.qty_negotiated += qty;
        self.qty_disclosed = self.qty_disclosed.min(self.qty_remaining);

        let disclosed_delta = disclosed_before as i64 - self.disclosed() as i64;
        QtyDeltas {
            size: -(qty as i64),
            disclosed: -disclosed_delta,
            hidden: -(qty as i64 - disclosed_delta),
        }
    }

    /// Carry a pre-existing negotiated quantity onto a freshly inserted order.
    ///
    /// Used when a price change or a re-peg forces a remove-and-reinsert: the
    /// new record starts with `qty_remaining == qty_initial`, and the fill
    /// history of the old record is replayed as a single fill-by-amount.
    pub(crate) fn overwrite_negotiated(&mut self, qty_negotiated: u64) -> QtyDeltas {
        let disclosed_before = self.disclosed();
        self.qty_negotiated = qty_negotiated;
        self.qty_remaining = self.qty_initial.saturating_sub(qty_negotiated);
        self.qty_disclosed = self.qty_disclosed.min(self.qty_remaining);

        let disclosed_delta = disclosed_before as i64 - self.disclosed() as i64;
        QtyDeltas {
            size: -(qty_negotiated as i64),
            disclosed: -disclosed_delta,
            hidden: -(qty_negotiated as i64 - disclosed_delta),
        }
    }

    /// In-place quantity modification, preserving the negotiated quantity.
    ///
    /// Applies the new initial quantity, minimum and disclosed cap from a
    /// MODIFY message and returns the level deltas.
    pub(crate) fn resize(&mut self, qty_initial: u64, qty_min: u64, qty_disclosed: u64) -> QtyDeltas {
        let size_delta = qty_initial as i64 - self.qty_initial as i64;
        let disclosed_before = self.qty_disclosed;

        self.qty_initial = qty_initial;
        self.qty_remaining = (self.qty_remaining as i64 + size_delta).max(0) as u64;
        self.qty_min = qty_min;
        self.qty_disclosed = qty_disclosed.min(self.qty_remaining);

        let disclosed_delta = self.qty_disclosed as i64 - disclosed_before as i64;
        QtyDeltas {
            size: size_delta,
            disclosed: disclosed_delta,
            hidden: size_delta - disclosed_delta,
        }
    }
}
