//! Order book error types

use super::order::{OrderId, Side};
use std::fmt;

/// Errors that can occur while reconstructing a book from tapes.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BookError {
    /// Order not found in the book index.
    OrderNotFound(OrderId),

    /// A tape trade asked for more quantity than the order has left.
    Overfill {
        /// Order being filled
        fid: OrderId,
        /// Quantity the tape asked for
        requested: u64,
        /// Quantity remaining on the order
        remaining: u64,
    },

    /// The auction tie-break rules left more than one candidate price.
    UnresolvedAuctionPrice {
        /// Candidate prices that survived rules 1-3
        candidates: Vec<f64>,
    },

    /// A market-to-limit order arrived while the opposite touch was empty.
    MissingTouch {
        /// Side of the incoming order
        side: Side,
    },

    /// Unrecognized order kind code on a tape row.
    UnknownOrderKind(char),

    /// Unrecognized side code on a tape row.
    UnknownSide(char),

    /// Unrecognized member class on a tape row.
    UnknownMemberClass(String),

    /// Unrecognized aggressor flag on a trade tape row.
    UnknownAggressor(String),
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookError::OrderNotFound(fid) => write!(f, "order not found: {fid}"),
            BookError::Overfill {
                fid,
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "overfill on order {fid}: tape asked {requested}, only {remaining} remaining"
                )
            }
            BookError::UnresolvedAuctionPrice { candidates } => {
                write!(
                    f,
                    "auction price unresolved after tie-break rules, candidates: {candidates:?}"
                )
            }
            BookError::MissingTouch { side } => {
                write!(
                    f,
                    "market-to-limit {side} order with no opposite touch to price against"
                )
            }
            BookError::UnknownOrderKind(code) => write!(f, "unknown order kind code: {code:?}"),
            BookError::UnknownSide(code) => write!(f, "unknown side code: {code:?}"),
            BookError::UnknownMemberClass(code) => {
                write!(f, "unknown member class: {code:?}")
            }
            BookError::UnknownAggressor(code) => write!(f, "unknown aggressor flag: {code:?}"),
        }
    }
}

impl std::error::Error for BookError {}
