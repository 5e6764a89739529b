//! Normalized order life-cycle message.
//!
//! One [`OrderMessage`] corresponds to one row of a history or orders tape
//! after schema decoding. The engine receives messages in validity-time
//! order; whether a message is an ADD or a MODIFY is decided by the book
//! from the presence of the fundamental id in its index, not by the message
//! itself.

use super::level::Price;
use super::order::{MemberClass, Order, OrderId, OrderKind, Side};
use chrono::NaiveDateTime;

/// A decoded order life-cycle message.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMessage {
    /// Fundamental order id
    pub fid: OrderId,
    /// Characteristic (chain) id
    pub chain: u32,
    /// Raw state code
    pub state: char,
    /// Book-entry time (time-priority key)
    pub entered_at: NaiveDateTime,
    /// Validity time (message effective time, drives the clock)
    pub valid_at: NaiveDateTime,
    /// Side
    pub side: Side,
    /// Order kind; may be reclassified by preprocessing
    pub kind: OrderKind,
    /// Raw execution-condition code
    pub execution: char,
    /// Raw validity code
    pub validity: char,
    /// Expiration, if any
    pub expires_at: Option<NaiveDateTime>,
    /// Limit price; zero on raw market-kind rows until preprocessing
    pub price: Price,
    /// Stop trigger price, zero when absent
    pub stop_price: Price,
    /// Initial quantity
    pub qty_initial: u64,
    /// Minimum execution quantity
    pub qty_min: u64,
    /// Disclosed cap; zero means fully disclosed until preprocessing
    pub qty_disclosed: u64,
    /// Member latency class
    pub member: MemberClass,
    /// Account code
    pub account: String,
}

impl OrderMessage {
    /// Materialize a fresh order record from this message.
    pub(crate) fn to_order(&self) -> Order {
        Order {
            fid: self.fid,
            chain: self.chain,
            state: self.state,
            entered_at: self.entered_at,
            valid_at: self.valid_at,
            side: self.side,
            kind: self.kind,
            execution: self.execution,
            validity: self.validity,
            expires_at: self.expires_at,
            price: self.price,
            stop_price: self.stop_price,
            qty_initial: self.qty_initial,
            qty_remaining: self.qty_initial,
            qty_negotiated: 0,
            qty_min: self.qty_min,
            qty_disclosed: self.qty_disclosed,
            member: self.member,
            account: self.account.clone(),
            prev: None,
            next: None,
            triggered: false,
            queued_for_close: false,
        }
    }
}
