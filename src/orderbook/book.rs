//! Core order book state machine for one instrument-day replay.

use super::auction::Auction;
use super::error::BookError;
use super::exits::ExitRecord;
use super::level::{LevelView, LimitLevel, Price};
use super::message::OrderMessage;
use super::order::{MemberClass, Order, OrderId, OrderKind, Side};
use super::preprocess;
use super::trade::{TapeTrade, Trade, TradeSource};
use chrono::{NaiveDate, NaiveDateTime};
use slab::Slab;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, error, trace};

/// Two parallel FIFOs of stop orders sharing one trigger price. Market-kind
/// stops fire before limit-kind stops when the price triggers.
#[derive(Debug, Default)]
pub(crate) struct StopBucket {
    pub(crate) market: VecDeque<OrderId>,
    pub(crate) limit: VecDeque<OrderId>,
}

impl StopBucket {
    pub(crate) fn push(&mut self, kind: OrderKind, fid: OrderId) {
        match kind {
            OrderKind::StopMarket => self.market.push_back(fid),
            _ => self.limit.push_back(fid),
        }
    }

    pub(crate) fn remove(&mut self, kind: OrderKind, fid: OrderId) -> bool {
        let queue = match kind {
            OrderKind::StopMarket => &mut self.market,
            _ => &mut self.limit,
        };
        let before = queue.len();
        queue.retain(|&id| id != fid);
        queue.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.market.is_empty() && self.limit.is_empty()
    }

    /// Drain in firing priority: market stops first, then limit stops,
    /// FIFO within each.
    pub(crate) fn drain_in_priority(self) -> impl Iterator<Item = OrderId> {
        self.market.into_iter().chain(self.limit)
    }
}

/// Reference to the order that could be the aggressor of the next tape trade.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AggressorRef {
    pub(crate) fid: OrderId,
    pub(crate) side: Side,
    pub(crate) price: Price,
}

/// Total size per side, sorted best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    /// Bid levels, descending price
    pub bids: Vec<(f64, i64)>,
    /// Ask levels, ascending price
    pub asks: Vec<(f64, i64)>,
}

/// Full level views per side, sorted best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedLadder {
    /// Bid levels, descending price
    pub bids: Vec<LevelView>,
    /// Ask levels, ascending price
    pub asks: Vec<LevelView>,
}

/// The order book for one (instrument, day).
///
/// The book owns every order record in a slab arena; price levels link their
/// queues through slot indices, and the order index maps fundamental ids to
/// slots. All state is single-owner and mutated only through [`process`]:
/// replaying different instrument-days in parallel just means independent
/// books on independent workers.
///
/// [`process`]: OrderBook::process
pub struct OrderBook {
    /// Instrument ISIN
    pub(crate) isin: String,
    /// Trading day
    pub(crate) date: NaiveDate,

    /// Arena owning every live order record
    pub(crate) orders: Slab<Order>,
    /// Fundamental id to arena slot
    pub(crate) order_index: HashMap<OrderId, usize>,

    /// Bid levels keyed by price; best is the maximum key
    pub(crate) bids: BTreeMap<Price, LimitLevel>,
    /// Ask levels keyed by price; best is the minimum key
    pub(crate) asks: BTreeMap<Price, LimitLevel>,
    /// Cached best bid price
    pub(crate) best_bid: Option<Price>,
    /// Cached best ask price
    pub(crate) best_ask: Option<Price>,

    /// Untriggered buy stops by trigger price
    pub(crate) buy_stops: BTreeMap<Price, StopBucket>,
    /// Untriggered sell stops by trigger price
    pub(crate) sell_stops: BTreeMap<Price, StopBucket>,
    /// Orders valid only for the closing auction, in arrival order
    pub(crate) valid_for_closing: VecDeque<OrderId>,
    /// Ids live only through the opening cross
    pub(crate) valid_for_auctions: Vec<OrderId>,
    /// Pegged order ids, in arrival order
    pub(crate) pegged: Vec<OrderId>,

    /// Opening call auction descriptor
    pub(crate) opening_auction: Auction,
    /// Closing call auction descriptor
    pub(crate) closing_auction: Auction,

    /// Exit tape, descending release time, popped from the tail
    pub(crate) exits: Vec<ExitRecord>,
    /// Trade tape, descending negotiation time, popped from the tail
    pub(crate) tape: Vec<TapeTrade>,
    /// Trades the engine applied or synthesized, in sequence order
    pub(crate) emitted: Vec<Trade>,
    /// Per-book trade sequence counter
    pub(crate) trade_seq: u64,

    /// Price of the last trade, from the tape or an auction cross
    pub(crate) last_trade_price: Option<Price>,
    /// Current message time
    pub(crate) clock: Option<NaiveDateTime>,
    /// Aggressor candidate for tape reconciliation
    pub(crate) current: Option<AggressorRef>,
}

impl OrderBook {
    /// Create an empty book for one instrument-day with its two scheduled
    /// auction instants.
    pub fn new(
        isin: &str,
        date: NaiveDate,
        opening_auction: NaiveDateTime,
        closing_auction: NaiveDateTime,
    ) -> Self {
        Self {
            isin: isin.to_string(),
            date,
            orders: Slab::new(),
            order_index: HashMap::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            best_bid: None,
            best_ask: None,
            buy_stops: BTreeMap::new(),
            sell_stops: BTreeMap::new(),
            valid_for_closing: VecDeque::new(),
            valid_for_auctions: Vec::new(),
            pegged: Vec::new(),
            opening_auction: Auction::new(opening_auction),
            closing_auction: Auction::new(closing_auction),
            exits: Vec::new(),
            tape: Vec::new(),
            emitted: Vec::new(),
            trade_seq: 1,
            last_trade_price: None,
            clock: None,
            current: None,
        }
    }

    /// Load the exit tape. Entries are restacked by release time so the
    /// cancel sweep pops them from the tail in chronological order.
    pub fn set_exits(&mut self, mut exits: Vec<ExitRecord>) {
        exits.sort_by_key(|e| e.released_at);
        exits.reverse();
        self.exits = exits;
    }

    /// Load the trade tape, restacked by negotiation time for tail popping.
    pub fn set_tape(&mut self, mut tape: Vec<TapeTrade>) {
        tape.sort_by_key(|t| t.time);
        tape.reverse();
        self.tape = tape;
    }

    /// Instrument ISIN.
    pub fn isin(&self) -> &str {
        &self.isin
    }

    /// Trading day.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Cached best bid price.
    pub fn best_bid(&self) -> Option<Price> {
        self.best_bid
    }

    /// Cached best ask price.
    pub fn best_ask(&self) -> Option<Price> {
        self.best_ask
    }

    /// Best ask minus best bid, when both sides are populated.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask.as_f64() - bid.as_f64()),
            _ => None,
        }
    }

    /// Price of the last trade seen, from the tape or an auction cross.
    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    /// Current engine clock, the validity time of the last message.
    pub fn clock(&self) -> Option<NaiveDateTime> {
        self.clock
    }

    /// Opening auction descriptor.
    pub fn opening_auction(&self) -> &Auction {
        &self.opening_auction
    }

    /// Closing auction descriptor.
    pub fn closing_auction(&self) -> &Auction {
        &self.closing_auction
    }

    /// Trades the engine has applied from the tape or synthesized at the
    /// auction crossings, in sequence order.
    pub fn emitted_trades(&self) -> &[Trade] {
        &self.emitted
    }

    /// Number of tape entries not yet consumed.
    pub fn tape_remaining(&self) -> usize {
        self.tape.len()
    }

    /// Number of live orders in the index.
    pub fn live_orders(&self) -> usize {
        self.order_index.len()
    }

    /// True before the opening auction instant.
    pub fn is_before_opening(&self) -> bool {
        match self.clock {
            Some(now) => now < self.opening_auction.scheduled_at,
            None => true,
        }
    }

    /// Process one message: advance the clock, sweep scheduled exits, run a
    /// pending auction crossing, normalize the message, dispatch it as an
    /// ADD or MODIFY, then reconcile tape trades and trigger stops.
    ///
    /// Messages with normalization or dispatch problems that the replay can
    /// survive (unknown modify patterns, missing touch) are logged and
    /// skipped; hard failures such as an unresolvable auction price
    /// propagate.
    pub fn process(&mut self, message: &OrderMessage) -> Result<(), BookError> {
        debug_assert!(
            self.clock.is_none_or(|now| message.valid_at >= now),
            "message clock went backwards"
        );
        self.clock = Some(message.valid_at);

        self.sweep_exits(None);
        self.check_auctions()?;

        let mut msg = message.clone();
        if let Err(err) =
            preprocess::normalize(&mut msg, self.is_before_opening(), self.best_bid, self.best_ask)
        {
            error!(fid = msg.fid, %err, "skipping message that failed normalization");
            return Ok(());
        }

        if self.order_index.contains_key(&msg.fid) {
            self.modify(&msg)?;
        } else {
            self.add(&msg)?;
        }

        if !self.is_before_opening() {
            self.reconcile_trades()?;
            self.trigger_stops()?;
        }
        Ok(())
    }

    /// Drain exits whose release time has passed.
    ///
    /// With `limit == None` the current clock bounds the sweep; snapshots
    /// pass an explicit instant to sweep up to a point in time without
    /// consuming a message. Exits released by a fill are skipped, the trade
    /// tape accounts for those removals.
    pub fn sweep_exits(&mut self, limit: Option<NaiveDateTime>) {
        let Some(limit) = limit.or(self.clock) else {
            return;
        };
        while self
            .exits
            .last()
            .is_some_and(|exit| exit.released_at < limit)
        {
            let exit = self.exits.pop().expect("checked non-empty");
            if exit.removed_by_trade() {
                continue;
            }
            debug!(fid = exit.fid, at = %exit.released_at, "order left the book");
            if let Err(err) = self.remove(exit.fid) {
                // contingent removals can race the tape; soft-fail
                debug!(fid = exit.fid, %err, "exit for an order not in the book");
            }
        }
    }

    /// Run any auction whose instant the clock has crossed.
    fn check_auctions(&mut self) -> Result<(), BookError> {
        let Some(now) = self.clock else {
            return Ok(());
        };

        if now > self.opening_auction.scheduled_at && !self.opening_auction.passed {
            self.run_opening_auction()?;
            if let Some(price) = self.opening_auction.price {
                self.last_trade_price = Some(price);
            }
            self.trigger_stops()?;
        }

        if now > self.closing_auction.scheduled_at && !self.closing_auction.passed {
            self.run_closing_auction()?;
            if let Some(price) = self.closing_auction.price {
                self.last_trade_price = Some(price);
            }
            self.trigger_stops()?;
        }
        Ok(())
    }

    /// Execute `qty` against the order `fid`, removing it when fully filled
    /// and keeping its level's aggregates exact otherwise.
    pub(crate) fn fill_order(&mut self, fid: OrderId, qty: u64) -> Result<(), BookError> {
        let slot = *self
            .order_index
            .get(&fid)
            .ok_or(BookError::OrderNotFound(fid))?;
        let remaining = self.orders[slot].qty_remaining;

        if qty > remaining {
            return Err(BookError::Overfill {
                fid,
                requested: qty,
                remaining,
            });
        }
        if qty == remaining {
            trace!(fid, qty, "order filled out");
            return self.remove(fid);
        }

        let (member, side, price, resting, deltas) = {
            let order = &mut self.orders[slot];
            (
                order.member,
                order.side,
                order.price,
                order.is_resting(),
                order.fill(qty),
            )
        };
        trace!(fid, qty, left = remaining - qty, "order partially filled");

        if resting {
            let side_map = match side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            match side_map.get_mut(&price) {
                Some(level) => level.apply(member, deltas),
                None => error!(fid, %price, "partial fill on an order with no level"),
            }
        }
        Ok(())
    }

    /// Replay a carried negotiated quantity onto a freshly inserted order.
    pub(crate) fn carry_negotiated(&mut self, fid: OrderId, qty_negotiated: u64) {
        if qty_negotiated == 0 {
            return;
        }
        let Some(&slot) = self.order_index.get(&fid) else {
            return;
        };
        let (member, side, price, resting, deltas) = {
            let order = &mut self.orders[slot];
            (
                order.member,
                order.side,
                order.price,
                order.is_resting(),
                order.overwrite_negotiated(qty_negotiated),
            )
        };
        if resting {
            let side_map = match side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            if let Some(level) = side_map.get_mut(&price) {
                level.apply(member, deltas);
            }
        }
    }

    /// Look up the member class of a live order.
    pub(crate) fn member_of(&self, fid: OrderId) -> Option<MemberClass> {
        self.order_index
            .get(&fid)
            .map(|&slot| self.orders[slot].member)
    }

    /// Record an engine trade, stamping the per-book sequence number.
    pub(crate) fn push_emitted(
        &mut self,
        time: NaiveDateTime,
        price: Price,
        qty: u64,
        bid_fid: OrderId,
        ask_fid: OrderId,
        bid_member: MemberClass,
        ask_member: MemberClass,
        source: TradeSource,
    ) {
        let trade = Trade {
            seq: self.trade_seq,
            time,
            price,
            qty,
            bid_fid,
            ask_fid,
            bid_member,
            ask_member,
            source,
        };
        debug!(
            seq = trade.seq,
            %price,
            qty,
            bid_fid,
            ask_fid,
            ?source,
            "trade"
        );
        self.trade_seq += 1;
        self.emitted.push(trade);
    }

    /// Recompute the cached best bid from the side map.
    pub(crate) fn refresh_best_bid(&mut self) {
        self.best_bid = self.bids.keys().next_back().copied();
    }

    /// Recompute the cached best ask from the side map.
    pub(crate) fn refresh_best_ask(&mut self) {
        self.best_ask = self.asks.keys().next().copied();
    }

    /// Up to `depth` best levels per side as `(price, size)` pairs.
    pub fn levels(&self, depth: Option<usize>) -> Ladder {
        let take = depth.unwrap_or(usize::MAX);
        Ladder {
            bids: self
                .bids
                .iter()
                .rev()
                .take(take)
                .map(|(price, level)| (price.as_f64(), level.size))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(take)
                .map(|(price, level)| (price.as_f64(), level.size))
                .collect(),
        }
    }

    /// Up to `depth` best levels per side with the full per-level breakdown.
    pub fn levels_detailed(&self, depth: Option<usize>) -> DetailedLadder {
        let take = depth.unwrap_or(usize::MAX);
        DetailedLadder {
            bids: self
                .bids
                .iter()
                .rev()
                .take(take)
                .map(|(_, level)| level.view())
                .collect(),
            asks: self
                .asks
                .iter()
                .take(take)
                .map(|(_, level)| level.view())
                .collect(),
        }
    }

    /// Full level view at one price, if present.
    pub fn level_at(&self, side: Side, price: Price) -> Option<LevelView> {
        let side_map = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        side_map.get(&price).map(|level| level.view())
    }
}
