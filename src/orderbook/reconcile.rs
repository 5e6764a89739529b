//! Trade-tape reconciliation, stop triggering and pegged re-pricing.
//!
//! During continuous trading the engine does not match orders itself; the
//! exchange tape is ground truth. After every message the book checks
//! whether the order it just touched could be the aggressor of the next
//! tape trade and, if so, consumes the entry and applies the fills. Engine
//! bookkeeping that drifts from the tape surfaces as entries that never
//! become applicable and fails the end-of-day reconciliation.

use super::book::{AggressorRef, OrderBook};
use super::error::BookError;
use super::order::{OrderId, Side};
use super::trade::{Aggressor, TradeSource};
use tracing::debug;

impl OrderBook {
    /// Consume every tape entry the current order can explain.
    ///
    /// An entry applies when the current order is the recorded aggressor
    /// and its price is marketable against the entry, or when the entry is
    /// an auction-leftover print and both legs are resident. Both legs must
    /// be in the index before fills are applied; an entry whose counterparty
    /// never appears stays on the tape and is reported at end of day.
    pub(crate) fn reconcile_trades(&mut self) -> Result<(), BookError> {
        loop {
            let Some(next) = self.tape.last() else {
                break;
            };
            let applies = match next.aggressor {
                Aggressor::Buy => self.current.is_some_and(|c| {
                    c.side == Side::Bid && c.fid == next.bid_fid && c.price >= next.price
                }),
                Aggressor::Sell => self.current.is_some_and(|c| {
                    c.side == Side::Ask && c.fid == next.ask_fid && c.price <= next.price
                }),
                Aggressor::Auction => true,
            };
            if !applies
                || !self.order_index.contains_key(&next.bid_fid)
                || !self.order_index.contains_key(&next.ask_fid)
            {
                break;
            }

            let trade = self.tape.pop().expect("checked non-empty");
            debug!(
                at = %trade.time,
                bid = trade.bid_fid,
                ask = trade.ask_fid,
                qty = trade.qty,
                "applying tape trade"
            );
            let (Some(bid_member), Some(ask_member)) =
                (self.member_of(trade.bid_fid), self.member_of(trade.ask_fid))
            else {
                break;
            };
            self.fill_order(trade.bid_fid, trade.qty)?;
            self.fill_order(trade.ask_fid, trade.qty)?;
            self.push_emitted(
                trade.time,
                trade.price,
                trade.qty,
                trade.bid_fid,
                trade.ask_fid,
                bid_member,
                ask_member,
                TradeSource::Tape,
            );

            if self.last_trade_price != Some(trade.price) {
                self.last_trade_price = Some(trade.price);
                self.repeg_pegged_orders();
            }
        }
        Ok(())
    }

    /// Promote every stop order whose trigger the last trade price reached.
    ///
    /// Buy stops fire at `trigger <= last`, lowest trigger first; sell
    /// stops at `trigger >= last`, highest first. Within one trigger price
    /// market stops fire before limit stops, FIFO within each. Promotions
    /// reconcile against the tape immediately and may move the last trade
    /// price, so the scan repeats until nothing more fires.
    pub(crate) fn trigger_stops(&mut self) -> Result<(), BookError> {
        loop {
            let Some(last) = self.last_trade_price else {
                return Ok(());
            };

            let buy_triggered: Vec<_> = self.buy_stops.range(..=last).map(|(p, _)| *p).collect();
            let sell_triggered: Vec<_> = self
                .sell_stops
                .range(last..)
                .map(|(p, _)| *p)
                .rev()
                .collect();
            if buy_triggered.is_empty() && sell_triggered.is_empty() {
                return Ok(());
            }

            for trigger in buy_triggered {
                if let Some(bucket) = self.buy_stops.remove(&trigger) {
                    for fid in bucket.drain_in_priority() {
                        self.promote_stop(fid)?;
                    }
                }
            }
            for trigger in sell_triggered {
                if let Some(bucket) = self.sell_stops.remove(&trigger) {
                    for fid in bucket.drain_in_priority() {
                        self.promote_stop(fid)?;
                    }
                }
            }
        }
    }

    /// Move one triggered stop into the book and let it reconcile as the
    /// aggressor it may now be.
    fn promote_stop(&mut self, fid: OrderId) -> Result<(), BookError> {
        let Some(&slot) = self.order_index.get(&fid) else {
            debug!(fid, "triggered stop no longer indexed, skipped");
            return Ok(());
        };
        self.orders[slot].triggered = true;
        debug!(fid, "stop order triggered");
        self.add_limit_order(slot);

        let order = &self.orders[slot];
        self.current = Some(AggressorRef {
            fid,
            side: order.side,
            price: order.price,
        });
        self.reconcile_trades()
    }

    /// Re-price pegged orders whose working price fell off the band side of
    /// the touch. The order is reinserted fresh at `min(best_bid, band)`
    /// (resp. `max(best_ask, band)`) and its fill history carried over, so
    /// its time priority resets like any price change.
    pub(crate) fn repeg_pegged_orders(&mut self) {
        let pegged: Vec<OrderId> = self.pegged.clone();
        for fid in pegged {
            let Some(&slot) = self.order_index.get(&fid) else {
                continue;
            };
            let order = &self.orders[slot];
            let needs_repeg = match order.side {
                Side::Bid => order.price < order.stop_price,
                Side::Ask => order.price > order.stop_price,
            };
            if !needs_repeg {
                continue;
            }

            let carried = order.qty_negotiated;
            let mut fresh = order.clone();
            fresh.prev = None;
            fresh.next = None;
            fresh.qty_remaining = fresh.qty_initial;
            fresh.qty_negotiated = 0;

            if self.remove(fid).is_err() {
                continue;
            }
            let new_slot = self.orders.insert(fresh);
            self.order_index.insert(fid, new_slot);
            self.add_pegged_order(new_slot);
            self.carry_negotiated(fid, carried);
            debug!(fid, "re-pegged order");
        }
    }
}
