//! ADD, MODIFY and remove paths of the book.
//!
//! Dispatch is by presence in the order index: the tapes carry no explicit
//! ADD flag, a message for an unknown fundamental id *is* the ADD. History
//! files routinely carry expiration-only "modifications" that change nothing
//! observable; those fall through the MODIFY chain into the expiration arm
//! or a logged no-op.

use super::book::{AggressorRef, OrderBook};
use super::error::BookError;
use super::level::LimitLevel;
use super::message::OrderMessage;
use super::order::{OrderKind, Side, VALIDITY_AUCTIONS_ONLY, VALIDITY_CLOSING_ONLY};
use tracing::{debug, error, trace};

impl OrderBook {
    /// Insert a new order from a preprocessed message.
    ///
    /// Closing-only orders go to the closing queue and are indexed without
    /// touching a level. Auction-only orders entered before the opening
    /// cross are tagged for removal right after it; entered later they are
    /// dropped outright, the auction they were for is gone.
    pub(crate) fn add(&mut self, msg: &OrderMessage) -> Result<(), BookError> {
        if msg.validity == VALIDITY_CLOSING_ONLY {
            let mut order = msg.to_order();
            order.queued_for_close = true;
            let slot = self.orders.insert(order);
            self.order_index.insert(msg.fid, slot);
            self.valid_for_closing.push_back(msg.fid);
            self.current = Some(AggressorRef {
                fid: msg.fid,
                side: msg.side,
                price: msg.price,
            });
            debug!(fid = msg.fid, "queued closing-only order");
            return Ok(());
        }

        if msg.validity == VALIDITY_AUCTIONS_ONLY {
            if self.opening_auction.passed {
                debug!(
                    fid = msg.fid,
                    "auction-only order after the opening cross, dropped"
                );
                return Ok(());
            }
            self.valid_for_auctions.push(msg.fid);
        }

        let mut order = msg.to_order();
        if order.kind == OrderKind::Pegged {
            // the limit price field carries the band; the working price is
            // derived from the touch
            order.stop_price = order.price;
        }
        let slot = self.orders.insert(order);
        self.order_index.insert(msg.fid, slot);

        match msg.kind {
            OrderKind::Limit | OrderKind::Market | OrderKind::MarketToLimit => {
                self.add_limit_order(slot)
            }
            OrderKind::StopMarket | OrderKind::StopLimit => self.add_stop_order(slot),
            OrderKind::Pegged => self.add_pegged_order(slot),
        }

        let order = &self.orders[slot];
        self.current = Some(AggressorRef {
            fid: order.fid,
            side: order.side,
            price: order.price,
        });
        Ok(())
    }

    /// Rest the order at `slot` on its price level, creating the level and
    /// improving the cached best if needed.
    pub(crate) fn add_limit_order(&mut self, slot: usize) {
        let (fid, side, price) = {
            let order = &self.orders[slot];
            (order.fid, order.side, order.price)
        };

        let side_map = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        side_map
            .entry(price)
            .or_insert_with(|| LimitLevel::new(price))
            .push_back(&mut self.orders, slot);

        match side {
            Side::Bid => {
                if self.best_bid.is_none_or(|best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Ask => {
                if self.best_ask.is_none_or(|best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
        debug!(fid, %side, %price, "added order to book");
    }

    /// Park the stop order at `slot` in its trigger-price bucket. The order
    /// is not on any level until it triggers.
    fn add_stop_order(&mut self, slot: usize) {
        let (fid, side, kind, stop_price) = {
            let order = &self.orders[slot];
            (order.fid, order.side, order.kind, order.stop_price)
        };
        let stops = match side {
            Side::Bid => &mut self.buy_stops,
            Side::Ask => &mut self.sell_stops,
        };
        stops.entry(stop_price).or_default().push(kind, fid);
        debug!(fid, %side, trigger = %stop_price, "parked stop order");
    }

    /// Rest the pegged order at `slot` at the same-side touch, bounded by
    /// its band. With an empty touch the band itself is the working price.
    pub(crate) fn add_pegged_order(&mut self, slot: usize) {
        let (fid, side, band) = {
            let order = &self.orders[slot];
            (order.fid, order.side, order.stop_price)
        };
        let price = match side {
            Side::Bid => self.best_bid.map_or(band, |touch| touch.min(band)),
            Side::Ask => self.best_ask.map_or(band, |touch| touch.max(band)),
        };
        self.orders[slot].price = price;
        self.pegged.push(fid);
        self.add_limit_order(slot);
    }

    /// Apply a MODIFY message to the resting or contingent order.
    ///
    /// Exactly one change is applied, probed in exchange order: price, stop
    /// price, quantity, expiration. A price change is a remove-and-reinsert
    /// that carries the negotiated quantity; a stop-price change relocates
    /// the order to the new trigger bucket and resets its time priority
    /// there.
    pub(crate) fn modify(&mut self, msg: &OrderMessage) -> Result<(), BookError> {
        let slot = *self
            .order_index
            .get(&msg.fid)
            .ok_or(BookError::OrderNotFound(msg.fid))?;
        let (price, stop_price, qty_initial, expires_at, kind, triggered) = {
            let order = &self.orders[slot];
            (
                order.price,
                order.stop_price,
                order.qty_initial,
                order.expires_at,
                order.kind,
                order.triggered,
            )
        };
        self.current = Some(AggressorRef {
            fid: msg.fid,
            side: msg.side,
            price: msg.price,
        });

        if price != msg.price {
            debug!(fid = msg.fid, from = %price, to = %msg.price, "modified order price");
            let carried = self.orders[slot].qty_negotiated;
            self.remove(msg.fid)?;
            self.add(msg)?;
            self.carry_negotiated(msg.fid, carried);
        } else if stop_price != msg.stop_price {
            if kind.is_stop() && !triggered {
                debug!(
                    fid = msg.fid,
                    from = %stop_price,
                    to = %msg.stop_price,
                    "relocated stop order"
                );
                self.remove(msg.fid)?;
                self.add(msg)?;
            } else {
                // a triggered stop rests like a limit; the trigger no longer
                // drives placement
                self.orders[slot].stop_price = msg.stop_price;
            }
        } else if qty_initial != msg.qty_initial {
            debug!(
                fid = msg.fid,
                from = qty_initial,
                to = msg.qty_initial,
                "modified order quantity"
            );
            let (member, side, level_price, resting, deltas) = {
                let order = &mut self.orders[slot];
                (
                    order.member,
                    order.side,
                    order.price,
                    order.is_resting(),
                    order.resize(msg.qty_initial, msg.qty_min, msg.qty_disclosed),
                )
            };
            if resting {
                let side_map = match side {
                    Side::Bid => &mut self.bids,
                    Side::Ask => &mut self.asks,
                };
                match side_map.get_mut(&level_price) {
                    Some(level) => level.apply(member, deltas),
                    None => error!(fid = msg.fid, %level_price, "resized order has no level"),
                }
            }
        } else if expires_at != msg.expires_at {
            trace!(fid = msg.fid, "extended order expiration");
            self.orders[slot].expires_at = msg.expires_at;
        } else {
            error!(fid = msg.fid, "modify pattern not handled, message skipped");
        }
        Ok(())
    }

    /// Remove the order `fid` from whichever container holds it.
    ///
    /// The index entry goes first; then an untriggered stop leaves its
    /// bucket, a queued closing-only order leaves the closing queue, and a
    /// resting order is unlinked from its level. An emptied level drops its
    /// price key, and a dropped best advances the cached extremum.
    pub(crate) fn remove(&mut self, fid: u64) -> Result<(), BookError> {
        let Some(slot) = self.order_index.remove(&fid) else {
            return Err(BookError::OrderNotFound(fid));
        };
        let (kind, side, price, stop_price, triggered, queued_for_close) = {
            let order = &self.orders[slot];
            (
                order.kind,
                order.side,
                order.price,
                order.stop_price,
                order.triggered,
                order.queued_for_close,
            )
        };

        if kind.is_stop() && !triggered {
            let stops = match side {
                Side::Bid => &mut self.buy_stops,
                Side::Ask => &mut self.sell_stops,
            };
            if let Some(bucket) = stops.get_mut(&stop_price) {
                bucket.remove(kind, fid);
                if bucket.is_empty() {
                    stops.remove(&stop_price);
                }
            }
            self.orders.remove(slot);
            trace!(fid, "removed untriggered stop order");
            return Ok(());
        }

        if kind == OrderKind::Pegged {
            self.pegged.retain(|&id| id != fid);
        }

        if queued_for_close {
            self.valid_for_closing.retain(|&id| id != fid);
            self.orders.remove(slot);
            trace!(fid, "removed closing-only order");
            return Ok(());
        }

        let side_map = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let mut level_emptied = false;
        match side_map.get_mut(&price) {
            Some(level) => {
                level.unlink(&mut self.orders, slot);
                level_emptied = level.is_empty();
            }
            None => error!(fid, %price, "removed order had no level"),
        }
        if level_emptied {
            side_map.remove(&price);
            match side {
                Side::Bid => {
                    if self.best_bid == Some(price) {
                        self.refresh_best_bid();
                    }
                }
                Side::Ask => {
                    if self.best_ask == Some(price) {
                        self.refresh_best_ask();
                    }
                }
            }
        }

        self.orders.remove(slot);
        trace!(fid, "removed order");
        Ok(())
    }
}
