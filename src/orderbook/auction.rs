//! Call-auction uncrossing.
//!
//! Price discovery builds the cumulative buy-demand and sell-supply curves
//! over the union of resting limit prices and applies the exchange rules in
//! order: maximize executable volume, minimize the absolute imbalance, then
//! side the price with the residual. A tie that survives all three rules is
//! an unresolved condition and fails the day rather than silently picking.
//!
//! Stop orders never rest on levels, and pegged quantity is subtracted from
//! the curves: neither participates in price discovery. Pegged orders are
//! re-pegged to their band immediately after the cross.

use super::book::OrderBook;
use super::error::BookError;
use super::level::{LimitLevel, Price};
use super::order::Side;
use super::trade::{Aggressor, TradeSource};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info};

/// A scheduled call auction: its instant, whether it has run, and the
/// uncrossing price once it has.
#[derive(Debug, Clone, PartialEq)]
pub struct Auction {
    /// Scheduled auction instant
    pub scheduled_at: NaiveDateTime,
    /// Set once the crossing has run
    pub passed: bool,
    /// Uncrossing price; `None` before the cross or when nothing crossed
    pub price: Option<Price>,
}

impl Auction {
    /// Descriptor for an auction scheduled at `scheduled_at`.
    pub fn new(scheduled_at: NaiveDateTime) -> Self {
        Self {
            scheduled_at,
            passed: false,
            price: None,
        }
    }
}

/// One candidate price on the merged auction curve.
struct Candidate {
    price: Price,
    executable: i64,
    imbalance: i64,
}

/// Find the uncrossing price over the current sides.
///
/// `pegged_by_level` holds quantity to exclude from the curves, keyed by
/// `(side, price)`.
///
/// Returns `None` when no price has both curves defined or nothing would
/// execute.
///
/// # Errors
/// [`BookError::UnresolvedAuctionPrice`] when the surviving candidates
/// carry residuals on both sides.
fn uncrossing_price(
    bids: &BTreeMap<Price, LimitLevel>,
    asks: &BTreeMap<Price, LimitLevel>,
    pegged_by_level: &HashMap<(Side, Price), i64>,
) -> Result<Option<Price>, BookError> {
    let level_size = |side: Side, price: Price, size: i64| {
        size - pegged_by_level
            .get(&(side, price))
            .copied()
            .unwrap_or(0)
    };

    // ascending price with per-level size, pegged quantity excluded
    let bid_sizes: Vec<(Price, i64)> = bids
        .iter()
        .map(|(&p, l)| (p, level_size(Side::Bid, p, l.size)))
        .collect();
    let ask_sizes: Vec<(Price, i64)> = asks
        .iter()
        .map(|(&p, l)| (p, level_size(Side::Ask, p, l.size)))
        .collect();

    if bid_sizes.is_empty() || ask_sizes.is_empty() {
        return Ok(None);
    }

    // cumulative buy demand at price p is the suffix sum of bids >= p
    let mut bid_suffix = vec![0i64; bid_sizes.len()];
    let mut running = 0i64;
    for (i, &(_, size)) in bid_sizes.iter().enumerate().rev() {
        running += size;
        bid_suffix[i] = running;
    }
    // cumulative sell supply at price p is the prefix sum of asks <= p
    let mut ask_prefix = vec![0i64; ask_sizes.len()];
    let mut running = 0i64;
    for (i, &(_, size)) in ask_sizes.iter().enumerate() {
        running += size;
        ask_prefix[i] = running;
    }

    let demand_at = |price: Price| -> Option<i64> {
        let idx = bid_sizes.partition_point(|&(p, _)| p < price);
        (idx < bid_sizes.len()).then(|| bid_suffix[idx])
    };
    let supply_at = |price: Price| -> Option<i64> {
        let idx = ask_sizes.partition_point(|&(p, _)| p <= price);
        (idx > 0).then(|| ask_prefix[idx - 1])
    };

    let all_prices: BTreeSet<Price> = bid_sizes
        .iter()
        .map(|&(p, _)| p)
        .chain(ask_sizes.iter().map(|&(p, _)| p))
        .collect();

    let candidates: Vec<Candidate> = all_prices
        .into_iter()
        .filter_map(|price| {
            let demand = demand_at(price)?;
            let supply = supply_at(price)?;
            Some(Candidate {
                price,
                executable: demand.min(supply),
                imbalance: demand - supply,
            })
        })
        .collect();

    // rule 1: maximize executable volume
    let Some(max_executable) = candidates.iter().map(|c| c.executable).max() else {
        return Ok(None);
    };
    if max_executable <= 0 {
        return Ok(None);
    }
    let winners: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.executable == max_executable)
        .collect();

    // rule 2: minimize the absolute imbalance
    let min_abs = winners
        .iter()
        .map(|c| c.imbalance.abs())
        .min()
        .expect("winners non-empty");
    let finalists: Vec<&Candidate> = winners
        .into_iter()
        .filter(|c| c.imbalance.abs() == min_abs)
        .collect();

    // rule 3 picks the side of the residual; mixed residual signs among the
    // finalists would make that pick arbitrary (rule 4: fail loudly)
    let any_positive = finalists.iter().any(|c| c.imbalance > 0);
    let any_negative = finalists.iter().any(|c| c.imbalance < 0);
    if any_positive && any_negative {
        return Err(BookError::UnresolvedAuctionPrice {
            candidates: finalists.iter().map(|c| c.price.as_f64()).collect(),
        });
    }

    let price = if any_negative {
        finalists.iter().map(|c| c.price).min()
    } else {
        finalists.iter().map(|c| c.price).max()
    };
    Ok(price)
}

impl OrderBook {
    /// Pegged quantity resting at each level, to exclude from price
    /// discovery.
    fn pegged_quantity_by_level(&self) -> HashMap<(Side, Price), i64> {
        let mut by_level: HashMap<(Side, Price), i64> = HashMap::new();
        for &fid in &self.pegged {
            if let Some(&slot) = self.order_index.get(&fid) {
                let order = &self.orders[slot];
                *by_level.entry((order.side, order.price)).or_insert(0) +=
                    order.qty_remaining as i64;
            }
        }
        by_level
    }

    /// Run the opening cross, then drop every auction-only order still
    /// resting.
    pub(crate) fn run_opening_auction(&mut self) -> Result<(), BookError> {
        let scheduled_at = self.opening_auction.scheduled_at;
        let price = self.run_crossing(scheduled_at)?;
        self.opening_auction.price = price;
        self.opening_auction.passed = true;
        info!(isin = %self.isin, price = ?price.map(Price::as_f64), "opening auction passed");

        while let Some(fid) = self.valid_for_auctions.pop() {
            if self.order_index.contains_key(&fid) {
                debug!(fid, "auction-only order expired after the opening cross");
                let _ = self.remove(fid);
            }
        }
        Ok(())
    }

    /// Release the closing-only queue into the book, then run the closing
    /// cross.
    pub(crate) fn run_closing_auction(&mut self) -> Result<(), BookError> {
        while let Some(fid) = self.valid_for_closing.pop_front() {
            let Some(&slot) = self.order_index.get(&fid) else {
                continue;
            };
            self.orders[slot].queued_for_close = false;
            self.add_limit_order(slot);
        }

        let scheduled_at = self.closing_auction.scheduled_at;
        let price = self.run_crossing(scheduled_at)?;
        self.closing_auction.price = price;
        self.closing_auction.passed = true;
        info!(isin = %self.isin, price = ?price.map(Price::as_f64), "closing auction passed");
        Ok(())
    }

    /// Shared crossing: discover the price, execute the crossed orders,
    /// drop the exchange's own prints of this crossing from the tape, and
    /// re-peg.
    fn run_crossing(&mut self, at: NaiveDateTime) -> Result<Option<Price>, BookError> {
        let pegged_by_level = self.pegged_quantity_by_level();
        let price = uncrossing_price(&self.bids, &self.asks, &pegged_by_level)?;

        if let Some(pstar) = price {
            self.execute_crossing(pstar, at)?;
            self.drain_auction_prints(at);
            self.last_trade_price = Some(pstar);
            self.repeg_pegged_orders();
        }
        Ok(price)
    }

    /// Trade the crossed heads at the uncrossing price until the heads no
    /// longer cross or a side empties.
    fn execute_crossing(&mut self, pstar: Price, at: NaiveDateTime) -> Result<(), BookError> {
        loop {
            let (Some(bid_price), Some(ask_price)) = (self.best_bid, self.best_ask) else {
                break;
            };
            if bid_price < pstar || ask_price > pstar {
                break;
            }

            let bid_head = self.bids.get(&bid_price).and_then(LimitLevel::head);
            let ask_head = self.asks.get(&ask_price).and_then(LimitLevel::head);
            let (Some(bid_slot), Some(ask_slot)) = (bid_head, ask_head) else {
                error!(%bid_price, %ask_price, "best level with empty queue during crossing");
                break;
            };

            let (bid_fid, bid_member, bid_left) = {
                let order = &self.orders[bid_slot];
                (order.fid, order.member, order.qty_remaining)
            };
            let (ask_fid, ask_member, ask_left) = {
                let order = &self.orders[ask_slot];
                (order.fid, order.member, order.qty_remaining)
            };

            let qty = bid_left.min(ask_left);
            self.fill_order(bid_fid, qty)?;
            self.fill_order(ask_fid, qty)?;
            self.push_emitted(
                at,
                pstar,
                qty,
                bid_fid,
                ask_fid,
                bid_member,
                ask_member,
                TradeSource::Auction,
            );
        }
        Ok(())
    }

    /// Pop the exchange's prints of the crossing just synthesized. The
    /// fills are already applied; applying the prints too would double
    /// count. Later auction-flagged prints stay for the both-resident
    /// reconciliation rule.
    fn drain_auction_prints(&mut self, at: NaiveDateTime) {
        while self
            .tape
            .last()
            .is_some_and(|t| t.aggressor == Aggressor::Auction && t.time <= at)
        {
            let print = self.tape.pop().expect("checked non-empty");
            debug!(
                bid = print.bid_fid,
                ask = print.ask_fid,
                qty = print.qty,
                "dropped exchange print of the crossing"
            );
        }
    }
}
