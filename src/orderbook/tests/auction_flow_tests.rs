//! Opening and closing crossings driven through the message loop.

use super::test_helpers::*;
use crate::orderbook::{Aggressor, Price, Side, TapeTrade, TradeSource};

#[test]
fn opening_cross_fills_crossed_orders_and_sets_the_price() {
    let mut book = session_book();
    book.process(&limit(1, Side::Bid, 10.0, 100, dtm(8, 0, 0))).unwrap();
    book.process(&limit(2, Side::Ask, 10.0, 60, dtm(8, 0, 1))).unwrap();
    book.process(&limit(3, Side::Ask, 10.2, 50, dtm(8, 0, 2))).unwrap();
    assert!(!book.opening_auction().passed);

    // the first message past the auction instant runs the cross
    book.process(&limit(9, Side::Bid, 9.0, 5, dtm(9, 0, 1))).unwrap();

    let auction = book.opening_auction();
    assert!(auction.passed);
    assert_eq!(auction.price, Some(Price::from_f64(10.0)));
    assert_eq!(book.last_trade_price(), Some(Price::from_f64(10.0)));

    let trades = book.emitted_trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].qty, 60);
    assert_eq!(trades[0].bid_fid, 1);
    assert_eq!(trades[0].ask_fid, 2);
    assert_eq!(trades[0].source, TradeSource::Auction);
    assert_eq!(trades[0].time, dtm(9, 0, 0));

    let ladder = book.levels(None);
    assert_eq!(ladder.bids, vec![(10.0, 40), (9.0, 5)]);
    assert_eq!(ladder.asks, vec![(10.2, 50)]);
    assert_level_invariants(&book);
}

#[test]
fn exchange_prints_of_the_crossing_are_dropped_not_applied() {
    let mut book = session_book();
    book.set_tape(vec![TapeTrade {
        time: dtm(9, 0, 0),
        bid_fid: 1,
        ask_fid: 2,
        qty: 60,
        price: Price::from_f64(10.0),
        aggressor: Aggressor::Auction,
    }]);

    book.process(&limit(1, Side::Bid, 10.0, 100, dtm(8, 0, 0))).unwrap();
    book.process(&limit(2, Side::Ask, 10.0, 60, dtm(8, 0, 1))).unwrap();
    book.process(&limit(9, Side::Bid, 9.0, 5, dtm(9, 0, 1))).unwrap();

    // applying the print on top of the synthesized fills would double count
    assert_eq!(book.tape_remaining(), 0);
    assert_eq!(book.levels(None).bids, vec![(10.0, 40), (9.0, 5)]);
    assert_level_invariants(&book);
}

#[test]
fn auction_only_orders_leave_after_the_opening_cross() {
    let mut book = session_book();
    let mut auction_only = limit(5, Side::Bid, 9.5, 70, dtm(8, 0, 0));
    auction_only.validity = '2';
    book.process(&auction_only).unwrap();
    book.process(&limit(1, Side::Bid, 10.0, 100, dtm(8, 0, 1))).unwrap();
    assert_eq!(book.live_orders(), 2);

    book.process(&limit(9, Side::Ask, 12.0, 5, dtm(9, 0, 1))).unwrap();

    // no cross happened (nothing overlapped) but the auction passed
    assert!(book.opening_auction().passed);
    assert_eq!(book.opening_auction().price, None);
    assert!(!book.order_index.contains_key(&5));
    assert_eq!(book.levels(None).bids, vec![(10.0, 100)]);
}

#[test]
fn auction_only_orders_after_the_cross_are_dropped() {
    let mut book = session_book();
    book.process(&limit(9, Side::Bid, 9.0, 5, dtm(9, 0, 1))).unwrap();
    assert!(book.opening_auction().passed);

    let mut late = limit(6, Side::Bid, 9.5, 70, dtm(9, 30, 0));
    late.validity = '2';
    book.process(&late).unwrap();
    assert!(!book.order_index.contains_key(&6));
    assert_eq!(book.live_orders(), 1);
}

#[test]
fn closing_cross_releases_the_closing_queue() {
    let mut book = session_book();
    // pass the opening on an empty book
    book.process(&limit(8, Side::Ask, 10.0, 30, dtm(9, 0, 1))).unwrap();
    assert!(book.opening_auction().passed);

    let mut closing_only = limit(7, Side::Bid, 10.05, 50, dtm(10, 0, 0));
    closing_only.validity = '7';
    book.process(&closing_only).unwrap();
    assert!(book.levels(None).bids.is_empty());

    // first message past the closing instant releases the queue and crosses
    book.process(&limit(9, Side::Bid, 9.0, 5, dtm(17, 35, 1))).unwrap();

    let auction = book.closing_auction();
    assert!(auction.passed);
    assert_eq!(auction.price, Some(Price::from_f64(10.05)));

    let trades = book.emitted_trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].qty, 30);
    assert_eq!(trades[0].bid_fid, 7);
    assert_eq!(trades[0].ask_fid, 8);

    // residual of the closing-only order rests on the book
    assert_eq!(book.levels(None).bids, vec![(10.05, 20), (9.0, 5)]);
    assert!(book.levels(None).asks.is_empty());
    assert_level_invariants(&book);
}
