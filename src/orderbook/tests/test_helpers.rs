//! Shared builders for engine tests.

use crate::orderbook::order::MemberClass;
use crate::orderbook::{OrderBook, OrderMessage, OrderKind, Price, Side};
use chrono::{NaiveDate, NaiveDateTime};

/// The test trading day.
pub(crate) fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, 2).unwrap()
}

/// A timestamp on the test day.
pub(crate) fn dtm(hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    day().and_hms_opt(hour, min, sec).unwrap()
}

/// A microsecond-precision timestamp on the test day.
pub(crate) fn dtm_us(hour: u32, min: u32, sec: u32, micro: u32) -> NaiveDateTime {
    day().and_hms_micro_opt(hour, min, sec, micro).unwrap()
}

/// A book whose opening cross is at 09:00 and closing cross at 17:35.
pub(crate) fn session_book() -> OrderBook {
    OrderBook::new("FR0000120404", day(), dtm(9, 0, 0), dtm(17, 35, 0))
}

/// A book already past a (trivially empty) opening cross once the first
/// message after 07:00 arrives; everything at normal hours is continuous.
pub(crate) fn continuous_book() -> OrderBook {
    OrderBook::new("FR0000120404", day(), dtm(7, 0, 0), dtm(17, 35, 0))
}

/// A plain limit order message.
pub(crate) fn limit(
    fid: u64,
    side: Side,
    price: f64,
    qty: u64,
    at: NaiveDateTime,
) -> OrderMessage {
    OrderMessage {
        fid,
        chain: 1,
        state: '0',
        entered_at: at,
        valid_at: at,
        side,
        kind: OrderKind::Limit,
        execution: ' ',
        validity: '1',
        expires_at: None,
        price: Price::from_f64(price),
        stop_price: Price::ZERO,
        qty_initial: qty,
        qty_min: 0,
        qty_disclosed: 0,
        member: MemberClass::Mix,
        account: "070".to_string(),
    }
}

/// Every level's aggregates must decompose exactly and match its queue.
pub(crate) fn assert_level_invariants(book: &OrderBook) {
    for level in book.bids.values().chain(book.asks.values()) {
        assert!(!level.is_empty(), "level {} left empty in map", level.price);
        let queue_size: i64 = level.iter(&book.orders).map(|o| o.qty_remaining as i64).sum();
        assert_eq!(level.size, queue_size, "level {} size drifted", level.price);
        assert_eq!(
            level.size,
            level.disclosed.total() + level.hidden.total(),
            "level {} decomposition drifted",
            level.price
        );
        for order in level.iter(&book.orders) {
            assert_eq!(
                order.qty_remaining + order.qty_negotiated,
                order.qty_initial,
                "order {} quantity identity broken",
                order.fid
            );
        }
    }
}
