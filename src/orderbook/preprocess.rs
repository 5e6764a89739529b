//! Message normalization applied before dispatch.
//!
//! The raw tapes leave several fields in exchange encoding: a zero disclosed
//! cap means "fully disclosed", stop orders can arrive flagged as plain
//! market/limit with a non-zero trigger, and market-kind orders carry a zero
//! price. Normalization rewrites those fields so the rest of the engine only
//! ever sees consistent messages.

use super::error::BookError;
use super::level::Price;
use super::message::OrderMessage;
use super::order::{OrderKind, Side};

/// Normalize `msg` in place.
///
/// Price synthesis depends on the session phase. Before the opening auction
/// every priced-at-zero market, stop-market and market-to-limit order gets a
/// priority sentinel so price-time ordering ranks it at the head of its
/// side. During continuous trading market and stop-market orders get the
/// sentinel while a market-to-limit order takes the opposite touch.
///
/// # Errors
/// [`BookError::MissingTouch`] when a market-to-limit order arrives during
/// continuous trading and the opposite side is empty.
pub(crate) fn normalize(
    msg: &mut OrderMessage,
    before_opening: bool,
    best_bid: Option<Price>,
    best_ask: Option<Price>,
) -> Result<(), BookError> {
    // A zero iceberg cap encodes a fully disclosed order.
    if msg.qty_disclosed == 0 {
        msg.qty_disclosed = msg.qty_initial;
    }

    // Stop orders flagged as market or limit carry their trigger in the
    // stop-price field.
    if msg.stop_price != Price::ZERO {
        match msg.kind {
            OrderKind::Market => msg.kind = OrderKind::StopMarket,
            OrderKind::Limit => msg.kind = OrderKind::StopLimit,
            _ => {}
        }
    }

    if before_opening {
        if matches!(
            msg.kind,
            OrderKind::Market | OrderKind::StopMarket | OrderKind::MarketToLimit
        ) && msg.price == Price::ZERO
        {
            msg.price = priority_price(msg.side);
        }
    } else {
        match msg.kind {
            OrderKind::Market | OrderKind::StopMarket => {
                msg.price = priority_price(msg.side);
            }
            OrderKind::MarketToLimit => {
                msg.price = match msg.side {
                    Side::Bid => best_ask.ok_or(BookError::MissingTouch { side: msg.side })?,
                    Side::Ask => best_bid.ok_or(BookError::MissingTouch { side: msg.side })?,
                };
            }
            _ => {}
        }
    }

    Ok(())
}

fn priority_price(side: Side) -> Price {
    match side {
        Side::Bid => Price::MARKET_BUY,
        Side::Ask => Price::MARKET_SELL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::MemberClass;
    use chrono::NaiveDate;

    fn message(kind: OrderKind, side: Side, price: f64, stop: f64) -> OrderMessage {
        let ts = NaiveDate::from_ymd_opt(2017, 1, 2)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        OrderMessage {
            fid: 9,
            chain: 1,
            state: '0',
            entered_at: ts,
            valid_at: ts,
            side,
            kind,
            execution: ' ',
            validity: 'J',
            expires_at: None,
            price: Price::from_f64(price),
            stop_price: Price::from_f64(stop),
            qty_initial: 100,
            qty_min: 0,
            qty_disclosed: 0,
            member: MemberClass::Non,
            account: "1".to_string(),
        }
    }

    #[test]
    fn zero_disclosed_cap_means_fully_disclosed() {
        let mut msg = message(OrderKind::Limit, Side::Bid, 32.46, 0.0);
        normalize(&mut msg, true, None, None).unwrap();
        assert_eq!(msg.qty_disclosed, 100);

        let mut iceberg = message(OrderKind::Limit, Side::Bid, 32.46, 0.0);
        iceberg.qty_disclosed = 20;
        normalize(&mut iceberg, true, None, None).unwrap();
        assert_eq!(iceberg.qty_disclosed, 20);
    }

    #[test]
    fn nonzero_trigger_reclassifies_market_and_limit() {
        let mut market = message(OrderKind::Market, Side::Bid, 0.0, 38.5);
        normalize(&mut market, true, None, None).unwrap();
        assert_eq!(market.kind, OrderKind::StopMarket);

        let mut limit = message(OrderKind::Limit, Side::Ask, 38.6, 38.5);
        normalize(&mut limit, true, None, None).unwrap();
        assert_eq!(limit.kind, OrderKind::StopLimit);
    }

    #[test]
    fn pre_open_market_orders_get_priority_sentinels() {
        let mut buy = message(OrderKind::Market, Side::Bid, 0.0, 0.0);
        normalize(&mut buy, true, None, None).unwrap();
        assert_eq!(buy.price, Price::MARKET_BUY);

        let mut sell = message(OrderKind::MarketToLimit, Side::Ask, 0.0, 0.0);
        normalize(&mut sell, true, None, None).unwrap();
        assert_eq!(sell.price, Price::MARKET_SELL);

        // a market-to-limit that already carries a price keeps it
        let mut priced = message(OrderKind::MarketToLimit, Side::Bid, 38.2, 0.0);
        normalize(&mut priced, true, None, None).unwrap();
        assert_eq!(priced.price, Price::from_f64(38.2));
    }

    #[test]
    fn continuous_market_to_limit_takes_the_touch() {
        let bid = Some(Price::from_f64(38.0));
        let ask = Some(Price::from_f64(38.1));

        let mut buy = message(OrderKind::MarketToLimit, Side::Bid, 0.0, 0.0);
        normalize(&mut buy, false, bid, ask).unwrap();
        assert_eq!(buy.price, Price::from_f64(38.1));

        let mut sell = message(OrderKind::MarketToLimit, Side::Ask, 0.0, 0.0);
        normalize(&mut sell, false, bid, ask).unwrap();
        assert_eq!(sell.price, Price::from_f64(38.0));
    }

    #[test]
    fn continuous_market_to_limit_without_touch_fails() {
        let mut buy = message(OrderKind::MarketToLimit, Side::Bid, 0.0, 0.0);
        let err = normalize(&mut buy, false, None, None).unwrap_err();
        assert_eq!(err, BookError::MissingTouch { side: Side::Bid });
    }
}
