//! Price levels and the fixed-point price key.
//!
//! Each [`LimitLevel`] aggregates every order resting at one `(side, price)`
//! and owns an intrusive FIFO over the book's order arena: the level stores
//! `head`/`tail` slot indices and each [`Order`](super::order::Order) carries
//! `prev`/`next` links. A level exists in its side map iff its queue is
//! non-empty.

use super::order::{MemberClass, Order, QtyDeltas};
use serde::{Serialize, Serializer};
use slab::Slab;
use std::fmt;

/// Scale of the fixed-point price representation (millionths).
const PRICE_SCALE: f64 = 1_000_000.0;

/// Tick-exact price, stored in millionths so it can key ordered maps.
///
/// The tape encodes prices as decimal floats; converting them to a fixed
/// point integer makes equality and ordering exact, which the level maps and
/// the auction solver rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(u64);

impl Price {
    /// Zero price, also the synthetic priority price of a sell market order.
    pub const ZERO: Price = Price(0);

    /// Synthetic priority price of a buy market order (100 000 currency
    /// units). Reserved: real limit prices never reach it.
    pub const MARKET_BUY: Price = Price(100_000_000_000);

    /// Synthetic priority price of a sell market order.
    pub const MARKET_SELL: Price = Price(0);

    /// Convert from the tape's decimal representation.
    pub fn from_f64(price: f64) -> Price {
        Price((price * PRICE_SCALE).round() as u64)
    }

    /// Back to a decimal price.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / PRICE_SCALE
    }

    /// True for the two reserved market-order sentinels.
    pub fn is_sentinel(self) -> bool {
        self == Price::MARKET_BUY || self == Price::MARKET_SELL
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.as_f64())
    }
}

/// Size split by submitting member class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberSizes {
    /// Quantity from HFT members
    pub hft: i64,
    /// Quantity from mixed members
    pub mix: i64,
    /// Quantity from non-HFT members
    pub non: i64,
}

impl MemberSizes {
    /// Add a signed delta to one member bucket.
    pub(crate) fn add(&mut self, member: MemberClass, delta: i64) {
        match member {
            MemberClass::Hft => self.hft += delta,
            MemberClass::Mix => self.mix += delta,
            MemberClass::Non => self.non += delta,
        }
    }

    /// Sum over the three buckets.
    pub fn total(&self) -> i64 {
        self.hft + self.mix + self.non
    }
}

/// Aggregate state of all orders resting at one price.
#[derive(Debug)]
pub struct LimitLevel {
    /// Price of this level
    pub price: Price,
    /// Total remaining quantity over the queue
    pub size: i64,
    /// Disclosed quantity split by member class
    pub disclosed: MemberSizes,
    /// Hidden (iceberg reserve) quantity split by member class
    pub hidden: MemberSizes,

    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl LimitLevel {
    /// Create an empty level at `price`.
    pub fn new(price: Price) -> Self {
        Self {
            price,
            size: 0,
            disclosed: MemberSizes::default(),
            hidden: MemberSizes::default(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of orders in the queue.
    pub fn len(&self) -> usize {
        self.len
    }

    /// O(1) empty check.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Arena slot of the first order in time priority.
    pub(crate) fn head(&self) -> Option<usize> {
        self.head
    }

    /// Append the order at `slot` to the back of the FIFO and fold its
    /// quantities into the aggregates.
    pub(crate) fn push_back(&mut self, arena: &mut Slab<Order>, slot: usize) {
        {
            let order = &mut arena[slot];
            order.prev = self.tail;
            order.next = None;
        }
        if let Some(tail) = self.tail {
            arena[tail].next = Some(slot);
        } else {
            self.head = Some(slot);
        }
        self.tail = Some(slot);
        self.len += 1;

        let order = &arena[slot];
        let disclosed = order.disclosed() as i64;
        let hidden = order.hidden() as i64;
        self.size += order.qty_remaining as i64;
        self.disclosed.add(order.member, disclosed);
        self.hidden.add(order.member, hidden);
    }

    /// Unlink the order at `slot` from the FIFO and remove its quantities
    /// from the aggregates. The order may sit anywhere in the queue.
    pub(crate) fn unlink(&mut self, arena: &mut Slab<Order>, slot: usize) {
        let (prev, next) = {
            let order = &arena[slot];
            (order.prev, order.next)
        };

        match prev {
            Some(p) => arena[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => arena[n].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;

        let order = &mut arena[slot];
        order.prev = None;
        order.next = None;

        let disclosed = order.disclosed() as i64;
        let hidden = order.hidden() as i64;
        self.size -= order.qty_remaining as i64;
        self.disclosed.add(order.member, -disclosed);
        self.hidden.add(order.member, -hidden);
    }

    /// Apply the deltas produced by an in-place order mutation.
    pub(crate) fn apply(&mut self, member: MemberClass, deltas: QtyDeltas) {
        self.size += deltas.size;
        self.disclosed.add(member, deltas.disclosed);
        self.hidden.add(member, deltas.hidden);
    }

    /// Iterate the queue's order ids in FIFO order.
    pub fn iter<'a>(&self, arena: &'a Slab<Order>) -> LevelIter<'a> {
        LevelIter {
            arena,
            cursor: self.head,
        }
    }

    /// Copy out the aggregate view used by snapshots and depth queries.
    pub fn view(&self) -> LevelView {
        LevelView {
            price: self.price.as_f64(),
            size: self.size,
            orders: self.len,
            disclosed: self.disclosed,
            hidden: self.hidden,
        }
    }
}

/// Iterator over arena slots of a level's queue, front to back.
pub struct LevelIter<'a> {
    arena: &'a Slab<Order>,
    cursor: Option<usize>,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = &'a Order;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let order = &self.arena[slot];
        self.cursor = order.next;
        Some(order)
    }
}

/// Owned copy of a level's aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelView {
    /// Level price
    pub price: f64,
    /// Total remaining quantity
    pub size: i64,
    /// Number of queued orders
    pub orders: usize,
    /// Disclosed split by member class
    pub disclosed: MemberSizes,
    /// Hidden split by member class
    pub hidden: MemberSizes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::{OrderKind, Side};
    use chrono::NaiveDate;

    fn order(fid: u64, member: MemberClass, qty: u64, disclosed: u64) -> Order {
        let ts = NaiveDate::from_ymd_opt(2017, 1, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Order {
            fid,
            chain: 1,
            state: '0',
            entered_at: ts,
            valid_at: ts,
            side: Side::Bid,
            kind: OrderKind::Limit,
            execution: ' ',
            validity: 'J',
            expires_at: None,
            price: Price::from_f64(36.665),
            stop_price: Price::ZERO,
            qty_initial: qty,
            qty_remaining: qty,
            qty_negotiated: 0,
            qty_min: 0,
            qty_disclosed: disclosed,
            member,
            account: "1".to_string(),
            prev: None,
            next: None,
            triggered: false,
            queued_for_close: false,
        }
    }

    #[test]
    fn price_round_trip_is_exact() {
        for p in [32.46, 36.665, 38.075, 35.545, 0.005, 9999.9999] {
            assert_eq!(Price::from_f64(p).as_f64(), p);
        }
        assert!(Price::MARKET_BUY.is_sentinel());
        assert!(Price::MARKET_SELL.is_sentinel());
        assert!(!Price::from_f64(38.0).is_sentinel());
    }

    #[test]
    fn append_distributes_member_buckets() {
        let mut arena = Slab::new();
        let mut level = LimitLevel::new(Price::from_f64(36.665));

        let a = arena.insert(order(1, MemberClass::Mix, 30, 10));
        let b = arena.insert(order(2, MemberClass::Hft, 20, 20));
        level.push_back(&mut arena, a);
        level.push_back(&mut arena, b);

        assert_eq!(level.size, 50);
        assert_eq!(level.disclosed.mix, 10);
        assert_eq!(level.hidden.mix, 20);
        assert_eq!(level.disclosed.hft, 20);
        assert_eq!(level.hidden.hft, 0);
        assert_eq!(level.disclosed.non, 0);
        assert_eq!(level.hidden.non, 0);
        assert_eq!(
            level.size,
            level.disclosed.total() + level.hidden.total()
        );
    }

    #[test]
    fn unlink_is_the_inverse_of_push_back() {
        let mut arena = Slab::new();
        let mut level = LimitLevel::new(Price::from_f64(30.51));

        let a = arena.insert(order(1, MemberClass::Non, 200, 200));
        let b = arena.insert(order(2, MemberClass::Mix, 75, 25));
        let c = arena.insert(order(3, MemberClass::Hft, 40, 40));
        for slot in [a, b, c] {
            level.push_back(&mut arena, slot);
        }

        // remove from the middle
        level.unlink(&mut arena, b);
        assert_eq!(level.len(), 2);
        assert_eq!(level.size, 240);
        assert_eq!(level.disclosed.mix, 0);
        assert_eq!(level.hidden.mix, 0);

        let fids: Vec<u64> = level.iter(&arena).map(|o| o.fid).collect();
        assert_eq!(fids, vec![1, 3]);

        level.unlink(&mut arena, a);
        level.unlink(&mut arena, c);
        assert!(level.is_empty());
        assert_eq!(level.size, 0);
        assert_eq!(level.disclosed, MemberSizes::default());
        assert_eq!(level.hidden, MemberSizes::default());
    }

    #[test]
    fn fifo_order_is_arrival_order() {
        let mut arena = Slab::new();
        let mut level = LimitLevel::new(Price::from_f64(38.0));
        let slots: Vec<usize> = (0..5)
            .map(|i| arena.insert(order(i, MemberClass::Hft, 10, 10)))
            .collect();
        for &slot in &slots {
            level.push_back(&mut arena, slot);
        }
        let fids: Vec<u64> = level.iter(&arena).map(|o| o.fid).collect();
        assert_eq!(fids, vec![0, 1, 2, 3, 4]);
        assert_eq!(level.head(), Some(slots[0]));
    }
}
