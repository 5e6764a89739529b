//! # tapebook
//!
//! Deterministic limit order book reconstruction from historical exchange
//! message tapes.
//!
//! Given, for one instrument and one trading day, the four tapes the
//! exchange publishes — orders alive at session start, the session's order
//! life-cycle messages, the scheduled order exits, and the executed trades —
//! the engine replays the messages and exposes, at any instant, the book's
//! price levels, best prices, spread and per-level visible/hidden size
//! breakdown by member latency class. It is the reference implementation
//! used to validate microstructure research against the exchange's own
//! records.
//!
//! ## How it works
//!
//! - **Price-time priority book**: two ordered price maps of
//!   [`LimitLevel`]s, each level owning an intrusive FIFO over an arena of
//!   [`Order`](orderbook::Order) records, with iceberg (disclosed/hidden)
//!   accounting split by member class.
//! - **Call auctions**: the opening and closing crossings run the exchange
//!   uncrossing rules (maximize volume, minimize imbalance, side with the
//!   residual) and synthesize the crossing trades; a tie the rules cannot
//!   break fails the day loudly.
//! - **Tape reconciliation**: during continuous trading the engine does not
//!   match orders itself. The exchange trade tape is ground truth: entries
//!   are consumed when the order just processed can be their aggressor, and
//!   any bookkeeping drift surfaces as an end-of-day divergence report.
//! - **Contingent orders**: stop orders park in trigger buckets (market
//!   stops fire before limit stops) and promote when the last trade price
//!   touches their trigger; pegged orders track the same-side touch within
//!   their band.
//! - **Deterministic replay**: one book per (instrument, day), single
//!   owner, no shared mutable state. Replaying a month is embarrassingly
//!   parallel; the [`replay`] module drives it across a thread pool.
//!
//! ## Quick start
//!
//! ```no_run
//! use tapebook::prelude::*;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2017, 1, 2).unwrap();
//! let schedule =
//!     tapebook::replay::tapes::read_auction_schedule("data/auctions.csv".as_ref()).unwrap();
//! let times = schedule.times_for("FR0000120404", date).unwrap();
//!
//! let driver = ReplayDriver::new(ReplayConfig::default());
//! let files = DayFiles::resolve("data".as_ref(), "FR0000120404", date);
//! let report = driver
//!     .replay_day("FR0000120404", date, &files, times, None)
//!     .unwrap();
//! assert!(report.is_clean());
//! ```

pub mod orderbook;
pub mod prelude;
pub mod replay;

mod utils;

pub use orderbook::{
    Aggressor, Auction, BookError, DepthSnapshot, DetailedLadder, ExitRecord, Ladder, LevelView,
    LimitLevel, MemberClass, MemberSizes, OrderBook, OrderId, OrderKind, OrderMessage, Price,
    Side, SnapshotWriter, TapeTrade, Trade, TradeSource,
};
pub use replay::{
    AuctionSchedule, AuctionTimes, DayFiles, DayReport, Divergence, LogLevel, ReplayConfig,
    ReplayDriver, ReplayError,
};
