//! Prelude module that re-exports the types most replays need.
//!
//! ```rust
//! use tapebook::prelude::*;
//! ```

// Engine types
pub use crate::orderbook::{
    Auction, BookError, DepthSnapshot, LevelView, MemberClass, MemberSizes, OrderBook, OrderId,
    OrderKind, OrderMessage, Price, Side, SnapshotWriter, TapeTrade, Trade,
};

// Replay types
pub use crate::replay::{
    AuctionSchedule, AuctionTimes, DayFiles, DayReport, Divergence, LogLevel, ReplayConfig,
    ReplayDriver, ReplayError,
};
