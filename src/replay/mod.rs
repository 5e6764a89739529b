//! Replay layer: tape loading, per-day driving, snapshot scheduling and the
//! end-of-day reconciliation report.

mod config;
mod driver;
mod error;

pub mod tapes;

pub use config::{LogLevel, ReplayConfig};
pub use driver::{
    DayFiles, DayReport, Divergence, ReplayDriver, opening_price_sequence, reconcile_fills,
};
pub use error::ReplayError;
pub use tapes::{AuctionSchedule, AuctionTimes};
