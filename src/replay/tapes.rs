//! CSV tape readers.
//!
//! One reader per input kind: history/orders (same schema), exits, trades,
//! and the external auction schedule. Field names follow the exchange
//! column naming of the processed tapes; columns the engine does not use
//! are simply ignored. Rows decode into the engine's domain types, with
//! decoding failures reported per field.

use super::error::ReplayError;
use crate::orderbook::trade::Aggressor;
use crate::orderbook::{ExitRecord, OrderMessage, Price, Side, TapeTrade};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One row of a history or orders tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRow {
    /// Fundamental order id
    pub o_id_fd: u64,
    /// Characteristic (chain) id
    pub o_cha_id: u32,
    /// State code
    pub o_state: String,
    /// Book-entry datetime
    #[serde(with = "crate::utils::serde_dtm")]
    pub o_dtm_be: NaiveDateTime,
    /// Validity datetime
    #[serde(with = "crate::utils::serde_dtm")]
    pub o_dtm_va: NaiveDateTime,
    /// Side code, `B` or `S`
    pub o_bs: String,
    /// Kind code
    pub o_type: String,
    /// Execution-condition code
    pub o_execution: String,
    /// Validity code
    pub o_validity: String,
    /// Expiration datetime, possibly empty
    #[serde(with = "crate::utils::serde_dtm_opt")]
    pub o_dt_expiration: Option<NaiveDateTime>,
    /// Limit price
    pub o_price: f64,
    /// Stop trigger price
    pub o_price_stop: f64,
    /// Initial quantity
    pub o_q_ini: u64,
    /// Minimum execution quantity
    pub o_q_min: u64,
    /// Disclosed quantity cap
    pub o_q_dis: u64,
    /// Member latency class
    pub o_member: String,
    /// Account code
    pub o_account: String,
}

impl OrderRow {
    fn into_message(self, path: &Path) -> Result<OrderMessage, ReplayError> {
        let side = decode_char("o_bs", &self.o_bs, path)?;
        let kind = decode_char("o_type", &self.o_type, path)?;
        Ok(OrderMessage {
            fid: self.o_id_fd,
            chain: self.o_cha_id,
            state: decode_char_lenient(&self.o_state),
            entered_at: self.o_dtm_be,
            valid_at: self.o_dtm_va,
            side: Side::try_from(side).map_err(|_| bad_field("o_bs", &self.o_bs, path))?,
            kind: kind
                .try_into()
                .map_err(|_| bad_field("o_type", &self.o_type, path))?,
            execution: decode_char_lenient(&self.o_execution),
            validity: decode_char("o_validity", &self.o_validity, path)?,
            expires_at: self.o_dt_expiration,
            price: Price::from_f64(self.o_price),
            stop_price: Price::from_f64(self.o_price_stop),
            qty_initial: self.o_q_ini,
            qty_min: self.o_q_min,
            qty_disclosed: self.o_q_dis,
            member: self
                .o_member
                .parse()
                .map_err(|_| bad_field("o_member", &self.o_member, path))?,
            account: self.o_account,
        })
    }
}

/// One row of an exits tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRow {
    /// Book-release datetime
    #[serde(with = "crate::utils::serde_dtm")]
    pub o_dtm_br: NaiveDateTime,
    /// Fundamental order id
    pub o_id_fd: u64,
    /// Side code
    pub o_bs: String,
    /// Final state code
    pub o_state: String,
}

/// One row of a trades tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    /// Negotiation datetime
    #[serde(with = "crate::utils::serde_dtm")]
    pub t_dtm_neg: NaiveDateTime,
    /// Buy-side fundamental id
    pub t_id_b_fd: u64,
    /// Sell-side fundamental id
    pub t_id_s_fd: u64,
    /// Quantity exchanged
    pub t_q_exchanged: u64,
    /// Trade price
    pub t_price: f64,
    /// Aggressor flag; blank on auction prints
    #[serde(default)]
    pub t_agg: String,
}

/// One row of the auction schedule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRow {
    /// Instrument ISIN
    pub isin: String,
    /// Trading day
    pub date: NaiveDate,
    /// Opening auction instant
    #[serde(with = "crate::utils::serde_dtm")]
    pub auct_open_dt: NaiveDateTime,
    /// Closing auction instant
    #[serde(with = "crate::utils::serde_dtm")]
    pub auct_close_dt: NaiveDateTime,
}

/// The two auction instants of one instrument-day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuctionTimes {
    /// Opening auction instant
    pub open: NaiveDateTime,
    /// Closing auction instant
    pub close: NaiveDateTime,
}

/// Auction instants per (isin, date), loaded from the schedule file.
#[derive(Debug, Clone, Default)]
pub struct AuctionSchedule {
    entries: HashMap<(String, NaiveDate), AuctionTimes>,
}

impl AuctionSchedule {
    /// The auction instants for one instrument-day.
    ///
    /// # Errors
    /// [`ReplayError::MissingAuction`] when the schedule has no entry.
    pub fn times_for(&self, isin: &str, date: NaiveDate) -> Result<AuctionTimes, ReplayError> {
        self.entries
            .get(&(isin.to_string(), date))
            .copied()
            .ok_or_else(|| ReplayError::MissingAuction {
                isin: isin.to_string(),
                date,
            })
    }

    /// All scheduled days for one instrument, sorted.
    pub fn days_for(&self, isin: &str) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .entries
            .keys()
            .filter(|(entry_isin, _)| entry_isin == isin)
            .map(|&(_, date)| date)
            .collect();
        days.sort();
        days
    }

    /// Insert one entry; used by the readers and by tests building
    /// schedules in memory.
    pub fn insert(&mut self, isin: &str, date: NaiveDate, times: AuctionTimes) {
        self.entries.insert((isin.to_string(), date), times);
    }
}

/// Read a history or orders tape in file order.
pub fn read_order_tape(path: &Path) -> Result<Vec<OrderMessage>, ReplayError> {
    let mut reader = open(path)?;
    let mut messages = Vec::new();
    for row in reader.deserialize::<OrderRow>() {
        let row = row.map_err(|source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        messages.push(row.into_message(path)?);
    }
    Ok(messages)
}

/// Read an exits tape in file order.
pub fn read_exit_tape(path: &Path) -> Result<Vec<ExitRecord>, ReplayError> {
    let mut reader = open(path)?;
    let mut exits = Vec::new();
    for row in reader.deserialize::<ExitRow>() {
        let row = row.map_err(|source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let side = decode_char("o_bs", &row.o_bs, path)?;
        exits.push(ExitRecord {
            released_at: row.o_dtm_br,
            fid: row.o_id_fd,
            side: Side::try_from(side).map_err(|_| bad_field("o_bs", &row.o_bs, path))?,
            state: decode_char_lenient(&row.o_state),
        });
    }
    Ok(exits)
}

/// Read a trades tape in file order.
pub fn read_trade_tape(path: &Path) -> Result<Vec<TapeTrade>, ReplayError> {
    let mut reader = open(path)?;
    let mut trades = Vec::new();
    for row in reader.deserialize::<TradeRow>() {
        let row = row.map_err(|source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        trades.push(TapeTrade {
            time: row.t_dtm_neg,
            bid_fid: row.t_id_b_fd,
            ask_fid: row.t_id_s_fd,
            qty: row.t_q_exchanged,
            price: Price::from_f64(row.t_price),
            aggressor: Aggressor::from_code(&row.t_agg)
                .map_err(|_| bad_field("t_agg", &row.t_agg, path))?,
        });
    }
    Ok(trades)
}

/// Read the auction schedule file.
pub fn read_auction_schedule(path: &Path) -> Result<AuctionSchedule, ReplayError> {
    let mut reader = open(path)?;
    let mut schedule = AuctionSchedule::default();
    for row in reader.deserialize::<AuctionRow>() {
        let row = row.map_err(|source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        schedule.insert(
            &row.isin,
            row.date,
            AuctionTimes {
                open: row.auct_open_dt,
                close: row.auct_close_dt,
            },
        );
    }
    Ok(schedule)
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, ReplayError> {
    if !path.exists() {
        return Err(ReplayError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    csv::ReaderBuilder::new()
        .flexible(false)
        .from_path(path)
        .map_err(|source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn decode_char(field: &'static str, value: &str, path: &Path) -> Result<char, ReplayError> {
    let mut chars = value.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(first), None) => Ok(first),
        _ => Err(bad_field(field, value, path)),
    }
}

/// Codes the engine carries without interpreting may legitimately be blank.
fn decode_char_lenient(value: &str) -> char {
    value.trim().chars().next().unwrap_or(' ')
}

fn bad_field(field: &'static str, value: &str, path: &Path) -> ReplayError {
    ReplayError::BadField {
        field,
        value: value.to_string(),
        path: PathBuf::from(path),
    }
}
