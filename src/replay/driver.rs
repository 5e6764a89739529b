//! Per-day replay driver and the parallel multi-day harness.
//!
//! A day replay loads the four tapes for one (instrument, day), feeds the
//! book message by message with snapshot emission interleaved on a fixed
//! grid, and closes with the end-of-day reconciliation: for every
//! fundamental id on the exchange tape, the quantity the engine filled must
//! equal the quantity the tape says traded. Any difference is a divergence;
//! a day with divergences or unconsumed tape entries is not clean.

use super::config::ReplayConfig;
use super::error::ReplayError;
use super::tapes::{self, AuctionSchedule, AuctionTimes};
use crate::orderbook::{OrderBook, OrderId, SnapshotWriter, TapeTrade, Trade};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Resolved input paths for one instrument-day.
#[derive(Debug, Clone)]
pub struct DayFiles {
    /// Orders alive at session start
    pub history: PathBuf,
    /// Order life-cycle messages of the session
    pub orders: PathBuf,
    /// Scheduled order exits
    pub exits: PathBuf,
    /// Executed trades
    pub trades: PathBuf,
}

impl DayFiles {
    /// Resolve the on-disk layout: one folder per tape kind, one subfolder
    /// per instrument, one file per day.
    pub fn resolve(root: &Path, isin: &str, date: NaiveDate) -> Self {
        let day = date.format("%Y%m%d");
        Self {
            history: root
                .join("histories")
                .join(isin)
                .join(format!("VHOXhistory_{isin}_{day}.csv")),
            orders: root
                .join("orders")
                .join(isin)
                .join(format!("VHOX_{isin}_{day}.csv")),
            exits: root
                .join("removed_orders")
                .join(isin)
                .join(format!("removedOrders_{isin}_{day}.csv")),
            trades: root
                .join("trades")
                .join(isin)
                .join(format!("VHD_{isin}_{day}.csv")),
        }
    }
}

/// One per-fid difference between engine fills and the exchange tape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Order the sums disagree on
    pub fid: OrderId,
    /// `true` for the buy leg, `false` for the sell leg
    pub buy_leg: bool,
    /// Total quantity on the exchange tape
    pub tape_qty: u64,
    /// Total quantity the engine filled
    pub engine_qty: u64,
}

/// Outcome of one replayed instrument-day.
#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    /// Instrument
    pub isin: String,
    /// Trading day
    pub date: NaiveDate,
    /// Opening uncross price, when the book crossed
    pub opening_auction_price: Option<f64>,
    /// Closing uncross price, when the book crossed
    pub closing_auction_price: Option<f64>,
    /// Messages fed to the book
    pub messages: usize,
    /// Trades the engine applied or synthesized
    pub trades_emitted: usize,
    /// Tape entries never consumed
    pub tape_unconsumed: usize,
    /// Snapshot rows written
    pub snapshots: usize,
    /// Per-fid reconciliation differences
    pub divergences: Vec<Divergence>,
}

impl DayReport {
    /// The day replayed fully and the engine's fills match the tape.
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty() && self.tape_unconsumed == 0
    }
}

/// Replays instrument-days against their tapes.
#[derive(Debug, Clone, Default)]
pub struct ReplayDriver {
    config: ReplayConfig,
}

impl ReplayDriver {
    /// Driver with the given configuration.
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Replay one instrument-day.
    ///
    /// Snapshots are written to `snapshot_out` on the configured interval,
    /// anchored at the opening auction instant and sampled through the
    /// close; each sample sweeps scheduled exits up to its own instant
    /// first, so an order canceled a microsecond before the sample never
    /// shows up in it.
    ///
    /// # Errors
    /// Missing or malformed tapes, an unresolvable auction price, or an
    /// engine failure all fail the day.
    pub fn replay_day(
        &self,
        isin: &str,
        date: NaiveDate,
        files: &DayFiles,
        auctions: AuctionTimes,
        snapshot_out: Option<&Path>,
    ) -> Result<DayReport, ReplayError> {
        let history = tapes::read_order_tape(&files.history)?;
        let orders = tapes::read_order_tape(&files.orders)?;
        let exits = tapes::read_exit_tape(&files.exits)?;
        let tape = tapes::read_trade_tape(&files.trades)?;

        info!(
            isin,
            %date,
            history = history.len(),
            orders = orders.len(),
            exits = exits.len(),
            trades = tape.len(),
            "replaying day"
        );

        let mut book = OrderBook::new(isin, date, auctions.open, auctions.close);
        book.set_exits(exits);
        book.set_tape(tape.clone());

        let mut writer = match snapshot_out {
            Some(path) if self.config.snapshot_interval_secs.is_some() => {
                let file = File::create(path).map_err(|source| ReplayError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Some(SnapshotWriter::new(file, self.config.snapshot_depth)?)
            }
            _ => None,
        };
        let interval = self
            .config
            .snapshot_interval_secs
            .map(|secs| Duration::seconds(secs as i64));
        let mut next_sample = interval.map(|_| auctions.open);

        let mut messages = 0usize;
        for msg in history.iter().chain(orders.iter()) {
            if let (Some(writer), Some(every)) = (writer.as_mut(), interval) {
                let due = next_sample.expect("sampling grid set with interval");
                next_sample = Some(sample_until(
                    &mut book,
                    writer,
                    due,
                    every,
                    msg.valid_at,
                    auctions.close,
                    self.config.snapshot_depth,
                )?);
            }
            book.process(msg)?;
            messages += 1;
        }

        if let Some(limit) = self.config.cancel_sweep_limit {
            book.sweep_exits(Some(limit));
        }
        if let (Some(writer), Some(every)) = (writer.as_mut(), interval) {
            let due = next_sample.expect("sampling grid set with interval");
            sample_until(
                &mut book,
                writer,
                due,
                every,
                NaiveDateTime::MAX,
                auctions.close,
                self.config.snapshot_depth,
            )?;
        }

        let snapshots = writer.as_mut().map_or(Ok::<usize, ReplayError>(0), |writer| {
            writer.flush().map_err(|source| ReplayError::Io {
                path: snapshot_out.expect("writer implies path").to_path_buf(),
                source,
            })?;
            Ok(writer.rows())
        })?;

        let divergences = reconcile_fills(book.emitted_trades(), &tape);
        let report = DayReport {
            isin: isin.to_string(),
            date,
            opening_auction_price: book.opening_auction().price.map(|p| p.as_f64()),
            closing_auction_price: book.closing_auction().price.map(|p| p.as_f64()),
            messages,
            trades_emitted: book.emitted_trades().len(),
            tape_unconsumed: book.tape_remaining(),
            snapshots,
            divergences,
        };
        info!(
            isin,
            %date,
            opening = ?report.opening_auction_price,
            clean = report.is_clean(),
            "day replayed"
        );
        Ok(report)
    }

    /// Replay many days of one instrument in parallel, one independent book
    /// per day. Failed days are recorded, not fatal.
    pub fn replay_many(
        &self,
        root: &Path,
        isin: &str,
        days: &[NaiveDate],
        schedule: &AuctionSchedule,
    ) -> DashMap<NaiveDate, Result<DayReport, ReplayError>> {
        let results = DashMap::new();
        days.par_iter().for_each(|&date| {
            let outcome = schedule.times_for(isin, date).and_then(|times| {
                let files = DayFiles::resolve(root, isin, date);
                self.replay_day(isin, date, &files, times, None)
            });
            if let Err(err) = &outcome {
                warn!(isin, %date, %err, "day failed");
            }
            results.insert(date, outcome);
        });
        results
    }
}

/// Emit snapshots for every grid instant in `[due, until)` capped at
/// `session_end`, sweeping exits up to each instant first. Returns the next
/// due instant.
fn sample_until<W: std::io::Write>(
    book: &mut OrderBook,
    writer: &mut SnapshotWriter<W>,
    mut due: NaiveDateTime,
    every: Duration,
    until: NaiveDateTime,
    session_end: NaiveDateTime,
    depth: usize,
) -> Result<NaiveDateTime, ReplayError> {
    while due < until && due <= session_end {
        book.sweep_exits(Some(due));
        let mut snapshot = book.depth_snapshot(depth);
        snapshot.ts = due;
        writer.write(&snapshot)?;
        due = due + every;
    }
    Ok(due)
}

/// Per-fid fill sums, engine versus tape, both legs.
pub fn reconcile_fills(emitted: &[Trade], tape: &[TapeTrade]) -> Vec<Divergence> {
    let mut tape_buy: HashMap<OrderId, u64> = HashMap::new();
    let mut tape_sell: HashMap<OrderId, u64> = HashMap::new();
    for trade in tape {
        *tape_buy.entry(trade.bid_fid).or_insert(0) += trade.qty;
        *tape_sell.entry(trade.ask_fid).or_insert(0) += trade.qty;
    }

    let mut engine_buy: HashMap<OrderId, u64> = HashMap::new();
    let mut engine_sell: HashMap<OrderId, u64> = HashMap::new();
    for trade in emitted {
        *engine_buy.entry(trade.bid_fid).or_insert(0) += trade.qty;
        *engine_sell.entry(trade.ask_fid).or_insert(0) += trade.qty;
    }

    let mut divergences = Vec::new();
    for (legs, engine, buy_leg) in [
        (&tape_buy, &engine_buy, true),
        (&tape_sell, &engine_sell, false),
    ] {
        for (&fid, &tape_qty) in legs {
            let engine_qty = engine.get(&fid).copied().unwrap_or(0);
            if engine_qty != tape_qty {
                divergences.push(Divergence {
                    fid,
                    buy_leg,
                    tape_qty,
                    engine_qty,
                });
            }
        }
    }
    divergences.sort_by_key(|d| (d.fid, !d.buy_leg));
    divergences
}

/// Opening-auction price per day, sorted by date, for checking a replayed
/// period against the exchange-reported sequence.
pub fn opening_price_sequence(
    reports: &DashMap<NaiveDate, Result<DayReport, ReplayError>>,
) -> Vec<(NaiveDate, Option<f64>)> {
    let mut sequence: Vec<(NaiveDate, Option<f64>)> = reports
        .iter()
        .map(|entry| {
            let price = entry
                .value()
                .as_ref()
                .ok()
                .and_then(|report| report.opening_auction_price);
            (*entry.key(), price)
        })
        .collect();
    sequence.sort_by_key(|&(date, _)| date);
    sequence
}
