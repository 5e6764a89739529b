//! Depth snapshots: the sampled book state the research output is built
//! from.
//!
//! One [`DepthSnapshot`] is a wide row: spread, best prices, and for each of
//! the N best levels per side the price, total size and the six-way
//! disclosed/hidden × member-class breakdown. [`SnapshotWriter`] encodes
//! them as CSV with one column per field, levels flattened by index.

use super::book::OrderBook;
use super::level::LevelView;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::io::Write;
use tracing::error;

/// Sampled book state at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct DepthSnapshot {
    /// Sample instant
    pub ts: NaiveDateTime,
    /// Best ask minus best bid, when both sides exist
    pub spread: Option<f64>,
    /// Best bid price
    pub best_bid: Option<f64>,
    /// Best ask price
    pub best_ask: Option<f64>,
    /// Up to `depth` bid levels, best first
    pub bids: Vec<LevelView>,
    /// Up to `depth` ask levels, best first
    pub asks: Vec<LevelView>,
}

impl OrderBook {
    /// Read a depth snapshot of the current book state.
    ///
    /// A crossed book or an empty level is logged and surfaced as-is; this
    /// is a research tool and repairs would hide the data problem.
    pub fn depth_snapshot(&self, depth: usize) -> DepthSnapshot {
        let ladder = self.levels_detailed(Some(depth));

        let spread = self.spread();
        if let Some(s) = spread
            && s < 0.0
        {
            error!(isin = %self.isin, spread = s, at = ?self.clock, "negative spread");
        }
        for level in ladder.bids.iter().chain(ladder.asks.iter()) {
            if level.size <= 0 {
                error!(
                    isin = %self.isin,
                    price = level.price,
                    size = level.size,
                    "level with non-positive size"
                );
            }
        }

        DepthSnapshot {
            ts: self.clock.unwrap_or(self.opening_auction.scheduled_at),
            spread,
            best_bid: self.best_bid.map(|p| p.as_f64()),
            best_ask: self.best_ask.map(|p| p.as_f64()),
            bids: ladder.bids,
            asks: ladder.asks,
        }
    }
}

/// CSV encoder for depth snapshots with a fixed level count per row.
pub struct SnapshotWriter<W: Write> {
    writer: csv::Writer<W>,
    depth: usize,
    rows: usize,
}

impl<W: Write> SnapshotWriter<W> {
    /// Wrap `inner` and write the header row for `depth` levels per side.
    pub fn new(inner: W, depth: usize) -> Result<Self, csv::Error> {
        let mut writer = csv::Writer::from_writer(inner);

        let mut header: Vec<String> = vec![
            "ts".to_string(),
            "spread".to_string(),
            "best_bid".to_string(),
            "best_ask".to_string(),
        ];
        for side in ["bid", "ask"] {
            for n in 0..depth {
                header.push(format!("{side}_{n}_price"));
                header.push(format!("{side}_{n}_qty"));
                for bucket in ["disclosed", "hidden"] {
                    for member in ["hft", "mix", "non"] {
                        header.push(format!("{side}_{n}_{bucket}_{member}"));
                    }
                }
            }
        }
        writer.write_record(&header)?;

        Ok(Self {
            writer,
            depth,
            rows: 0,
        })
    }

    /// Append one snapshot row. Levels beyond the sampled depth are left
    /// empty.
    pub fn write(&mut self, snapshot: &DepthSnapshot) -> Result<(), csv::Error> {
        let mut record: Vec<String> = vec![
            snapshot.ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            opt_to_field(snapshot.spread),
            opt_to_field(snapshot.best_bid),
            opt_to_field(snapshot.best_ask),
        ];
        for side in [&snapshot.bids, &snapshot.asks] {
            for n in 0..self.depth {
                match side.get(n) {
                    Some(level) => push_level(&mut record, level),
                    None => record.extend(std::iter::repeat_n(String::new(), 8)),
                }
            }
        }
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn opt_to_field(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn push_level(record: &mut Vec<String>, level: &LevelView) {
    record.push(level.price.to_string());
    record.push(level.size.to_string());
    record.push(level.disclosed.hft.to_string());
    record.push(level.disclosed.mix.to_string());
    record.push(level.disclosed.non.to_string());
    record.push(level.hidden.hft.to_string());
    record.push(level.hidden.mix.to_string());
    record.push(level.hidden.non.to_string());
}
