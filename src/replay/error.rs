//! Replay-layer error types.

use crate::orderbook::BookError;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while resolving, loading or replaying one instrument-day.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// A required input tape is absent; the day is recorded and skipped.
    #[error("missing input file: {path}")]
    MissingInput {
        /// Path that failed to resolve
        path: PathBuf,
    },

    /// I/O failure on a tape or output file.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed row on a tape.
    #[error("malformed row in {path}: {source}")]
    Csv {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: csv::Error,
    },

    /// A field failed domain decoding.
    #[error("bad {field} value {value:?} in {path}")]
    BadField {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
        /// File involved
        path: PathBuf,
    },

    /// The auction schedule has no entry for the requested day.
    #[error("no auction schedule entry for {isin} on {date}")]
    MissingAuction {
        /// Instrument
        isin: String,
        /// Trading day
        date: NaiveDate,
    },

    /// The engine failed the day.
    #[error(transparent)]
    Book(#[from] BookError),

    /// Snapshot output failure.
    #[error("snapshot output failed: {0}")]
    Snapshot(#[from] csv::Error),
}
