//! Replay one instrument-day (or a whole month) against its tapes.
//!
//! ```text
//! tapebook_replay <data-root> <isin> <date>  [config.json] [snapshots.csv]
//! tapebook_replay <data-root> <isin> <YYYY-MM> [config.json]
//! ```
//!
//! The data root holds `auctions.csv` plus the `histories/`, `orders/`,
//! `removed_orders/` and `trades/` folders. Exits 0 only when every
//! requested day replayed fully and the engine's fills reconcile with the
//! exchange tape; otherwise a divergence report is written next to the
//! working directory and the exit code is 1.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tapebook::prelude::*;
use tapebook::replay::{opening_price_sequence, tapes};
use tracing_subscriber::EnvFilter;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("tapebook_replay: {err:#}");
            std::process::exit(2);
        }
    }
}

fn run() -> Result<bool> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [root, isin, period, rest @ ..] = args.as_slice() else {
        bail!("usage: tapebook_replay <data-root> <isin> <date|YYYY-MM> [config.json] [snapshots.csv]");
    };
    let root = PathBuf::from(root);

    let config = match rest.first() {
        Some(path) => load_config(Path::new(path))?,
        None => ReplayConfig::default(),
    };
    let snapshot_out = rest.get(1).map(PathBuf::from);

    init_tracing(&config);

    let schedule = tapes::read_auction_schedule(&root.join("auctions.csv"))
        .context("loading auction schedule")?;
    let driver = ReplayDriver::new(config);

    if let Ok(date) = NaiveDate::parse_from_str(period, "%Y-%m-%d") {
        replay_single_day(&driver, &root, isin, date, &schedule, snapshot_out.as_deref())
    } else {
        replay_month(&driver, &root, isin, period, &schedule)
    }
}

fn replay_single_day(
    driver: &ReplayDriver,
    root: &Path,
    isin: &str,
    date: NaiveDate,
    schedule: &AuctionSchedule,
    snapshot_out: Option<&Path>,
) -> Result<bool> {
    let times = schedule.times_for(isin, date)?;
    let files = DayFiles::resolve(root, isin, date);
    let report = driver
        .replay_day(isin, date, &files, times, snapshot_out)
        .with_context(|| format!("replaying {isin} {date}"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean() {
        write_divergence_report(&report)?;
    }
    Ok(report.is_clean())
}

fn replay_month(
    driver: &ReplayDriver,
    root: &Path,
    isin: &str,
    period: &str,
    schedule: &AuctionSchedule,
) -> Result<bool> {
    let days: Vec<NaiveDate> = schedule
        .days_for(isin)
        .into_iter()
        .filter(|date| date.format("%Y-%m").to_string() == period)
        .collect();
    if days.is_empty() {
        bail!("no scheduled days for {isin} in {period}");
    }

    let reports = driver.replay_many(root, isin, &days, schedule);
    let mut clean = true;
    for (date, price) in opening_price_sequence(&reports) {
        match price {
            Some(price) => println!("{date}  opening {price}"),
            None => println!("{date}  failed or no cross"),
        }
    }
    for entry in reports.iter() {
        match entry.value() {
            Ok(report) if report.is_clean() => {}
            Ok(report) => {
                write_divergence_report(report)?;
                clean = false;
            }
            Err(_) => clean = false,
        }
    }
    Ok(clean)
}

fn load_config(path: &Path) -> Result<ReplayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn init_tracing(config: &ReplayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn write_divergence_report(report: &DayReport) -> Result<()> {
    let path = format!(
        "divergence_{}_{}.json",
        report.isin,
        report.date.format("%Y%m%d")
    );
    std::fs::write(&path, serde_json::to_vec_pretty(report)?)
        .with_context(|| format!("writing divergence report {path}"))?;
    eprintln!(
        "{} {}: {} divergences, {} tape entries unconsumed -> {path}",
        report.isin,
        report.date,
        report.divergences.len(),
        report.tape_unconsumed
    );
    Ok(())
}
