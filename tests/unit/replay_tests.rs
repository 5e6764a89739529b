//! End-to-end day replays over synthetic tapes.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::Path;
use tapebook::prelude::*;
use tapebook::replay::tapes::{AuctionRow, ExitRow, OrderRow, TradeRow};
use tempfile::TempDir;

const ISIN: &str = "FR0000120404";

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, day).unwrap()
}

fn at(day: u32, hour: u32, min: u32, sec: u32, micro: u32) -> NaiveDateTime {
    date(day).and_hms_micro_opt(hour, min, sec, micro).unwrap()
}

fn order_row(
    fid: u64,
    side: &str,
    price: f64,
    qty: u64,
    valid_at: NaiveDateTime,
    member: &str,
) -> OrderRow {
    OrderRow {
        o_id_fd: fid,
        o_cha_id: 1,
        o_state: "0".to_string(),
        o_dtm_be: valid_at,
        o_dtm_va: valid_at,
        o_bs: side.to_string(),
        o_type: "2".to_string(),
        o_execution: "E".to_string(),
        o_validity: "1".to_string(),
        o_dt_expiration: None,
        o_price: price,
        o_price_stop: 0.0,
        o_q_ini: qty,
        o_q_min: 0,
        o_q_dis: 0,
        o_member: member.to_string(),
        o_account: "070".to_string(),
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = csv::Writer::from_path(path).unwrap();
    for row in rows {
        writer.serialize(row).unwrap();
    }
    writer.flush().unwrap();
}

/// Lay out one synthetic day under `root`: a pre-open book, an opening
/// cross, one continuous trade, one cancellation.
fn write_day(root: &Path, day: u32, include_aggressor: bool) {
    let files = DayFiles::resolve(root, ISIN, date(day));

    write_csv(
        &files.history,
        &[
            order_row(101, "B", 32.46, 150, at(day, 7, 0, 1, 0), "MIX"),
            order_row(102, "S", 32.50, 100, at(day, 7, 0, 2, 0), "HFT"),
        ],
    );

    let mut orders = vec![order_row(103, "B", 32.50, 60, at(day, 8, 30, 0, 0), "NON")];
    if include_aggressor {
        orders.push(order_row(105, "B", 32.50, 25, at(day, 9, 30, 0, 0), "MIX"));
    }
    orders.push(order_row(106, "S", 33.00, 10, at(day, 10, 30, 0, 0), "NON"));
    write_csv(&files.orders, &orders);

    write_csv(
        &files.exits,
        &[
            ExitRow {
                o_dtm_br: at(day, 9, 0, 13, 551_000),
                o_id_fd: 103,
                o_bs: "B".to_string(),
                o_state: "2".to_string(),
            },
            ExitRow {
                o_dtm_br: at(day, 9, 30, 0, 0),
                o_id_fd: 105,
                o_bs: "B".to_string(),
                o_state: "2".to_string(),
            },
            ExitRow {
                o_dtm_br: at(day, 10, 0, 0, 0),
                o_id_fd: 101,
                o_bs: "B".to_string(),
                o_state: "4".to_string(),
            },
        ],
    );

    write_csv(
        &files.trades,
        &[
            TradeRow {
                t_dtm_neg: at(day, 9, 0, 13, 551_000),
                t_id_b_fd: 103,
                t_id_s_fd: 102,
                t_q_exchanged: 60,
                t_price: 32.50,
                t_agg: String::new(),
            },
            TradeRow {
                t_dtm_neg: at(day, 9, 30, 0, 0),
                t_id_b_fd: 105,
                t_id_s_fd: 102,
                t_q_exchanged: 25,
                t_price: 32.50,
                t_agg: "A".to_string(),
            },
        ],
    );
}

fn write_schedule(root: &Path, days: &[u32]) {
    let rows: Vec<AuctionRow> = days
        .iter()
        .map(|&day| AuctionRow {
            isin: ISIN.to_string(),
            date: date(day),
            auct_open_dt: at(day, 9, 0, 13, 551_000),
            auct_close_dt: at(day, 17, 35, 0, 0),
        })
        .collect();
    write_csv(&root.join("auctions.csv"), &rows);
}

fn auction_times(day: u32) -> AuctionTimes {
    AuctionTimes {
        open: at(day, 9, 0, 13, 551_000),
        close: at(day, 17, 35, 0, 0),
    }
}

#[test]
fn clean_day_reconciles_and_reports_the_auction_price() {
    let root = TempDir::new().unwrap();
    write_day(root.path(), 2, true);

    let driver = ReplayDriver::new(ReplayConfig::default());
    let files = DayFiles::resolve(root.path(), ISIN, date(2));
    let report = driver
        .replay_day(ISIN, date(2), &files, auction_times(2), None)
        .unwrap();

    assert_eq!(report.opening_auction_price, Some(32.50));
    assert_eq!(report.closing_auction_price, None);
    assert_eq!(report.messages, 5);
    assert_eq!(report.trades_emitted, 2);
    assert_eq!(report.tape_unconsumed, 0);
    assert!(report.divergences.is_empty());
    assert!(report.is_clean());
}

#[test]
fn snapshots_sample_the_whole_session_on_the_grid() {
    let root = TempDir::new().unwrap();
    write_day(root.path(), 2, true);
    let snapshot_path = root.path().join("snapshots.csv");

    let config = ReplayConfig {
        snapshot_interval_secs: Some(1800),
        snapshot_depth: 3,
        ..ReplayConfig::default()
    };
    let driver = ReplayDriver::new(config);
    let files = DayFiles::resolve(root.path(), ISIN, date(2));
    let report = driver
        .replay_day(ISIN, date(2), &files, auction_times(2), Some(&snapshot_path))
        .unwrap();

    // 09:00:13.551 + k * 30min through 17:35:00 -> k = 0..=17
    assert_eq!(report.snapshots, 18);

    let text = std::fs::read_to_string(&snapshot_path).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("ts,spread,best_bid,best_ask,bid_0_price"));
    assert_eq!(header.split(',').count(), 4 + 2 * 3 * 8);
    assert_eq!(lines.count(), 18);

    // the 10:00:13 sample swept the 10:00:00 cancellation of fid 101, so
    // 32.46 is already gone from its row
    let row_at_10 = text
        .lines()
        .find(|line| line.starts_with("2017-01-02 10:00:13"))
        .unwrap();
    assert!(!row_at_10.contains("32.46"));
}

#[test]
fn missing_aggressor_surfaces_as_divergences() {
    let root = TempDir::new().unwrap();
    write_day(root.path(), 2, false);

    let driver = ReplayDriver::new(ReplayConfig::default());
    let files = DayFiles::resolve(root.path(), ISIN, date(2));
    let report = driver
        .replay_day(ISIN, date(2), &files, auction_times(2), None)
        .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.tape_unconsumed, 1);

    let buy_leg: Vec<_> = report.divergences.iter().filter(|d| d.buy_leg).collect();
    assert_eq!(buy_leg.len(), 1);
    assert_eq!(buy_leg[0].fid, 105);
    assert_eq!(buy_leg[0].tape_qty, 25);
    assert_eq!(buy_leg[0].engine_qty, 0);

    let sell_leg: Vec<_> = report.divergences.iter().filter(|d| !d.buy_leg).collect();
    assert_eq!(sell_leg.len(), 1);
    assert_eq!(sell_leg[0].fid, 102);
    assert_eq!(sell_leg[0].tape_qty, 85);
    assert_eq!(sell_leg[0].engine_qty, 60);
}

#[test]
fn missing_input_file_fails_the_day() {
    let root = TempDir::new().unwrap();
    write_day(root.path(), 2, true);
    std::fs::remove_file(DayFiles::resolve(root.path(), ISIN, date(2)).trades).unwrap();

    let driver = ReplayDriver::new(ReplayConfig::default());
    let files = DayFiles::resolve(root.path(), ISIN, date(2));
    let err = driver
        .replay_day(ISIN, date(2), &files, auction_times(2), None)
        .unwrap_err();
    assert!(matches!(err, ReplayError::MissingInput { .. }));
}

#[test]
fn month_harness_replays_days_in_parallel() {
    let root = TempDir::new().unwrap();
    write_day(root.path(), 2, true);
    write_day(root.path(), 3, true);
    write_schedule(root.path(), &[2, 3]);

    let schedule =
        tapebook::replay::tapes::read_auction_schedule(&root.path().join("auctions.csv")).unwrap();
    let days = schedule.days_for(ISIN);
    assert_eq!(days, vec![date(2), date(3)]);

    let driver = ReplayDriver::new(ReplayConfig::default());
    let reports = driver.replay_many(root.path(), ISIN, &days, &schedule);

    let sequence = tapebook::replay::opening_price_sequence(&reports);
    assert_eq!(
        sequence,
        vec![(date(2), Some(32.50)), (date(3), Some(32.50))]
    );
    for entry in reports.iter() {
        assert!(entry.value().as_ref().unwrap().is_clean());
    }
}
