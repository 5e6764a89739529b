//! Auction schedule loading and lookup.

use chrono::NaiveDate;
use tapebook::prelude::*;
use tapebook::replay::tapes::{AuctionRow, read_auction_schedule};
use tempfile::TempDir;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, day).unwrap()
}

#[test]
fn schedule_resolves_per_instrument_day() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("auctions.csv");

    let rows = vec![
        AuctionRow {
            isin: "FR0000120404".to_string(),
            date: date(2),
            auct_open_dt: date(2).and_hms_micro_opt(9, 0, 13, 551_000).unwrap(),
            auct_close_dt: date(2).and_hms_opt(17, 35, 0).unwrap(),
        },
        AuctionRow {
            isin: "FR0000120404".to_string(),
            date: date(3),
            auct_open_dt: date(3).and_hms_micro_opt(9, 0, 2, 12_000).unwrap(),
            auct_close_dt: date(3).and_hms_opt(17, 35, 0).unwrap(),
        },
        AuctionRow {
            isin: "FR0000131104".to_string(),
            date: date(2),
            auct_open_dt: date(2).and_hms_opt(9, 0, 5).unwrap(),
            auct_close_dt: date(2).and_hms_opt(17, 35, 0).unwrap(),
        },
    ];
    let mut writer = csv::Writer::from_path(&path).unwrap();
    for row in &rows {
        writer.serialize(row).unwrap();
    }
    writer.flush().unwrap();

    let schedule = read_auction_schedule(&path).unwrap();

    let times = schedule.times_for("FR0000120404", date(2)).unwrap();
    assert_eq!(
        times.open,
        date(2).and_hms_micro_opt(9, 0, 13, 551_000).unwrap()
    );
    assert_eq!(schedule.days_for("FR0000120404"), vec![date(2), date(3)]);
    assert_eq!(schedule.days_for("FR0000131104"), vec![date(2)]);

    let missing = schedule.times_for("FR0000120404", date(4)).unwrap_err();
    assert!(matches!(missing, ReplayError::MissingAuction { .. }));
}
