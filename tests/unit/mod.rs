//! Integration tests: synthetic instrument-days written as real CSV tapes
//! and replayed end-to-end through the driver.

mod replay_tests;
mod schedule_tests;
