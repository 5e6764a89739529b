#![cfg(test)]
//! Engine tests driving the book through its message surface.

mod test_helpers;

mod auction_flow_tests;
