//! Helpers for testing the stream consumers and the reporter.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This sets up the logger so that all console output is
//!    captured by the test runner.
//!  - Tests that talk to the network use [`MockUpstream`], which serves the token issuer, the log
//!    stream gateway and the metrics backend from one in-process server.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() {
//! capacity_test::setup();
//!
//! let upstream = capacity_test::MockUpstream::start().await;
//! upstream.push_stream(capacity_test::StreamResponse::open(vec![
//!     capacity_test::SseFrame::batch(vec![capacity_test::envelopes::log("hello")]),
//! ]));
//! # }
//! ```

mod upstream;

pub mod envelopes;

pub use self::upstream::*;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this crate and mutes all other logs.
pub fn setup() {
    capacity_log::init_test!();
}
