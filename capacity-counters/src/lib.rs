//! Named counters shared between the stream consumers and the reporter.
//!
//! A [`CounterBank`] holds a fixed set of counters chosen at construction. Producers call
//! [`CounterBank::increment`] from any number of tasks, and the reporter periodically calls
//! [`CounterBank::drain_all`] to read and reset every counter.
//!
//! ```
//! use capacity_counters::CounterBank;
//!
//! let bank = CounterBank::new(["logs", "metrics"]);
//! bank.increment("logs");
//! bank.increment("logs");
//! bank.increment("unknown");
//!
//! let drained = bank.drain_all();
//! assert_eq!(drained["logs"], 2);
//! assert_eq!(drained["metrics"], 0);
//! assert_eq!(bank.drain_all()["logs"], 0);
//! ```

#![warn(missing_docs)]

mod bank;

pub use self::bank::*;
