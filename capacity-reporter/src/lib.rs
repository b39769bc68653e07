//! Periodic delivery of counter values to the metrics backend.
//!
//! A [`MetricReporter`] ticks at a fixed interval. On every tick it drains all of its
//! [`DrainsToPoints`] sources, stamps the resulting [`MetricPoint`]s with the current time and its
//! identifying tags, and hands them to a [`SeriesSink`]. Deliveries are never retried: since the
//! sources were already drained, a failed delivery loses that interval's values and the next tick
//! starts from zero.

#![warn(missing_docs)]

mod point;
mod reporter;
mod series;

pub use self::point::*;
pub use self::reporter::*;
pub use self::series::*;
