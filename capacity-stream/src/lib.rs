//! Consumers that tally events from long-lived sources into a [`CounterBank`].
//!
//! The central piece is the [`StreamConsumer`], which repeatedly authenticates with a
//! [`TokenSource`], opens a connection through a [`StreamConnector`] and feeds every envelope
//! through an [`EventClassifier`] into a shared [`CounterBank`]. It never stops on its own; after
//! any failure it backs off according to a [`Backoff`] policy and starts over with a fresh token.
//!
//! Further producers feed counter banks without a token:
//!
//!  - [`SyslogListener`] counts RFC 5424 records received over TCP.
//!  - [`LogWriter`] writes synthetic log lines at a fixed rate and counts them.
//!  - [`MetricEmitter`] and [`EventEmitter`] write envelopes through an [`IngressClient`] and
//!    count the accepted ones.
//!
//! [`CounterBank`]: capacity_counters::CounterBank
//! [`TokenSource`]: capacity_auth::TokenSource

#![warn(missing_docs)]

mod classifier;
mod consumer;
mod emitter;
mod envelope;
mod gateway;
mod ingress;
mod retry;
mod syslog;
mod writer;

pub use self::classifier::*;
pub use self::consumer::*;
pub use self::emitter::*;
pub use self::envelope::*;
pub use self::gateway::*;
pub use self::ingress::*;
pub use self::retry::*;
pub use self::syslog::*;
pub use self::writer::*;
