//! Counts the logs, metrics and events flowing through a logging platform and reports the totals
//! to a metrics backend.
//!
//! Each command runs one producer next to a reporter:
//!
//!  - `firehose-counter` reads the log stream gateway and counts logs and counter events of one
//!    origin.
//!  - `event-counter` reads the log stream gateway and counts events with a given title.
//!  - `syslog-counter` accepts syslog drain connections and counts their records.
//!  - `log-emitter` writes synthetic log lines and, on the first instance, counts them again as
//!    they arrive on the log stream.
//!  - `metric-emitter` writes counter envelopes to the ingress endpoint and counts them.
//!  - `event-emitter` writes events to the ingress endpoint and counts the accepted ones.
//!
//! Run `capacity --help` for the full list of options.

mod cli;
mod cliapp;
mod commands;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            capacity_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
