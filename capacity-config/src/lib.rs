//! Configuration for the capacity planning utilities.
//!
//! Settings are read from `config.yml` in a configuration folder and can be overridden from the
//! command line or the environment through [`OverridableConfig`].

#![warn(missing_docs)]

mod config;

pub use self::config::*;
