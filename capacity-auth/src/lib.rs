//! Bearer tokens from an OAuth2 client-credentials issuer.
//!
//! A [`TokenSource`] produces a fresh [`Token`] on every call. There is no caching and no expiry
//! tracking: callers fetch a new token whenever they (re)connect.

#![warn(missing_docs)]

mod source;
mod token;

pub use self::source::*;
pub use self::token::*;
