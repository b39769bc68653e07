use std::fmt;

/// The scheme prefix of the authorization header value.
const SCHEME: &str = "bearer ";

/// An opaque bearer credential.
///
/// Holds the complete `Authorization` header value, including the scheme prefix. The contents are
/// never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Creates a token from the raw `access_token` returned by the issuer.
    pub fn from_access_token(access_token: &str) -> Self {
        Self(format!("{SCHEME}{access_token}"))
    }

    /// The value for the `Authorization` header.
    pub fn header_value(&self) -> &str {
        &self.0
    }

    /// The raw access token without the scheme prefix.
    pub fn access_token(&self) -> &str {
        &self.0[SCHEME.len()..]
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(\"bearer [redacted]\")")
    }
}
