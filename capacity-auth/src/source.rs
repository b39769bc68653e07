use std::future::Future;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;

use crate::Token;

/// The token response could not be interpreted.
#[derive(Debug, thiserror::Error)]
pub enum MalformedResponse {
    /// The body is not valid JSON.
    #[error("response body is not valid json")]
    InvalidJson(#[source] serde_json::Error),
    /// The body has no `access_token` field.
    #[error("response has no access_token field")]
    MissingAccessToken,
    /// The `access_token` field is not a string.
    #[error("access_token is not a string")]
    AccessTokenNotString,
}

/// Failure to obtain a token.
///
/// Callers treat all variants alike and retry later.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The issuer could not be reached, or the response could not be read.
    #[error("could not reach token issuer")]
    Transport(#[from] reqwest::Error),
    /// The issuer responded with a status other than `200 OK`.
    #[error("token issuer responded with status {0}")]
    UnexpectedStatus(StatusCode),
    /// The response body does not carry a token.
    #[error("malformed token response")]
    MalformedResponse(#[from] MalformedResponse),
}

/// Produces bearer tokens on demand.
///
/// Every call performs one fresh request. Implementations do not retry or cache.
pub trait TokenSource: Send + Sync {
    /// Fetches a new token.
    fn token(&self) -> impl Future<Output = Result<Token, AuthError>> + Send;
}

impl<T: TokenSource> TokenSource for Arc<T> {
    fn token(&self) -> impl Future<Output = Result<Token, AuthError>> + Send {
        self.as_ref().token()
    }
}

/// Fetches tokens from a UAA issuer with the `client_credentials` grant.
#[derive(Clone)]
pub struct UaaTokenSource {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
}

impl UaaTokenSource {
    /// Creates a token source for the issuer at `issuer`.
    ///
    /// The client carries the request timeout and TLS settings.
    pub fn new(
        client: reqwest::Client,
        issuer: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/oauth/token", issuer.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The URL tokens are requested from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self) -> Result<Token, AuthError> {
        let form = [
            ("response_type", "token"),
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.client.post(&self.endpoint).form(&form).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::UnexpectedStatus(status));
        }

        let body = response.bytes().await?;
        let token = parse_access_token(&body)?;
        capacity_log::debug!("obtained token from issuer");
        Ok(token)
    }
}

impl TokenSource for UaaTokenSource {
    fn token(&self) -> impl Future<Output = Result<Token, AuthError>> + Send {
        self.fetch()
    }
}

fn parse_access_token(body: &[u8]) -> Result<Token, MalformedResponse> {
    let value: Value = serde_json::from_slice(body).map_err(MalformedResponse::InvalidJson)?;

    match value.get("access_token") {
        Some(Value::String(access_token)) => Ok(Token::from_access_token(access_token)),
        Some(_) => Err(MalformedResponse::AccessTokenNotString),
        None => Err(MalformedResponse::MissingAccessToken),
    }
}

#[cfg(test)]
mod tests {
    use capacity_test::{MockUpstream, TokenResponse};
    use reqwest::StatusCode;

    use super::*;

    fn source(upstream: &MockUpstream) -> UaaTokenSource {
        UaaTokenSource::new(reqwest::Client::new(), &upstream.url(), "reader", "s3cret")
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let source = UaaTokenSource::new(
            reqwest::Client::new(),
            "https://uaa.example.com/",
            "id",
            "secret",
        );
        assert_eq!(source.endpoint(), "https://uaa.example.com/oauth/token");
    }

    #[test]
    fn test_parse_access_token() {
        let token = parse_access_token(br#"{"access_token":"abc123","expires_in":599}"#).unwrap();
        assert_eq!(token.header_value(), "bearer abc123");

        assert!(matches!(
            parse_access_token(b"<html>"),
            Err(MalformedResponse::InvalidJson(_))
        ));
        assert!(matches!(
            parse_access_token(b"{}"),
            Err(MalformedResponse::MissingAccessToken)
        ));
        assert!(matches!(
            parse_access_token(br#"{"access_token":42}"#),
            Err(MalformedResponse::AccessTokenNotString)
        ));
        assert!(matches!(
            parse_access_token(b"[]"),
            Err(MalformedResponse::MissingAccessToken)
        ));
    }

    #[tokio::test]
    async fn test_token_success() {
        let upstream = MockUpstream::start().await;
        upstream.push_token(TokenResponse::Token("abc123".to_owned()));

        let token = source(&upstream).token().await.unwrap();
        assert_eq!(token.header_value(), "bearer abc123");

        let requests = upstream.token_requests();
        assert_eq!(requests.len(), 1);
        let form = &requests[0].form;
        assert_eq!(form["response_type"], "token");
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_id"], "reader");
        assert_eq!(form["client_secret"], "s3cret");
    }

    #[tokio::test]
    async fn test_token_not_cached() {
        let upstream = MockUpstream::start().await;
        let source = source(&upstream);

        source.token().await.unwrap();
        source.token().await.unwrap();
        assert_eq!(upstream.token_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_token_unexpected_status() {
        let upstream = MockUpstream::start().await;
        upstream
            .push_token(TokenResponse::Status(StatusCode::UNAUTHORIZED))
            .push_token(TokenResponse::Status(StatusCode::CREATED));
        let source = source(&upstream);

        let error = source.token().await.unwrap_err();
        assert!(matches!(
            error,
            AuthError::UnexpectedStatus(status) if status == StatusCode::UNAUTHORIZED
        ));
        assert_eq!(
            error.to_string(),
            "token issuer responded with status 401 Unauthorized"
        );

        let error = source.token().await.unwrap_err();
        assert!(matches!(
            error,
            AuthError::UnexpectedStatus(status) if status == StatusCode::CREATED
        ));
    }

    #[tokio::test]
    async fn test_token_malformed() {
        let upstream = MockUpstream::start().await;
        upstream
            .push_token(TokenResponse::Body("not json".to_owned()))
            .push_token(TokenResponse::Body(r#"{"token":"abc"}"#.to_owned()))
            .push_token(TokenResponse::Body(r#"{"access_token":null}"#.to_owned()));
        let source = source(&upstream);

        assert!(matches!(
            source.token().await,
            Err(AuthError::MalformedResponse(MalformedResponse::InvalidJson(_)))
        ));
        assert!(matches!(
            source.token().await,
            Err(AuthError::MalformedResponse(
                MalformedResponse::MissingAccessToken
            ))
        ));
        assert!(matches!(
            source.token().await,
            Err(AuthError::MalformedResponse(
                MalformedResponse::AccessTokenNotString
            ))
        ));
    }

    #[tokio::test]
    async fn test_token_transport_error() {
        // Bind and release a port so that nothing listens on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let url = format!("http://127.0.0.1:{port}");
        let source = UaaTokenSource::new(reqwest::Client::new(), &url, "reader", "s3cret");
        let result = source.token().await;
        assert!(matches!(result, Err(AuthError::Transport(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_token_dropped_response() {
        let upstream = MockUpstream::start().await;
        upstream.push_token(TokenResponse::Drop);

        let result = source(&upstream).token().await;
        assert!(matches!(result, Err(AuthError::Transport(_))), "{result:?}");
    }
}
