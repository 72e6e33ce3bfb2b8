//! The client-assertion token exchange against the authorization server.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::assertion;
use crate::config::ClientCredentials;
use crate::error::{Error, Result};

/// RFC 7523 assertion type sent alongside the signed JWT.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Default bound on a single exchange round-trip.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Access/refresh token pair returned by the token endpoint.
///
/// Ownership transfers to the caller, which is responsible for storage and
/// expiry bookkeeping. `refresh_token` may be absent; the refresh grant does
/// not always rotate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResult {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token, in seconds.
    pub expires_in: u64,
    pub token_type: String,
}

/// Error payload shape of the authorization server.
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchanges authorization codes and refresh tokens for access tokens,
/// authenticating with a freshly minted client assertion on every attempt.
///
/// Every exchange is an independent, single-shot operation: no state is
/// shared between concurrent calls and nothing is retried (the code grant is
/// single-use upstream, so a blind retry could never succeed).
pub struct TokenExchangeClient {
    http: reqwest::Client,
    token_url: Url,
}

impl TokenExchangeClient {
    pub fn new(token_url: Url) -> Result<Self> {
        Self::with_timeout(token_url, DEFAULT_EXCHANGE_TIMEOUT)
    }

    pub fn with_timeout(token_url: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { http, token_url })
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        credentials: &ClientCredentials,
    ) -> Result<TokenResult> {
        if code.is_empty() {
            return Err(Error::InvalidRequest(
                "missing authorization code".to_string(),
            ));
        }

        let client_assertion = assertion::mint_assertion(credentials)?;
        let redirect_uri = credentials.redirect_uri().to_string();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", client_assertion.as_str()),
        ];

        self.request_token(&params).await
    }

    /// Exchange a refresh token for a fresh token pair.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        credentials: &ClientCredentials,
    ) -> Result<TokenResult> {
        if refresh_token.is_empty() {
            return Err(Error::InvalidRequest("missing refresh_token".to_string()));
        }

        let client_assertion = assertion::mint_assertion(credentials)?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", client_assertion.as_str()),
        ];

        self.request_token(&params).await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResult> {
        let response = self
            .http
            .post(self.token_url.clone())
            .form(params)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail: Option<serde_json::Value> = response.json().await.ok();
            let message = detail
                .as_ref()
                .and_then(|body| {
                    serde_json::from_value::<UpstreamErrorBody>(body.clone()).ok()
                })
                .and_then(|body| body.error_description.or(body.error))
                .unwrap_or_else(|| format!("token endpoint returned {status}"));

            tracing::warn!("token exchange rejected upstream: {message}");
            return Err(Error::UpstreamRejected { message, detail });
        }

        response
            .json::<TokenResult>()
            .await
            .map_err(Error::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkeys;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Instant;

    const TOKEN_PATH: &str = "/api/1.0/auth/token";

    fn credentials() -> ClientCredentials {
        ClientCredentials::new(
            "client-123",
            testkeys::RSA_PKCS8,
            "https://proxy.example.com/auth/callback".parse().unwrap(),
        )
        .unwrap()
    }

    fn client_for(server: &MockServer) -> TokenExchangeClient {
        TokenExchangeClient::new(server.url(TOKEN_PATH).parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn code_exchange_returns_token_result() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(TOKEN_PATH)
                    .body_contains("grant_type=authorization_code")
                    .body_contains("code=validcode")
                    .body_contains(
                        "client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3A\
                         client-assertion-type%3Ajwt-bearer",
                    )
                    .body_contains("client_assertion=ey");
                then.status(200).json_body(json!({
                    "access_token": "A",
                    "expires_in": 3600,
                    "token_type": "bearer",
                }));
            })
            .await;

        let token = client_for(&server)
            .exchange_code("validcode", &credentials())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "A");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.token_type, "bearer");
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn refresh_exchange_carries_refresh_grant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(TOKEN_PATH)
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=oa_refresh");
                then.status(200).json_body(json!({
                    "access_token": "A2",
                    "refresh_token": "R2",
                    "expires_in": 2400,
                    "token_type": "bearer",
                }));
            })
            .await;

        let token = client_for(&server)
            .exchange_refresh_token("oa_refresh", &credentials())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "A2");
        assert_eq!(token.refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn missing_refresh_token_skips_the_network() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(TOKEN_PATH);
                then.status(200);
            })
            .await;

        let err = client_for(&server)
            .exchange_refresh_token("", &credentials())
            .await
            .unwrap_err();

        assert_matches!(err, Error::InvalidRequest(_));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn rejection_surfaces_error_description() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TOKEN_PATH);
                then.status(400).json_body(json!({
                    "error": "invalid_grant",
                    "error_description": "code expired",
                }));
            })
            .await;

        let err = client_for(&server)
            .exchange_code("stalecode", &credentials())
            .await
            .unwrap_err();

        assert_matches!(err, Error::UpstreamRejected { message, detail } => {
            assert_eq!(message, "code expired");
            assert_eq!(detail.unwrap()["error"], "invalid_grant");
        });
    }

    #[tokio::test]
    async fn rejection_without_description_falls_back_to_error_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TOKEN_PATH);
                then.status(401).json_body(json!({ "error": "invalid_client" }));
            })
            .await;

        let err = client_for(&server)
            .exchange_code("validcode", &credentials())
            .await
            .unwrap_err();

        assert_matches!(err, Error::UpstreamRejected { message, .. } => {
            assert_eq!(message, "invalid_client");
        });
    }

    #[tokio::test]
    async fn rejection_without_body_falls_back_to_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TOKEN_PATH);
                then.status(502).body("upstream exploded");
            })
            .await;

        let err = client_for(&server)
            .exchange_code("validcode", &credentials())
            .await
            .unwrap_err();

        assert_matches!(err, Error::UpstreamRejected { message, .. } => {
            assert!(message.contains("502"));
        });
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_within_the_bound() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TOKEN_PATH);
                then.status(200)
                    .delay(Duration::from_secs(10))
                    .json_body(json!({
                        "access_token": "A",
                        "expires_in": 3600,
                        "token_type": "bearer",
                    }));
            })
            .await;

        let client = TokenExchangeClient::with_timeout(
            server.url(TOKEN_PATH).parse().unwrap(),
            Duration::from_millis(250),
        )
        .unwrap();

        let started = Instant::now();
        let err = client
            .exchange_code("validcode", &credentials())
            .await
            .unwrap_err();

        assert_matches!(err, Error::UpstreamTimeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
