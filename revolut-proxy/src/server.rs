use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api;
use crate::assertion;
use crate::config::{ClientCredentials, ProxyConfig};
use crate::error::{Error, Result};
use crate::token::{TokenExchangeClient, TokenResult};

/// Proxy between the banking frontend and the Revolut Business API.
///
/// Holds no per-request state: the credential set is immutable after
/// construction and each exchange mints its own assertion, so any number of
/// flows (two browser tabs finishing OAuth at once, say) may run
/// concurrently. A reused authorization code is rejected upstream, not
/// coordinated here.
#[derive(Clone)]
pub struct RevolutProxy {
    config: Arc<ProxyConfig>,
    exchange: Arc<TokenExchangeClient>,
    http: reqwest::Client,
}

impl RevolutProxy {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let exchange =
            TokenExchangeClient::with_timeout(config.token_url.clone(), config.exchange_timeout)?;
        let http = reqwest::Client::builder()
            .timeout(config.exchange_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            exchange: Arc::new(exchange),
            http,
        })
    }

    /// Create the axum router with the auth flow, health check and banking
    /// pass-through routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/auth/revolut", get(handle_authorize))
            .route("/auth/callback", get(handle_callback))
            .route("/auth/refresh", post(handle_refresh))
            .route("/api/oauth-config", get(handle_oauth_config))
            .route("/api/accounts", get(api::handle_accounts))
            .route("/api/transactions", get(api::handle_transactions))
            .route(
                "/api/counterparties",
                get(api::handle_list_counterparties).post(api::handle_create_counterparty),
            )
            .route("/api/pay", post(api::handle_pay))
            .route("/api/rate", get(api::handle_rate))
            .route("/api/test", get(api::handle_test))
            .with_state(self.clone())
    }

    pub(crate) fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Shared outbound client for the banking pass-through.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The credential set, or `Unconfigured` before any network work happens.
    fn credentials(&self) -> Result<&ClientCredentials> {
        self.config.credentials.as_ref().ok_or(Error::Unconfigured)
    }
}

// Handlers

/// Readiness report: credential presence plus a live signing self-test.
async fn handle_health(State(proxy): State<RevolutProxy>) -> Json<serde_json::Value> {
    let credentials = proxy.config().credentials.as_ref();
    let signing = credentials
        .map(|creds| assertion::mint_assertion(creds).is_ok())
        .unwrap_or(false);

    Json(serde_json::json!({
        "status": "OK",
        "oauth_configured": credentials.is_some(),
        "assertion_signing": signing,
        "message": "Revolut proxy backend is up",
    }))
}

/// Start the authorization flow: redirect the browser to the provider.
async fn handle_authorize(State(proxy): State<RevolutProxy>) -> Result<Redirect> {
    let creds = proxy.credentials()?;

    let mut url = proxy.config().authorize_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", creds.client_id())
        .append_pair("redirect_uri", creds.redirect_uri().as_str())
        .append_pair("response_type", "code");
    let scope = proxy.config().scope.join(" ");
    if !scope.is_empty() {
        url.query_pairs_mut().append_pair("scope", &scope);
    }

    tracing::info!("redirecting to authorization endpoint");
    Ok(Redirect::to(url.as_str()))
}

/// Provider redirect target: either finish the code exchange or relay the
/// provider's denial. Both failure points end at the frontend error page,
/// but only the former ever touches the token endpoint.
async fn handle_callback(
    State(proxy): State<RevolutProxy>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    if let Some(error) = params.error {
        let denial = Error::ProviderDenied(params.error_description.unwrap_or(error));
        tracing::warn!("{denial}");
        return Ok(error_redirect(proxy.config(), &denial.to_string()));
    }

    let Some(code) = params.code else {
        return Ok(error_redirect(
            proxy.config(),
            "missing authorization code",
        ));
    };

    let creds = proxy.credentials()?;
    match proxy.exchange.exchange_code(&code, creds).await {
        Ok(token) => {
            tracing::info!("authorization code exchanged");
            Ok(success_redirect(proxy.config(), &token))
        }
        Err(err) => {
            tracing::error!("code exchange failed: {err}");
            Ok(error_redirect(proxy.config(), &err.to_string()))
        }
    }
}

/// Trade a refresh token for a fresh pair on behalf of the frontend.
async fn handle_refresh(
    State(proxy): State<RevolutProxy>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResult>> {
    let creds = proxy.credentials()?;
    let refresh_token = body.refresh_token.unwrap_or_default();
    let token = proxy
        .exchange
        .exchange_refresh_token(&refresh_token, creds)
        .await?;
    Ok(Json(token))
}

/// Hand the frontend what it needs to render its connect button.
async fn handle_oauth_config(State(proxy): State<RevolutProxy>) -> Json<OAuthConfigResponse> {
    let credentials = proxy.config().credentials.as_ref();

    Json(OAuthConfigResponse {
        client_id: credentials.map(|c| c.client_id().to_string()),
        auth_url: proxy.config().authorize_url.to_string(),
        redirect_uri: credentials.map(|c| c.redirect_uri().to_string()),
        is_configured: credentials.is_some(),
    })
}

// Request/response types

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct OAuthConfigResponse {
    client_id: Option<String>,
    auth_url: String,
    redirect_uri: Option<String>,
    is_configured: bool,
}

// Helper functions

fn frontend_base(config: &ProxyConfig) -> &str {
    config.frontend_url.as_str().trim_end_matches('/')
}

fn error_redirect(config: &ProxyConfig, message: &str) -> Redirect {
    let url = format!(
        "{}/auth/error?message={}",
        frontend_base(config),
        urlencoding::encode(message)
    );
    Redirect::to(&url)
}

/// Redirect back to the frontend success page with the token fields as
/// query parameters, matching the contract the frontend store consumes.
fn success_redirect(config: &ProxyConfig, token: &TokenResult) -> Redirect {
    let mut url = format!(
        "{}/auth/success?access_token={}&expires_in={}&token_type={}",
        frontend_base(config),
        urlencoding::encode(&token.access_token),
        token.expires_in,
        urlencoding::encode(&token.token_type),
    );
    if let Some(refresh) = &token.refresh_token {
        url.push_str("&refresh_token=");
        url.push_str(&urlencoding::encode(refresh));
    }
    Redirect::to(&url)
}
