//! Pass-through handlers for the authenticated banking API.
//!
//! Each route relays the caller's bearer token to the upstream API and hands
//! the upstream JSON back. The proxy adds nothing of its own beyond the
//! error mapping: a missing bearer never reaches the network, an upstream
//! 401 stays a 401, anything else upstream-shaped becomes a 502 with the
//! upstream body as diagnostic detail.

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use http::Method;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::RevolutProxy;

pub(crate) async fn handle_accounts(
    State(proxy): State<RevolutProxy>,
    headers: HeaderMap,
) -> Result<Response> {
    forward(&proxy, &headers, Method::GET, "accounts", &[], None).await
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionParams {
    limit: Option<u32>,
}

pub(crate) async fn handle_transactions(
    State(proxy): State<RevolutProxy>,
    Query(params): Query<TransactionParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let count = params.limit.unwrap_or(50).to_string();
    forward(
        &proxy,
        &headers,
        Method::GET,
        "transactions",
        &[("count", count.as_str())],
        None,
    )
    .await
}

pub(crate) async fn handle_list_counterparties(
    State(proxy): State<RevolutProxy>,
    headers: HeaderMap,
) -> Result<Response> {
    forward(&proxy, &headers, Method::GET, "counterparties", &[], None).await
}

pub(crate) async fn handle_create_counterparty(
    State(proxy): State<RevolutProxy>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response> {
    forward(
        &proxy,
        &headers,
        Method::POST,
        "counterparties",
        &[],
        Some(body),
    )
    .await
}

pub(crate) async fn handle_pay(
    State(proxy): State<RevolutProxy>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response> {
    forward(&proxy, &headers, Method::POST, "pay", &[], Some(body)).await
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateParams {
    from: String,
    to: String,
    amount: Option<f64>,
}

/// FX rate lookup, forwarded verbatim.
pub(crate) async fn handle_rate(
    State(proxy): State<RevolutProxy>,
    Query(params): Query<RateParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let amount = params.amount.unwrap_or(1.0).to_string();
    forward(
        &proxy,
        &headers,
        Method::GET,
        "rate",
        &[
            ("from", params.from.as_str()),
            ("to", params.to.as_str()),
            ("amount", amount.as_str()),
        ],
        None,
    )
    .await
}

/// Connectivity probe: hits the accounts endpoint and reports pass/fail
/// instead of relaying the account list.
pub(crate) async fn handle_test(
    State(proxy): State<RevolutProxy>,
    headers: HeaderMap,
) -> Result<Response> {
    let token = bearer_token(&headers)?;
    let url = upstream_url(&proxy, "accounts");

    let response = proxy
        .http()
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(Error::transport)?;

    let status = response.status();
    if status.is_success() {
        return Ok(Json(serde_json::json!({
            "success": true,
            "message": "connected to the Revolut API",
        }))
        .into_response());
    }

    tracing::warn!("connectivity probe failed upstream with {status}");
    if status == StatusCode::UNAUTHORIZED {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "success": false,
                "error": "invalid or expired access token",
            })),
        )
            .into_response());
    }

    let detail: Option<serde_json::Value> = response.json().await.ok();
    Err(Error::UpstreamRejected {
        message: format!("Revolut API returned {status}"),
        detail,
    })
}

// Forwarding plumbing

/// Extract the caller's bearer token, refusing the request before any
/// upstream call when it is missing.
fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or(Error::Unauthorized)
}

fn upstream_url(proxy: &RevolutProxy, path: &str) -> String {
    format!(
        "{}/{}",
        proxy.config().api_base.as_str().trim_end_matches('/'),
        path
    )
}

async fn forward(
    proxy: &RevolutProxy,
    headers: &HeaderMap,
    method: Method,
    path: &str,
    query: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> Result<Response> {
    let token = bearer_token(headers)?;
    let url = upstream_url(proxy, path);

    let mut request = proxy.http().request(method, &url).bearer_auth(token);
    if !query.is_empty() {
        request = request.query(query);
    }
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(Error::transport)?;
    relay(response).await
}

/// Hand an upstream response back to the caller.
async fn relay(response: reqwest::Response) -> Result<Response> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid or expired access token" })),
        )
            .into_response());
    }

    if !status.is_success() {
        let detail: Option<serde_json::Value> = response.json().await.ok();
        return Err(Error::UpstreamRejected {
            message: format!("Revolut API returned {status}"),
            detail,
        });
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/json"));
    let bytes = response.bytes().await.map_err(Error::transport)?;

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .map_err(|e| Error::Network(e.to_string()))
}
