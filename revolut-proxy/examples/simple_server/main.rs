//! Simple example proxy server against the Revolut sandbox.
//!
//! Reads the OAuth credentials from `REVOLUT_CLIENT_ID`,
//! `REVOLUT_PRIVATE_KEY` and `REVOLUT_REDIRECT_URI`; without them the proxy
//! still serves, with the auth routes answering "unconfigured".
//!
//! Run with:
//! ```
//! cargo run --example simple_server
//! ```

use miette::{Context, IntoDiagnostic};
use revolut_proxy::{ClientCredentials, ProxyConfig, RevolutProxy};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simple_server=debug,revolut_proxy=debug,info".parse().unwrap()),
        )
        .init();

    // Configure the proxy (sandbox endpoints by default)
    let mut config = ProxyConfig::new(url::Url::parse("http://localhost:5173").unwrap());

    if let (Ok(id), Ok(key), Ok(uri)) = (
        std::env::var("REVOLUT_CLIENT_ID"),
        std::env::var("REVOLUT_PRIVATE_KEY"),
        std::env::var("REVOLUT_REDIRECT_URI"),
    ) {
        let redirect_uri = url::Url::parse(&uri)
            .into_diagnostic()
            .wrap_err("invalid REVOLUT_REDIRECT_URI")?;
        let credentials = ClientCredentials::new(id, &key, redirect_uri)
            .into_diagnostic()
            .wrap_err("unusable OAuth credentials")?;
        config = config.with_credentials(credentials);
    } else {
        tracing::warn!("no OAuth credentials in the environment, auth routes disabled");
    }

    // Build the proxy and the axum app with CORS
    let proxy = RevolutProxy::new(config)
        .into_diagnostic()
        .wrap_err("failed to build proxy")?;
    let app = proxy.router().layer(CorsLayer::permissive());

    // Start the server
    let addr = SocketAddr::from(([127, 0, 0, 1], 3001));
    tracing::info!("Revolut proxy listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()
        .wrap_err("failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .into_diagnostic()
        .wrap_err("server error")?;

    Ok(())
}
