use axum::http::{HeaderValue, Method, header};
use miette::{IntoDiagnostic, Result, miette};
use revolut_proxy::{ClientCredentials, Environment, ProxyConfig, RevolutProxy};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use url::Url;

fn load_config() -> Result<ProxyConfig> {
    let frontend_url =
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
    let frontend_url = Url::parse(&frontend_url).into_diagnostic()?;

    let environment = match std::env::var("REVOLUT_ENVIRONMENT").as_deref() {
        Ok("production") => Environment::Production,
        _ => Environment::Sandbox,
    };

    let mut config = ProxyConfig::new(frontend_url).with_environment(environment);

    let client_id = std::env::var("REVOLUT_CLIENT_ID").ok();
    let private_key = std::env::var("REVOLUT_PRIVATE_KEY").ok();
    let redirect_uri = std::env::var("REVOLUT_REDIRECT_URI").ok();

    match (client_id, private_key, redirect_uri) {
        (Some(id), Some(key), Some(uri)) => {
            let redirect_uri = Url::parse(&uri).into_diagnostic()?;
            match ClientCredentials::new(id, &key, redirect_uri) {
                Ok(credentials) => config = config.with_credentials(credentials),
                Err(e) => tracing::warn!("OAuth credentials unusable, auth routes disabled: {e}"),
            }
        }
        _ => tracing::warn!(
            "REVOLUT_CLIENT_ID, REVOLUT_PRIVATE_KEY and REVOLUT_REDIRECT_URI are not all set; \
             auth routes disabled"
        ),
    }

    Ok(config)
}

fn cors_for(frontend_url: &Url) -> Result<CorsLayer> {
    let origin = frontend_url.origin().ascii_serialization();
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| miette!("invalid frontend origin {origin}: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let cors = cors_for(&config.frontend_url)?;

    let proxy = RevolutProxy::new(config).into_diagnostic()?;
    let app = proxy.router().layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .into_diagnostic()?;

    tracing::info!("Revolut proxy backend listening on port {port}");
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}
