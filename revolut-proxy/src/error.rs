use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the OAuth exchange and the banking pass-through.
///
/// Configuration and request-shape errors are surfaced immediately and never
/// retried. Upstream errors carry the provider-supplied description when one
/// exists; key material is never echoed back.
#[derive(Debug, Error)]
pub enum Error {
    /// The OAuth credential set is missing or failed validation at startup.
    #[error("OAuth client credentials are not configured")]
    Unconfigured,

    /// The configured private key is not in a supported PEM encoding.
    #[error("unsupported private key format: {0}")]
    KeyFormat(String),

    /// The key looked like PEM but could not be parsed or used for signing.
    #[error("failed to sign client assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// The caller omitted a required parameter.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller did not present a bearer token.
    #[error("missing access token")]
    Unauthorized,

    /// The token endpoint did not answer within the configured bound.
    #[error("token endpoint did not respond in time")]
    UpstreamTimeout,

    /// The authorization server answered with an error payload.
    #[error("{message}")]
    UpstreamRejected {
        message: String,
        detail: Option<serde_json::Value>,
    },

    /// The provider's redirect carried an error before any exchange ran.
    #[error("authorization denied: {0}")]
    ProviderDenied(String),

    /// Transport failure other than a timeout.
    #[error("network error: {0}")]
    Network(String),
}

impl Error {
    /// Classify an outbound transport failure.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamTimeout
        } else {
            Error::Network(err.to_string())
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status = match self {
            Error::Unconfigured | Error::KeyFormat(_) | Error::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::InvalidRequest(_) | Error::ProviderDenied(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Error::UpstreamRejected { .. } | Error::Network(_) => StatusCode::BAD_GATEWAY,
        };

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Error::UpstreamRejected {
            detail: Some(detail),
            ..
        } = &self
        {
            body["details"] = detail.clone();
        }

        (status, Json(body)).into_response()
    }
}
