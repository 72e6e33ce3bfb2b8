use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::key;
use crate::token::DEFAULT_EXCHANGE_TIMEOUT;

/// Upstream endpoint set to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    /// Browser-facing authorization endpoint.
    pub fn authorize_url(&self) -> Url {
        match self {
            Environment::Sandbox => "https://sandbox-business.revolut.com/app-confirm",
            Environment::Production => "https://business.revolut.com/app-confirm",
        }
        .parse()
        .expect("valid url")
    }

    /// Token endpoint for the code and refresh exchanges.
    pub fn token_url(&self) -> Url {
        match self {
            Environment::Sandbox => "https://sandbox-b2b.revolut.com/api/1.0/auth/token",
            Environment::Production => "https://b2b.revolut.com/api/1.0/auth/token",
        }
        .parse()
        .expect("valid url")
    }

    /// Base of the authenticated banking API.
    pub fn api_base(&self) -> Url {
        match self {
            Environment::Sandbox => "https://sandbox-b2b.revolut.com/api/1.0",
            Environment::Production => "https://b2b.revolut.com/api/1.0",
        }
        .parse()
        .expect("valid url")
    }
}

/// Validated OAuth client credentials, loaded once at process start.
///
/// Construction is the only validation gate: a value of this type always
/// carries a non-empty client id and a key in a supported PEM format, so no
/// assertion is ever minted from an unvalidated credential set.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    client_id: String,
    private_key: String,
    redirect_uri: Url,
}

impl ClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        private_key: &str,
        redirect_uri: Url,
    ) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(Error::Unconfigured);
        }
        let private_key = key::normalize_private_key(private_key)?;

        Ok(Self {
            client_id,
            private_key,
            redirect_uri,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Normalized PEM block of the signing key.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Origin of the redirect URI, used as the assertion issuer.
    pub fn issuer(&self) -> String {
        self.redirect_uri.origin().ascii_serialization()
    }
}

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Which Revolut environment to talk to.
    pub environment: Environment,

    /// Public address of the single-page frontend (redirect target).
    pub frontend_url: Url,

    /// OAuth credentials; `None` leaves the auth routes answering
    /// "unconfigured" while the rest of the proxy stays up.
    pub credentials: Option<ClientCredentials>,

    /// OAuth scopes requested on the authorization redirect.
    pub scope: Vec<String>,

    /// Bound on every outbound call to Revolut.
    pub exchange_timeout: Duration,

    /// Authorization endpoint, defaulted from `environment`.
    pub authorize_url: Url,

    /// Token endpoint, defaulted from `environment`.
    pub token_url: Url,

    /// Banking API base, defaulted from `environment`.
    pub api_base: Url,
}

impl ProxyConfig {
    /// Create a sandbox configuration with the default scope set.
    pub fn new(frontend_url: Url) -> Self {
        let environment = Environment::default();
        Self {
            environment,
            frontend_url,
            credentials: None,
            scope: vec![
                "read:account".to_string(),
                "read:transaction".to_string(),
                "read:counterparty".to_string(),
            ],
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            authorize_url: environment.authorize_url(),
            token_url: environment.token_url(),
            api_base: environment.api_base(),
        }
    }

    /// Switch environments, resetting the endpoint URLs to its defaults.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self.authorize_url = environment.authorize_url();
        self.token_url = environment.token_url();
        self.api_base = environment.api_base();
        self
    }

    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scope = scopes;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Point the token exchange at a non-default endpoint.
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Point the banking pass-through at a non-default upstream.
    pub fn with_api_base(mut self, url: Url) -> Self {
        self.api_base = url;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkeys;
    use assert_matches::assert_matches;

    fn redirect_uri() -> Url {
        "https://proxy.example.com/auth/callback".parse().unwrap()
    }

    #[test]
    fn rejects_empty_client_id() {
        let err = ClientCredentials::new("  ", testkeys::RSA_PKCS8, redirect_uri()).unwrap_err();
        assert_matches!(err, Error::Unconfigured);
    }

    #[test]
    fn rejects_unusable_key() {
        let err = ClientCredentials::new("client-123", "nonsense", redirect_uri()).unwrap_err();
        assert_matches!(err, Error::KeyFormat(_));
    }

    #[test]
    fn issuer_is_redirect_origin() {
        let creds =
            ClientCredentials::new("client-123", testkeys::RSA_PKCS8, redirect_uri()).unwrap();
        assert_eq!(creds.issuer(), "https://proxy.example.com");
    }

    #[test]
    fn environment_switch_resets_endpoints() {
        let config = ProxyConfig::new("https://app.example.com".parse().unwrap())
            .with_environment(Environment::Production);
        assert_eq!(
            config.token_url.as_str(),
            "https://b2b.revolut.com/api/1.0/auth/token"
        );
        assert_eq!(
            config.authorize_url.as_str(),
            "https://business.revolut.com/app-confirm"
        );
    }
}
