use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Well-known service host, used when the caller has no override.
pub const DEFAULT_HOST: &str = "https://toto.dev.r2-factory.com";

/// Well-known token-exchange endpoint of the identity service.
pub const DEFAULT_TOKEN_URL: &str = "https://r2-auth.dev.r2-factory.com/token";

/// Fixed period between job-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}

/// Connection settings for a [`crate::api::TotoClient`].
///
/// The client itself never reads the environment; [`ClientConfig::from_env`]
/// and [`login_required_from_env`] are offered as one possible source a
/// caller may use to populate the settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service base URL.
    pub host: Url,
    /// Endpoint exchanging an identity-provider bearer token for a service
    /// token.
    pub token_url: Url,
    /// Period of the fixed-interval job poll.
    pub poll_interval: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(host: Url, token_url: Url) -> Self {
        Self {
            host,
            token_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Configuration pointing at the well-known service deployment.
    ///
    /// # Errors
    ///
    /// Fails only if the built-in URLs fail to parse.
    pub fn well_known() -> Result<Self, ConfigError> {
        Ok(Self::new(
            Url::parse(DEFAULT_HOST)?,
            Url::parse(DEFAULT_TOKEN_URL)?,
        ))
    }

    /// Read `TOTO_HOST` and `TOTO_TOKEN_URL`, falling back to the well-known
    /// deployment for anything unset.
    ///
    /// # Errors
    ///
    /// Fails if an override is present but is not a valid URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_overrides(env::var("TOTO_HOST").ok(), env::var("TOTO_TOKEN_URL").ok())
    }

    fn from_overrides(
        host: Option<String>,
        token_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let host = host.unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let token_url = token_url.unwrap_or_else(|| DEFAULT_TOKEN_URL.to_owned());
        Ok(Self::new(Url::parse(&host)?, Url::parse(&token_url)?))
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// `LOGIN_REQUIRED` environment override: anything except the literal
/// `"False"` keeps authentication on. Unset means required.
#[must_use]
pub fn login_required_from_env() -> bool {
    env::var("LOGIN_REQUIRED").map_or(true, |value| value != "False")
}
