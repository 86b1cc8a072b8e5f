use log::debug;
use reqwest::blocking::Client;
use thiserror::Error;
use url::Url;

use crate::errors::RequestFailure;

/// Sentinel attached to requests when authentication is disabled.
pub const NO_TOKEN: &str = "no_token";

#[derive(Debug, Error)]
pub enum AuthError {
    /// The injected identity provider couldn't produce a bearer token.
    #[error("identity provider failed: {0}")]
    Provider(String),

    /// The token-exchange endpoint answered with a non-success status.
    #[error(transparent)]
    Exchange(#[from] RequestFailure),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// Source of identity-provider bearer tokens, injected by the caller.
///
/// The client never binds to a concrete identity provider; anything able to
/// produce a bearer token works, including a plain closure.
pub trait IdentityProvider {
    /// # Errors
    ///
    /// Fails when no credential can be produced; the message is surfaced
    /// verbatim to the caller.
    fn bearer_token(&self) -> Result<String, AuthError>;
}

impl<F> IdentityProvider for F
where
    F: Fn() -> Result<String, AuthError>,
{
    fn bearer_token(&self) -> Result<String, AuthError> {
        self()
    }
}

/// Exchange an identity-provider token for a service token.
///
/// The endpoint returns the opaque service token as plain response text.
pub(crate) fn exchange_token(
    http: &Client,
    token_url: &Url,
    provider: &dyn IdentityProvider,
) -> Result<String, AuthError> {
    let bearer = provider.bearer_token()?;
    debug!("exchanging identity token at {token_url}");

    let response = http.get(token_url.clone()).bearer_auth(bearer).send()?;
    let status = response.status();
    if status.is_success() {
        Ok(response.text()?)
    } else {
        Err(AuthError::from(RequestFailure::new(
            token_url.clone(),
            status,
            response.text()?,
        )))
    }
}
