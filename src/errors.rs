use reqwest::StatusCode;
use std::fmt::{self, Formatter};
use thiserror::Error;
use url::Url;

/// A non-success HTTP exchange, kept verbatim for diagnostics.
///
/// Every taxonomy error that originates on the wire wraps one of these so
/// the caller always has the original status code and raw response body.
#[derive(Debug, Error)]
pub struct RequestFailure {
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
}

impl RequestFailure {
    pub fn new(url: Url, status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            url,
            status,
            body: body.into(),
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(
            formatter,
            "{:?}\n returned {}, with:\n{}",
            self.url, self.status, self.body
        )
    }
}

/// Field-level `errors` carried inside an otherwise successful GraphQL
/// response. Surfaced instead of being silently dropped, so a 200 envelope
/// with partial errors never passes for a clean result.
#[derive(Debug, Error)]
pub struct GraphFailure {
    pub messages: Vec<String>,
}

impl GraphFailure {
    #[must_use]
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    pub(crate) fn missing_field(name: &str) -> Self {
        Self::new(vec![format!("response carried no {name} field")])
    }
}

impl fmt::Display for GraphFailure {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "graphql reported: {}", self.messages.join("; "))
    }
}
