//! Error types shared across the pipeline.

use reqwest::StatusCode;
use thiserror::Error;

/// A postal code that is not exactly four ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid postal code {raw:?}")]
pub struct InvalidPostalCode {
    pub raw: String,
}

/// A single upstream date value that could not be turned into a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("could not parse date {raw:?}")]
    BadFormat { raw: String },
    #[error("could not parse month {month:?} in {raw:?}")]
    UnknownMonth { raw: String, month: String },
    #[error("date {raw:?} does not exist")]
    InvalidDate { raw: String },
}

impl ParseError {
    /// The upstream value that failed to parse.
    pub fn raw(&self) -> &str {
        match self {
            ParseError::BadFormat { raw }
            | ParseError::UnknownMonth { raw, .. }
            | ParseError::InvalidDate { raw } => raw,
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source page {url} unavailable: {reason}")]
    UpstreamUnavailable { url: String, reason: String },
    #[error("endpoint marker {marker} not found on source page")]
    MarkerNotFound { marker: String },
    #[error("endpoint {value:?} is not a valid url")]
    InvalidEndpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("endpoint discovery failed: {0}")]
    DiscoveryFailed(#[from] DiscoveryError),
    #[error("schedule endpoint responded with {status}")]
    UpstreamError { status: StatusCode },
    #[error("schedule request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected schedule payload: {0}")]
    DecodeError(#[source] serde_json::Error),
    #[error("unparseable delivery date: {0}")]
    ParseError(#[from] ParseError),
    #[error("timed out fetching schedule")]
    Timeout,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Failure of a calendar request as seen by the HTTP layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidPostalCode(#[from] InvalidPostalCode),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Static configuration that cannot be used. Only ever raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{option} must not be empty")]
    Empty { option: &'static str },
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("invalid pattern for key {key:?}")]
    Pattern {
        key: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid header name {name:?}")]
    HeaderName {
        name: String,
        #[source]
        source: reqwest::header::InvalidHeaderName,
    },
    #[error("could not build http client")]
    Client(#[source] reqwest::Error),
}
