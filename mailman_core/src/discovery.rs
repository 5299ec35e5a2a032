//! Discovery of the schedule API published on the carrier's web page.
//!
//! The carrier embeds the API address (and, in later versions, a short-lived token) in the page
//! that explains mail delivery. Neither the address nor the page layout is stable, so every
//! lookup starts from the page again and the extraction is pluggable through [`EndpointLocator`].

use std::fmt::Debug;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::{
    config::{DiscoveryConfig, DiscoveryStrategy},
    error::{ConfigError, DiscoveryError},
};

/// Where to send schedule queries, as found on the source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub url: Url,
    pub token: Option<String>,
}

/// Finds the schedule API.
#[async_trait]
pub trait EndpointDiscoverer: Send + Sync + Debug {
    async fn discover(&self) -> Result<EndpointDescriptor, DiscoveryError>;
}

/// Extracts the endpoint from the text of an already downloaded page.
pub trait EndpointLocator: Send + Sync + Debug {
    fn locate(&self, page: &str, base: &Url) -> Result<EndpointDescriptor, DiscoveryError>;
}

/// Reads the endpoint from an attribute of an element identified by tag and id.
#[derive(Debug)]
pub struct MarkupLocator {
    marker: String,
    selector: Selector,
    attribute: String,
}

impl MarkupLocator {
    pub fn new(element: &str, element_id: &str, attribute: &str) -> Result<Self, ConfigError> {
        let css = format!("{element}[id=\"{}\"]", element_id.replace('"', "\\\""));
        let selector = Selector::parse(&css).map_err(|err| ConfigError::Selector {
            selector: css.clone(),
            reason: format!("{err:?}"),
        })?;
        Ok(MarkupLocator {
            marker: format!("{element}#{element_id}[{attribute}]"),
            selector,
            attribute: attribute.to_string(),
        })
    }
}

impl EndpointLocator for MarkupLocator {
    fn locate(&self, page: &str, base: &Url) -> Result<EndpointDescriptor, DiscoveryError> {
        let document = Html::parse_document(page);
        let value = document
            .select(&self.selector)
            .find_map(|element| {
                element
                    .value()
                    .attr(&self.attribute)
                    .filter(|value| !value.trim().is_empty())
            })
            .ok_or_else(|| DiscoveryError::MarkerNotFound {
                marker: self.marker.clone(),
            })?;
        Ok(EndpointDescriptor {
            url: resolve(base, value)?,
            token: None,
        })
    }
}

/// Pulls `"<key>": "<value>"` pairs out of raw page text.
///
/// Later versions of the page embed the API configuration as JSON inside a script, and the
/// surrounding markup is too broken to parse reliably.
#[derive(Debug)]
pub struct TextPatternLocator {
    url_key: String,
    url_pattern: Regex,
    token_pattern: Option<Regex>,
}

impl TextPatternLocator {
    pub fn new(url_key: &str, token_key: Option<&str>) -> Result<Self, ConfigError> {
        Ok(TextPatternLocator {
            url_key: url_key.to_string(),
            url_pattern: key_pattern(url_key)?,
            token_pattern: token_key.map(key_pattern).transpose()?,
        })
    }
}

impl EndpointLocator for TextPatternLocator {
    fn locate(&self, page: &str, base: &Url) -> Result<EndpointDescriptor, DiscoveryError> {
        let value = extract(&self.url_pattern, page)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| DiscoveryError::MarkerNotFound {
                marker: self.url_key.clone(),
            })?;
        let token = self
            .token_pattern
            .as_ref()
            .and_then(|pattern| extract(pattern, page))
            .filter(|token| !token.is_empty());
        Ok(EndpointDescriptor {
            url: resolve(base, &value)?,
            token,
        })
    }
}

fn key_pattern(key: &str) -> Result<Regex, ConfigError> {
    let key_escaped = regex::escape(key);
    Regex::new(&format!(
        r#"(?:"{key_escaped}"|\b{key_escaped}\b)\s*:\s*"(?P<value>(?:[^"\\]|\\.)*)""#
    ))
    .map_err(|source| ConfigError::Pattern {
        key: key.to_string(),
        source,
    })
}

/// The first value of `pattern` in `text`, with JSON string escapes resolved.
fn extract(pattern: &Regex, text: &str) -> Option<String> {
    let raw = pattern.captures(text)?.name("value")?.as_str();
    Some(serde_json::from_str(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string()))
}

fn resolve(base: &Url, value: &str) -> Result<Url, DiscoveryError> {
    base.join(value.trim())
        .map_err(|source| DiscoveryError::InvalidEndpoint {
            value: value.to_string(),
            source,
        })
}

/// Downloads the source page and hands it to a locator.
#[derive(Debug)]
pub struct PageDiscoverer {
    client: Client,
    page_url: Url,
    locator: Box<dyn EndpointLocator>,
}

impl PageDiscoverer {
    pub fn new(client: Client, page_url: Url, locator: Box<dyn EndpointLocator>) -> Self {
        PageDiscoverer {
            client,
            page_url,
            locator,
        }
    }

    pub fn from_config(client: Client, config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        let locator: Box<dyn EndpointLocator> = match &config.strategy {
            DiscoveryStrategy::Markup {
                element,
                element_id,
                attribute,
            } => Box::new(MarkupLocator::new(element, element_id, attribute)?),
            DiscoveryStrategy::TextPattern { url_key, token_key } => {
                Box::new(TextPatternLocator::new(url_key, token_key.as_deref())?)
            }
        };
        Ok(PageDiscoverer::new(
            client,
            config.page_url.clone(),
            locator,
        ))
    }

    async fn fetch_page(&self) -> Result<String, DiscoveryError> {
        let unavailable = |reason: String| DiscoveryError::UpstreamUnavailable {
            url: self.page_url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(self.page_url.clone())
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("status code {status}")));
        }
        response
            .text()
            .await
            .map_err(|err| unavailable(err.to_string()))
    }
}

#[async_trait]
impl EndpointDiscoverer for PageDiscoverer {
    async fn discover(&self) -> Result<EndpointDescriptor, DiscoveryError> {
        debug!(url = %self.page_url, "fetching source page");
        let page = self.fetch_page().await?;
        let endpoint = self.locator.locate(&page, &self.page_url)?;
        debug!(
            url = %endpoint.url,
            token = endpoint.token.is_some(),
            "discovered schedule endpoint"
        );
        Ok(endpoint)
    }
}
