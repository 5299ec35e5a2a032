//! Configuration of the pipeline.
//!
//! The binaries read it from the command line or from `MATT_*` environment variables through
//! [`CoreArgs`] and [`CacheArgs`]. The resulting [`Config`] is immutable and handed to the
//! components at construction time.

use std::{num::NonZeroUsize, time::Duration};

use clap::{Args, ValueEnum};
use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

/// How the schedule API address is found on the source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// Read an attribute of the element with the given tag and id.
    Markup {
        element: String,
        element_id: String,
        attribute: String,
    },
    /// Extract `"<url_key>": "..."` (and optionally the token) from the raw page text.
    TextPattern {
        url_key: String,
        token_key: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryConfig {
    pub page_url: Url,
    pub strategy: DiscoveryStrategy,
}

/// Generation of the carrier's schedule API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ApiGeneration {
    /// `?postCode=` answered by `{"nextDeliveryDays": ["torsdag 4. september", ...]}`.
    NextDeliveryDays,
    /// `?postalCode=` answered by `{"delivery_dates": ["2025-09-04", ...]}`.
    DeliveryDates,
}

impl ApiGeneration {
    pub fn default_postcode_param(self) -> &'static str {
        match self {
            ApiGeneration::NextDeliveryDays => "postCode",
            ApiGeneration::DeliveryDates => "postalCode",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetcherConfig {
    pub generation: ApiGeneration,
    pub postcode_param: String,
    pub token_header: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarConfig {
    pub product_id: String,
    pub name: String,
    pub timezone: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheConfig {
    pub sweep_interval: Duration,
    pub capacity: Option<NonZeroUsize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            sweep_interval: Duration::from_secs(60),
            capacity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub fetcher: FetcherConfig,
    pub calendar: CalendarConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiscoveryKind {
    Markup,
    TextPattern,
}

/// Options shared by every binary that talks to the carrier.
#[derive(Debug, Clone, Args)]
pub struct CoreArgs {
    /// page that publishes the schedule API address
    #[arg(
        long,
        env = "MATT_PAGE_URL",
        default_value = "https://www.posten.no/levering-av-post"
    )]
    pub page_url: Url,
    /// how the API address is located on the page
    #[arg(long, env = "MATT_DISCOVERY", value_enum, default_value_t = DiscoveryKind::Markup)]
    pub discovery: DiscoveryKind,
    /// tag of the element carrying the API address
    #[arg(long, env = "MATT_API_ELEMENT", default_value = "div")]
    pub api_element: String,
    /// id of the element carrying the API address
    #[arg(long, env = "MATT_API_ELEMENT_ID", default_value = "mailbox-delivery-date")]
    pub api_element_id: String,
    /// attribute holding the API address
    #[arg(long, env = "MATT_API_URL_ATTR", default_value = "data-component-url")]
    pub api_url_attr: String,
    /// key of the API address in the page text
    #[arg(long, env = "MATT_API_URL_KEY", default_value = "serviceUrl")]
    pub api_url_key: String,
    /// key of the API token in the page text, empty to send no token
    #[arg(long, env = "MATT_API_KEY_KEY", default_value = "apiKey")]
    pub api_key_key: String,
    /// request header carrying the API token
    #[arg(long, env = "MATT_API_KEY_HEADER", default_value = "kp-api-token")]
    pub api_key_header: String,
    /// generation of the schedule API
    #[arg(
        long,
        env = "MATT_API_GENERATION",
        value_enum,
        default_value_t = ApiGeneration::NextDeliveryDays
    )]
    pub api_generation: ApiGeneration,
    /// query parameter carrying the postal code [default: depends on the generation]
    #[arg(long, env = "MATT_API_POSTCODE_ARG")]
    pub api_postcode_arg: Option<String>,
    /// timeout for one schedule lookup, discovery included
    #[arg(long, env = "MATT_API_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub api_timeout: Duration,
    /// PRODID of the calendar
    #[arg(
        long,
        env = "MATT_PRODUCT_ID",
        default_value = "-//github.com//kluzzebass//mailman-matt//EN"
    )]
    pub product_id: String,
    /// summary of every delivery event
    #[arg(long, env = "MATT_SUMMARY", default_value = "POST")]
    pub summary: String,
    /// timezone of the calendar
    #[arg(long, env = "MATT_TIMEZONE", default_value = "Europe/Oslo")]
    pub timezone: String,
    /// display name of the calendar
    #[arg(long, env = "MATT_NAME", default_value = "Matt")]
    pub name: String,
}

impl CoreArgs {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let strategy = match self.discovery {
            DiscoveryKind::Markup => DiscoveryStrategy::Markup {
                element: non_empty(self.api_element, "api-element")?,
                element_id: non_empty(self.api_element_id, "api-element-id")?,
                attribute: non_empty(self.api_url_attr, "api-url-attr")?,
            },
            DiscoveryKind::TextPattern => DiscoveryStrategy::TextPattern {
                url_key: non_empty(self.api_url_key, "api-url-key")?,
                token_key: Some(self.api_key_key).filter(|key| !key.is_empty()),
            },
        };
        let postcode_param = match self.api_postcode_arg {
            Some(param) => non_empty(param, "api-postcode-arg")?,
            None => self.api_generation.default_postcode_param().to_string(),
        };
        Ok(Config {
            discovery: DiscoveryConfig {
                page_url: self.page_url,
                strategy,
            },
            fetcher: FetcherConfig {
                generation: self.api_generation,
                postcode_param,
                token_header: non_empty(self.api_key_header, "api-key-header")?,
                timeout: self.api_timeout,
            },
            calendar: CalendarConfig {
                product_id: self.product_id,
                name: self.name,
                timezone: self.timezone,
                summary: self.summary,
            },
        })
    }
}

/// Options of the calendar cache.
#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    /// how often expired calendars are removed
    #[arg(long, env = "MATT_CACHE_SWEEP_INTERVAL", default_value = "60s", value_parser = humantime::parse_duration)]
    pub cache_sweep_interval: Duration,
    /// maximum number of cached calendars, unbounded if unset
    #[arg(long, env = "MATT_CACHE_CAPACITY")]
    pub cache_capacity: Option<NonZeroUsize>,
}

impl From<CacheArgs> for CacheConfig {
    fn from(value: CacheArgs) -> Self {
        CacheConfig {
            sweep_interval: value.cache_sweep_interval,
            capacity: value.cache_capacity,
        }
    }
}

fn non_empty(value: String, option: &'static str) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { option })
    } else {
        Ok(value)
    }
}
