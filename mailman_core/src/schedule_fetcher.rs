//! This client fetches the upcoming delivery days of a postal code.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderName, CONTENT_TYPE},
    Client,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    clock::Clock,
    config::{ApiGeneration, Config},
    date_sequence::{DateParser, DateSequence},
    discovery::{EndpointDescriptor, EndpointDiscoverer, PageDiscoverer},
    error::{ConfigError, FetchError},
    postal_code::PostalCode,
};

/// Anything that can tell the delivery days of a postal code.
#[async_trait]
pub trait ScheduleSource: Send + Sync + Debug {
    async fn schedule(
        &self,
        postal_code: &PostalCode,
        timeout: Duration,
    ) -> Result<DateSequence, FetchError>;
}

/// The schedule API response, one variant per API generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSchedulePayload {
    NextDeliveryDays(Vec<String>),
    DeliveryDates(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextDeliveryDaysBody {
    next_delivery_days: Vec<String>,
}

#[derive(Deserialize)]
struct DeliveryDatesBody {
    delivery_dates: Vec<String>,
}

impl RawSchedulePayload {
    /// Decode a response body in the shape `generation` answers with.
    pub fn decode(generation: ApiGeneration, body: &[u8]) -> Result<Self, serde_json::Error> {
        let payload = match generation {
            ApiGeneration::NextDeliveryDays => {
                let body: NextDeliveryDaysBody = serde_json::from_slice(body)?;
                RawSchedulePayload::NextDeliveryDays(body.next_delivery_days)
            }
            ApiGeneration::DeliveryDates => {
                let body: DeliveryDatesBody = serde_json::from_slice(body)?;
                RawSchedulePayload::DeliveryDates(body.delivery_dates)
            }
        };
        Ok(payload)
    }

    pub fn dates(&self) -> &[String] {
        match self {
            RawSchedulePayload::NextDeliveryDays(dates)
            | RawSchedulePayload::DeliveryDates(dates) => dates,
        }
    }
}

#[derive(Debug)]
pub struct ScheduleFetcher {
    client: Client,
    discoverer: Arc<dyn EndpointDiscoverer>,
    generation: ApiGeneration,
    postcode_param: String,
    token_header: HeaderName,
    parser: DateParser,
    clock: Arc<dyn Clock>,
}

impl ScheduleFetcher {
    pub fn new(
        client: Client,
        discoverer: Arc<dyn EndpointDiscoverer>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let fetcher = &config.fetcher;
        let token_header = HeaderName::from_bytes(fetcher.token_header.as_bytes()).map_err(
            |source| ConfigError::HeaderName {
                name: fetcher.token_header.clone(),
                source,
            },
        )?;
        let parser = match fetcher.generation {
            ApiGeneration::NextDeliveryDays => {
                DateParser::localized().map_err(|source| ConfigError::Pattern {
                    key: "localized date".to_string(),
                    source,
                })?
            }
            ApiGeneration::DeliveryDates => DateParser::iso(),
        };
        Ok(ScheduleFetcher {
            client,
            discoverer,
            generation: fetcher.generation,
            postcode_param: fetcher.postcode_param.clone(),
            token_header,
            parser,
            clock,
        })
    }

    /// Build the fetcher and a page discoverer sharing one HTTP client.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let client = Client::builder().build().map_err(ConfigError::Client)?;
        let discoverer = PageDiscoverer::from_config(client.clone(), &config.discovery)?;
        ScheduleFetcher::new(client, Arc::new(discoverer), config, clock)
    }

    /// Get the delivery days of a postal code.
    ///
    /// The endpoint is discovered again on every call. The whole lookup is abandoned once
    /// `timeout` has passed.
    pub async fn get_schedule(
        &self,
        postal_code: &PostalCode,
        timeout: Duration,
    ) -> Result<DateSequence, FetchError> {
        tokio::time::timeout(timeout, self.fetch(postal_code))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn fetch(&self, postal_code: &PostalCode) -> Result<DateSequence, FetchError> {
        let endpoint = self.discoverer.discover().await?;
        let payload = self.fetch_payload(&endpoint, postal_code).await?;
        let dates = self.parser.parse_all(payload.dates(), self.clock.today())?;
        debug!(%postal_code, dates = dates.len(), "fetched schedule");
        Ok(dates)
    }

    async fn fetch_payload(
        &self,
        endpoint: &EndpointDescriptor,
        postal_code: &PostalCode,
    ) -> Result<RawSchedulePayload, FetchError> {
        let mut request = self
            .client
            .get(endpoint.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header("x-requested-with", "XMLHttpRequest")
            .query(&[(self.postcode_param.as_str(), postal_code.as_str())]);
        if let Some(token) = &endpoint.token {
            request = request.header(self.token_header.clone(), token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamError { status });
        }
        let body = response.bytes().await?;
        RawSchedulePayload::decode(self.generation, &body).map_err(FetchError::DecodeError)
    }
}

#[async_trait]
impl ScheduleSource for ScheduleFetcher {
    async fn schedule(
        &self,
        postal_code: &PostalCode,
        timeout: Duration,
    ) -> Result<DateSequence, FetchError> {
        self.get_schedule(postal_code, timeout).await
    }
}
