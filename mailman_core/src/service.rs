//! Cache-aside coordination of fetching, building and caching calendars.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    cache::ExpiringCache,
    calendar_builder::{CalendarArtifact, CalendarBuilder},
    clock::{next_local_midnight, Clock},
    error::ServiceError,
    postal_code::PostalCode,
    schedule_fetcher::ScheduleSource,
};

pub type CalendarCache = ExpiringCache<PostalCode, CalendarArtifact>;

/// Serves calendars from the cache and rebuilds them on a miss.
///
/// Concurrent misses for the same postal code are not coalesced: each of them fetches and builds
/// on its own, and the last one to finish stays in the cache.
#[derive(Debug)]
pub struct CalendarService {
    source: Arc<dyn ScheduleSource>,
    builder: CalendarBuilder,
    cache: Arc<CalendarCache>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl CalendarService {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        builder: CalendarBuilder,
        cache: Arc<CalendarCache>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        CalendarService {
            source,
            builder,
            cache,
            clock,
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<CalendarCache> {
        &self.cache
    }

    /// Get the calendar of a postal code given as raw text.
    ///
    /// Invalid postal codes are rejected before the cache is consulted. Failures are not cached.
    pub async fn calendar(&self, postal_code: &str) -> Result<Arc<CalendarArtifact>, ServiceError> {
        let postal_code: PostalCode = postal_code.parse()?;
        if let Some(artifact) = self.cache.get(&postal_code) {
            info!(subsystem = "cache", item = %postal_code, "hit");
            return Ok(artifact);
        }
        let dates = self
            .source
            .schedule(&postal_code, self.timeout)
            .await
            .map_err(|err| {
                warn!(%postal_code, error = %err, timeout = err.is_timeout(), "error fetching schedule");
                err
            })?;
        let artifact = Arc::new(self.builder.build(&dates));
        let now = self.clock.now();
        let expires_at = next_local_midnight(&now);
        debug!(
            subsystem = "cache",
            %postal_code,
            ttl = %humantime::format_duration((expires_at - now).to_std().unwrap_or_default()),
            "ttl"
        );
        self.cache.set(
            postal_code,
            Arc::clone(&artifact),
            expires_at.with_timezone(&Utc),
        );
        Ok(artifact)
    }
}
