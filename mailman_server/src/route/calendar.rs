use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use mailman_core::{error::ServiceError, service::CalendarService};
use tracing::error;

/// Handle calendar requests.
///
/// The postal code is the whole path, e.g. `/0150`. Any failure to get the schedule from the
/// carrier is answered with a gateway timeout.
pub async fn handler(
    State(service): State<Arc<CalendarService>>,
    Path(postal_code): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let calendar = service
        .calendar(&postal_code)
        .await
        .map_err(|err| match err {
            ServiceError::InvalidPostalCode(_) => {
                (StatusCode::BAD_REQUEST, String::from("invalid postcode"))
            }
            ServiceError::Fetch(err) => {
                error!(%postal_code, error = %err, "error fetching schedule");
                let message = if err.is_timeout() {
                    "operation timed out while fetching schedule"
                } else {
                    "could not fetch schedule from the carrier"
                };
                (StatusCode::GATEWAY_TIMEOUT, String::from(message))
            }
        })?;
    let response = (
        [
            (CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=calendar.ics"),
        ],
        calendar.to_ics(),
    )
        .into_response();
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        Router,
    };
    use chrono::{Local, NaiveDate, TimeZone};
    use mailman_core::{
        calendar_builder::CalendarBuilder,
        clock::ManualClock,
        config::CalendarConfig,
        date_sequence::DateSequence,
        error::{DiscoveryError, FetchError},
        postal_code::PostalCode,
        schedule_fetcher::ScheduleSource,
        service::CalendarCache,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::route::router;

    #[derive(Debug)]
    struct StubSource {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<DateSequence, FetchError>>>,
    }

    #[async_trait]
    impl ScheduleSource for StubSource {
        async fn schedule(
            &self,
            _postal_code: &PostalCode,
            _timeout: Duration,
        ) -> Result<DateSequence, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn app(responses: Vec<Result<DateSequence, FetchError>>) -> (Arc<StubSource>, Router) {
        let source = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(responses),
        });
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap(),
        ));
        let builder = CalendarBuilder::new(
            CalendarConfig {
                product_id: "-//github.com//kluzzebass//mailman-matt//EN".to_string(),
                name: "Matt".to_string(),
                timezone: "Europe/Oslo".to_string(),
                summary: "POST".to_string(),
            },
            clock.clone(),
        );
        let cache = Arc::new(CalendarCache::new(None, clock.clone()));
        let service = CalendarService::new(
            source.clone(),
            builder,
            cache,
            clock,
            Duration::from_secs(5),
        );
        (source, router(Arc::new(service)))
    }

    fn schedule() -> DateSequence {
        [
            NaiveDate::from_ymd_opt(2025, 9, 4).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
        ]
        .into_iter()
        .collect()
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|value| value.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_calendar() {
        let (source, app) = app(vec![Ok(schedule())]);
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/0150").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/calendar; charset=utf-8"
        );
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=calendar.ics"
        );
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(body.matches("BEGIN:VEVENT").count(), 2);
        assert!(body.contains("SUMMARY:POST"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_calendar_is_byte_identical() {
        let (source, app) = app(vec![Ok(schedule())]);
        let (_, _, first) = get(&app, "/0150").await;
        let (status, _, second) = get(&app, "/0150").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_postal_code() {
        let (source, app) = app(vec![]);
        for uri in ["/150", "/01500", "/abcd", "/01%2050"] {
            let (status, _, body) = get(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body, "invalid postcode");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_marker_not_found_is_gateway_timeout() {
        let (_, app) = app(vec![Err(FetchError::DiscoveryFailed(
            DiscoveryError::MarkerNotFound {
                marker: "div#mailbox-delivery-date[data-component-url]".to_string(),
            },
        ))]);
        let (status, content_type, body) = get(&app, "/0150").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_ne!(content_type.as_deref(), Some("text/calendar; charset=utf-8"));
        assert_eq!(body, "could not fetch schedule from the carrier");
    }

    #[tokio::test]
    async fn test_timeout_is_gateway_timeout() {
        let (_, app) = app(vec![Err(FetchError::Timeout)]);
        let (status, _, body) = get(&app, "/0150").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body, "operation timed out while fetching schedule");
    }

    #[tokio::test]
    async fn test_health() {
        let (source, app) = app(vec![]);
        let (status, _, body) = get(&app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
