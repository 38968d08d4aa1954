use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::entsoe::GenerationSource;
use crate::entsoe::areas::Area;

/// Result of looking for the most recent published sample of an area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available(DateTime<Utc>),
    Unavailable,
}

/// Time range of one analysis run, `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalysisWindow {
    /// `window_days` before the latest sample up to one hour after it
    pub fn ending_at(latest: DateTime<Utc>, window_days: i64) -> Self {
        Self {
            start: latest - Duration::days(window_days),
            end: latest + Duration::hours(1),
        }
    }
}

/// Find the timestamp of the last sample published in the `lookback_days` before `now`.
///
/// Query failures are logged and reported as [`Availability::Unavailable`].
pub async fn latest_available<S: GenerationSource>(
    source: &S,
    area: &Area,
    now: DateTime<Utc>,
    lookback_days: i64,
) -> Availability {
    let start = now - Duration::days(lookback_days);

    match source.query_generation(area, start, now).await {
        Ok(series) => series
            .last_timestamp()
            .map_or(Availability::Unavailable, Availability::Available),
        Err(e) => {
            warn!("Error finding latest data for {}: {}", area.key, e);
            Availability::Unavailable
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entsoe::EntsoeError;
    use crate::entsoe::areas::lookup;
    use crate::generation::series::{GenerationSeries, TimeTable};
    use chrono::TimeZone;
    use std::cell::RefCell;

    /// Canned responses in place of the HTTP API, recording every query
    pub(crate) struct StubSource {
        responses: RefCell<Vec<Result<GenerationSeries, EntsoeError>>>,
        pub(crate) queries: RefCell<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl StubSource {
        /// Responses are handed out in order
        pub(crate) fn new(responses: Vec<Result<GenerationSeries, EntsoeError>>) -> Self {
            Self {
                responses: RefCell::new(responses),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl GenerationSource for StubSource {
        async fn query_generation(
            &self,
            area: &Area,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<GenerationSeries, EntsoeError> {
            self.queries
                .borrow_mut()
                .push((area.key.to_string(), start, end));
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                return Err(EntsoeError::NoMatchingData);
            }
            responses.remove(0)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_empty_window_is_unavailable() {
        let source = StubSource::new(vec![Ok(TimeTable::default())]);
        let area = lookup("FR").unwrap();

        assert_eq!(
            latest_available(&source, area, now(), 30).await,
            Availability::Unavailable
        );

        let queries = source.queries.borrow();
        assert_eq!(queries[0].1, now() - Duration::days(30));
        assert_eq!(queries[0].2, now());
    }

    #[tokio::test]
    async fn test_query_failure_is_unavailable() {
        let source = StubSource::new(vec![Err(EntsoeError::InvalidResponse(
            "HTTP 503 Service Unavailable".to_string(),
        ))]);
        let area = lookup("ES").unwrap();

        assert_eq!(
            latest_available(&source, area, now(), 30).await,
            Availability::Unavailable
        );
    }

    #[tokio::test]
    async fn test_returns_last_sample() {
        let first = Utc.with_ymd_and_hms(2024, 3, 18, 22, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 3, 18, 23, 0, 0).unwrap();
        let mut series = TimeTable::new(vec![first, last]).unwrap();
        series.push_column("Nuclear", vec![1.0, 2.0]).unwrap();
        let source = StubSource::new(vec![Ok(series)]);

        assert_eq!(
            latest_available(&source, lookup("IT").unwrap(), now(), 30).await,
            Availability::Available(last)
        );
    }

    #[test]
    fn test_window_ending_at() {
        let latest = Utc.with_ymd_and_hms(2024, 3, 18, 23, 0, 0).unwrap();
        let window = AnalysisWindow::ending_at(latest, 10);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 8, 23, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 3, 19, 0, 0, 0).unwrap());
    }
}
