pub mod series;
pub mod types;

pub use types::*;

use std::future::Future;
use std::time::Duration;

use futures::future::try_join_all;

use crate::error::{Error, Result};
use crate::provider::DatasetProvider;
use crate::query::builder::MetricQuery;

/// Percentage change from `previous` to `current`.
///
/// A zero baseline yields 0 when nothing happened in either window and the
/// fixed value 100 when something happened only in the current one.
pub fn percent_change(current: u64, previous: u64) -> f64 {
    match (current, previous) {
        (0, 0) => 0.0,
        (_, 0) => 100.0,
        (c, p) => (c as f64 - p as f64) / p as f64 * 100.0,
    }
}

/// Run every query against the provider concurrently.
///
/// Results come back in query order. The first failure drops the queries
/// still in flight and fails the whole call.
pub async fn collect(
    provider: &dyn DatasetProvider,
    queries: &[MetricQuery],
    query_timeout: Duration,
) -> Result<Vec<MetricResult>> {
    let counts = try_join_all(
        queries
            .iter()
            .map(|q| count_query(provider, q, query_timeout)),
    )
    .await?;
    Ok(counts.into_iter().map(|count| MetricResult { count }).collect())
}

/// Count a single query, bounded by `query_timeout`.
pub async fn count_query(
    provider: &dyn DatasetProvider,
    query: &MetricQuery,
    query_timeout: Duration,
) -> Result<u64> {
    bounded(
        query_timeout,
        || describe(query),
        provider.count(query.entity(), query.filter(), query.range()),
    )
    .await
}

pub(crate) fn describe(query: &MetricQuery) -> String {
    format!(
        "{} [{}] {}",
        query.entity(),
        query.filter().scope(),
        query.range()
    )
}

/// Apply the per-read time limit and collapse dataset failures into
/// [`Error::UpstreamUnavailable`], logging the underlying cause.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    what: impl FnOnce() -> String,
    read: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_client_error() => Err(e),
        Ok(Err(e)) => {
            log::error!("Dataset read failed for {}: {e}", what());
            Err(Error::UpstreamUnavailable)
        }
        Err(_) => {
            log::error!("Dataset read for {} timed out after {limit:?}", what());
            Err(Error::UpstreamUnavailable)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubProvider;
    use super::*;
    use crate::query::builder::{EntityType, Scope};
    use crate::query::period::DateRange;
    use chrono::NaiveDate;

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_percent_change_zero_baseline() {
        assert_eq!(percent_change(0, 0), 0.0);
        assert_eq!(percent_change(5, 0), 100.0);
        assert_eq!(percent_change(1000, 0), 100.0);
    }

    #[test]
    fn test_percent_change_regular() {
        assert_eq!(percent_change(10, 5), 100.0);
        assert_eq!(percent_change(5, 10), -50.0);
        assert_eq!(percent_change(10, 4), 150.0);
        assert_eq!(percent_change(0, 8), -100.0);
        assert_eq!(percent_change(7, 7), 0.0);
    }

    #[test]
    fn test_percent_change_is_finite() {
        for (c, p) in [(0, 0), (1, 0), (0, 1), (u64::MAX, 1), (1, u64::MAX)] {
            assert!(percent_change(c, p).is_finite(), "({c}, {p})");
        }
    }

    #[test]
    fn test_metric_change_new() {
        let m = MetricChange::new(10, 4);
        assert_eq!(m.current, 10);
        assert_eq!(m.previous, 4);
        assert_eq!(m.percent, 150.0);
    }

    #[tokio::test]
    async fn test_collect_in_order() {
        let provider = StubProvider::answering(3);
        let queries = vec![
            MetricQuery::builder(EntityType::Job, Scope::Global).build(january()).unwrap(),
            MetricQuery::builder(EntityType::User, Scope::Global).build(january()).unwrap(),
        ];
        let results = collect(&provider, &queries, Duration::from_secs(1)).await.unwrap();
        assert_eq!(results, vec![MetricResult { count: 3 }, MetricResult { count: 3 }]);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_collect_hides_failure_cause() {
        let provider = StubProvider::failing();
        let queries =
            vec![MetricQuery::builder(EntityType::Job, Scope::Global).build(january()).unwrap()];
        let err = collect(&provider, &queries, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable));
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_count_query_times_out() {
        let provider = StubProvider::stalling(Duration::from_secs(5));
        let q = MetricQuery::builder(EntityType::Job, Scope::Global).build(january()).unwrap();
        let started = std::time::Instant::now();
        let err = count_query(&provider, &q, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
