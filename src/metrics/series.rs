//! Day-granularity chart series.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::try_join_all;

use crate::config::BucketStrategy;
use crate::date_util::day_key;
use crate::error::Result;
use crate::metrics::{bounded, count_query, describe, ChartPoint};
use crate::provider::DatasetProvider;
use crate::query::builder::MetricQuery;
use crate::query::period::DateRange;

/// One point per calendar day of `range`, zero-filled.
///
/// `template` supplies the entity and filter; its own range is ignored.
pub async fn bucketize(
    provider: &dyn DatasetProvider,
    template: &MetricQuery,
    range: &DateRange,
    strategy: BucketStrategy,
    query_timeout: Duration,
) -> Result<Vec<ChartPoint>> {
    let query = template.with_range(*range);
    let counts = match strategy {
        BucketStrategy::Grouped => {
            bounded(
                query_timeout,
                || describe(&query),
                provider.count_grouped_by_day(query.entity(), query.filter(), query.range()),
            )
            .await?
        }
        BucketStrategy::PerDay => per_day_counts(provider, &query, query_timeout).await?,
    };
    log::debug!(
        "Bucketized {} over {} days ({strategy})",
        describe(&query),
        range.day_count()
    );
    Ok(zero_fill(range, counts))
}

async fn per_day_counts(
    provider: &dyn DatasetProvider,
    query: &MetricQuery,
    query_timeout: Duration,
) -> Result<Vec<(NaiveDate, u64)>> {
    let day_queries = query
        .range()
        .days()
        .map(|day| -> Result<(NaiveDate, MetricQuery)> {
            Ok((day, query.with_range(DateRange::day(day)?)))
        })
        .collect::<Result<Vec<_>>>()?;

    try_join_all(day_queries.iter().map(|(day, q)| async move {
        let count = count_query(provider, q, query_timeout).await?;
        Ok::<_, crate::error::Error>((*day, count))
    }))
    .await
}

/// Spread grouped rows over every day of `range`. Rows outside the range
/// are dropped and repeated days are summed.
pub fn zero_fill(
    range: &DateRange,
    counts: impl IntoIterator<Item = (NaiveDate, u64)>,
) -> Vec<ChartPoint> {
    let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for (day, count) in counts {
        if range.contains(day) {
            *by_day.entry(day).or_default() += count;
        }
    }
    range
        .days()
        .map(|day| ChartPoint {
            date: day_key(day),
            count: by_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}
