//! The dataset the insights engine reads from.

pub mod sqlite;

pub use sqlite::SqliteDataset;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::query::builder::{EntityType, MetricFilter};
use crate::query::period::DateRange;

/// Read-only count access to the records owned by the rest of the platform.
///
/// Implementations must apply every predicate in `filter`, including the
/// tenant scope, inside the read itself.
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    async fn count(
        &self,
        entity: EntityType,
        filter: &MetricFilter,
        range: &DateRange,
    ) -> Result<u64>;

    /// Per-day counts over `range`. Days without matches may be omitted.
    async fn count_grouped_by_day(
        &self,
        entity: EntityType,
        filter: &MetricFilter,
        range: &DateRange,
    ) -> Result<Vec<(NaiveDate, u64)>>;
}
