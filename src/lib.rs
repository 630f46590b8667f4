pub mod config;
pub mod date_util;
pub mod error;
pub mod insights;
pub mod metrics;
pub mod provider;
pub mod query;
pub mod storage;

pub use config::{BucketStrategy, InsightConfig};
pub use error::{Error, Result};
pub use insights::{InsightPayload, InsightRequest, InsightRole};
pub use metrics::{ChartPoint, MetricChange};
pub use provider::{DatasetProvider, SqliteDataset};
pub use query::builder::EntityType;
pub use query::period::{ComparisonMode, DateRange, RequestedRange, ResolvedPeriod};
pub use storage::repository::Snapshot;
pub use storage::Database;

use std::path::Path;

use chrono::NaiveDate;

use storage::repository;

/// Main entry point for the insights engine over a local dataset.
pub struct HireInsights {
    dataset: SqliteDataset,
}

impl HireInsights {
    pub fn new(db: Database) -> Self {
        Self {
            dataset: SqliteDataset::new(db),
        }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        self.dataset.db()
    }

    // ── Insights ───────────────────────────────────────────────────

    /// Dashboard payload for `role`. Tuning is read from `app_config` on
    /// every call so `config set` takes effect without a restart.
    pub async fn insights(
        &self,
        role: &InsightRole,
        request: &InsightRequest,
        today: NaiveDate,
    ) -> Result<InsightPayload> {
        let config = InsightConfig::load(self.db()).await.map_err(|e| {
            log::error!("Loading insight config failed: {e}");
            Error::UpstreamUnavailable
        })?;
        insights::insights_for(&self.dataset, &config, role, request, today).await
    }

    // ── Import ─────────────────────────────────────────────────────

    pub async fn import(&self, snapshot: Snapshot) -> Result<usize> {
        let n = self
            .db()
            .writer()
            .call(move |conn| repository::import_snapshot(conn, &snapshot))
            .await?;
        log::info!("Imported {n} records");
        Ok(n)
    }

    /// Import a JSON snapshot file.
    pub async fn import_file(&self, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Import(format!("cannot read {}: {e}", path.display())))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|e| Error::Import(format!("{}: {e}", path.display())))?;
        if snapshot.is_empty() {
            log::warn!("{} contains no records", path.display());
        }
        self.import(snapshot).await
    }

    // ── Status ─────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<Vec<(EntityType, u64)>> {
        let counts = self
            .db()
            .reader()
            .call(|conn| repository::table_counts(conn))
            .await?;
        Ok(counts)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db()
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await?;
        Ok(value)
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        config::validate_entry(key, value)?;
        self.db()
            .writer()
            .call({
                let key = key.to_string();
                let value = value.trim().to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        let entries = self
            .db()
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        Ok(entries)
    }
}
