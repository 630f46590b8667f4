use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, InterruptHandle};

use crate::date_util::DAY_KEY_FORMAT;
use crate::error::{Error, Result};
use crate::provider::DatasetProvider;
use crate::query::builder::{count_sql, grouped_count_sql, EntityType, MetricFilter};
use crate::query::period::DateRange;
use crate::storage::Database;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const ABANDONED: u8 = 3;

/// Dropped with the read future. If the read was given up before it
/// finished, a queued read is skipped and a running one is interrupted,
/// so later reads do not wait behind it.
struct AbandonGuard {
    state: Arc<AtomicU8>,
    interrupt: Arc<InterruptHandle>,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.state.swap(ABANDONED, Ordering::SeqCst) {
            RUNNING => {
                log::debug!("Interrupting abandoned dataset read");
                self.interrupt.interrupt();
            }
            QUEUED => log::debug!("Skipping abandoned dataset read"),
            _ => {}
        }
    }
}

/// [`DatasetProvider`] over the local warehouse, reading through the
/// database's reader connection.
#[derive(Clone)]
pub struct SqliteDataset {
    db: Database,
}

impl SqliteDataset {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run `f` on the reader. Dropping the returned future before it
    /// completes cancels the statement instead of leaving it to run.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(QUEUED));
        let mut guard = AbandonGuard {
            state: Arc::clone(&state),
            interrupt: Arc::clone(self.db.reader_interrupt()),
            armed: true,
        };
        let outcome = self
            .db
            .reader()
            .call(move |conn| {
                if state
                    .compare_exchange(QUEUED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return Ok(None);
                }
                let result = f(&*conn);
                state.store(FINISHED, Ordering::SeqCst);
                result.map(Some)
            })
            .await;
        guard.armed = false;
        outcome?.ok_or_else(|| Error::Database("read abandoned before it started".into()))
    }
}

#[async_trait]
impl DatasetProvider for SqliteDataset {
    async fn count(
        &self,
        entity: EntityType,
        filter: &MetricFilter,
        range: &DateRange,
    ) -> Result<u64> {
        let (sql, params) = count_sql(entity, filter, range)?;
        log::trace!("count {entity}: {sql} {params:?}");

        let count: i64 = self
            .read(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                stmt.query_row(rusqlite::params_from_iter(params.iter()), |row| row.get(0))
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_grouped_by_day(
        &self,
        entity: EntityType,
        filter: &MetricFilter,
        range: &DateRange,
    ) -> Result<Vec<(NaiveDate, u64)>> {
        let (sql, params) = grouped_count_sql(entity, filter, range)?;
        log::trace!("grouped count {entity}: {sql} {params:?}");

        let rows: Vec<(String, i64)> = self
            .read(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(key, count)| {
                let day = NaiveDate::parse_from_str(&key, DAY_KEY_FORMAT)
                    .map_err(|e| Error::Database(format!("bad date key '{key}': {e}")))?;
                Ok((day, count.max(0) as u64))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::query::builder::{MetricQuery, Scope, UserRole};
    use crate::storage::repository::{insert_application, insert_job, insert_user};
    use crate::storage::repository::{ApplicationRecord, JobRecord, UserRecord};

    fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        )
        .unwrap()
    }

    async fn seeded() -> SqliteDataset {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let jobs = [
                    ("j1", "acme", "published", at(2024, 1, 1, 0)),
                    ("j2", "acme", "published", at(2024, 1, 31, 23)),
                    ("j3", "acme", "draft", at(2024, 1, 15, 9)),
                    ("j4", "globex", "published", at(2024, 1, 15, 9)),
                    ("j5", "acme", "published", at(2024, 2, 1, 0)),
                ];
                for (id, company, status, created_at) in jobs {
                    insert_job(
                        conn,
                        &JobRecord {
                            id: id.into(),
                            company_id: company.into(),
                            status: status.into(),
                            created_at,
                        },
                    )?;
                }
                insert_application(
                    conn,
                    &ApplicationRecord {
                        id: "a1".into(),
                        job_id: "j1".into(),
                        company_id: "acme".into(),
                        candidate_id: "u1".into(),
                        status: "hired".into(),
                        created_at: at(2024, 1, 3, 12),
                    },
                )?;
                insert_user(
                    conn,
                    &UserRecord {
                        id: "u1".into(),
                        role: UserRole::JobSeeker,
                        status: "active".into(),
                        created_at: at(2024, 1, 2, 8),
                    },
                )?;
                insert_user(
                    conn,
                    &UserRecord {
                        id: "u2".into(),
                        role: UserRole::Employer,
                        status: "active".into(),
                        created_at: at(2024, 1, 2, 9),
                    },
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        SqliteDataset::new(db)
    }

    #[tokio::test]
    async fn test_count_respects_range_bounds() {
        let ds = seeded().await;
        let q = MetricQuery::builder(EntityType::Job, Scope::Company("acme".into()))
            .status("published")
            .build(range((2024, 1, 1), (2024, 1, 31)))
            .unwrap();
        // j1 at midnight on the first day and j2 late on the last day both count
        let n = ds.count(q.entity(), q.filter(), q.range()).await.unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn test_count_scoped_by_company() {
        let ds = seeded().await;
        let jan = range((2024, 1, 1), (2024, 1, 31));
        let acme = MetricQuery::builder(EntityType::Job, Scope::Company("acme".into()))
            .build(jan)
            .unwrap();
        let globex = MetricQuery::builder(EntityType::Job, Scope::Company("globex".into()))
            .build(jan)
            .unwrap();
        let all = MetricQuery::builder(EntityType::Job, Scope::Global)
            .build(jan)
            .unwrap();
        assert_eq!(ds.count(acme.entity(), acme.filter(), acme.range()).await.unwrap(), 3);
        assert_eq!(ds.count(globex.entity(), globex.filter(), globex.range()).await.unwrap(), 1);
        assert_eq!(ds.count(all.entity(), all.filter(), all.range()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_count_users_by_role() {
        let ds = seeded().await;
        let q = MetricQuery::builder(EntityType::User, Scope::Global)
            .role(UserRole::Employer)
            .build(range((2024, 1, 1), (2024, 1, 31)))
            .unwrap();
        assert_eq!(ds.count(q.entity(), q.filter(), q.range()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_grouped_counts() {
        let ds = seeded().await;
        let q = MetricQuery::builder(EntityType::Job, Scope::Global)
            .build(range((2024, 1, 1), (2024, 1, 31)))
            .unwrap();
        let rows = ds
            .count_grouped_by_day(q.entity(), q.filter(), q.range())
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![
                (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 1),
                (NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 2),
                (NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(), 1),
            ]
        );
    }

    const SLOW_SQL: &str = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 2000000000) SELECT COUNT(*) FROM n";

    #[tokio::test]
    async fn test_abandoned_read_does_not_block_next_read() {
        let dir = tempfile::tempdir().unwrap();
        let ds = SqliteDataset::new(Database::open_at(dir.path().join("slow.db")).await.unwrap());

        let slow = ds.read(|conn| conn.query_row(SLOW_SQL, [], |row| row.get::<_, i64>(0)));
        assert!(tokio::time::timeout(Duration::from_millis(50), slow).await.is_err());

        let q = MetricQuery::builder(EntityType::Job, Scope::Global)
            .build(range((2024, 1, 1), (2024, 1, 31)))
            .unwrap();
        let started = std::time::Instant::now();
        let next = tokio::time::timeout(
            Duration::from_secs(2),
            ds.count(q.entity(), q.filter(), q.range()),
        )
        .await
        .expect("follow-up read waited behind the abandoned one");
        assert_eq!(next.unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_completed_read_is_not_interrupted() {
        let ds = seeded().await;
        let n: i64 = ds
            .read(|conn| conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(n, 5);
        let q = MetricQuery::builder(EntityType::Job, Scope::Global)
            .build(range((2024, 1, 1), (2024, 2, 1)))
            .unwrap();
        assert_eq!(ds.count(q.entity(), q.filter(), q.range()).await.unwrap(), 5);
    }
}
