use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::date_util::day_key;
use crate::query::builder::{EntityType, UserRole};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

// ── Records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub company_id: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: String,
    pub job_id: String,
    pub company_id: String,
    pub candidate_id: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub role: UserRole,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: String,
    pub candidate_id: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

/// A dump of platform records, as produced by the owning subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub jobs: Vec<JobRecord>,
    pub applications: Vec<ApplicationRecord>,
    pub users: Vec<UserRecord>,
    pub certificates: Vec<CertificateRecord>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.jobs.len() + self.applications.len() + self.users.len() + self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Inserts ────────────────────────────────────────────────────────

pub fn insert_job(conn: &Connection, job: &JobRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO jobs (job_id, company_id, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            job.id,
            job.company_id,
            job.status,
            timestamp(&job.created_at),
            day_key(job.created_at.date()),
        ],
    )?;
    Ok(())
}

pub fn insert_application(
    conn: &Connection,
    app: &ApplicationRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO applications
            (application_id, job_id, company_id, candidate_id, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            app.id,
            app.job_id,
            app.company_id,
            app.candidate_id,
            app.status,
            timestamp(&app.created_at),
            day_key(app.created_at.date()),
        ],
    )?;
    Ok(())
}

pub fn insert_user(conn: &Connection, user: &UserRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO users (user_id, role, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.role.as_str(),
            user.status,
            timestamp(&user.created_at),
            day_key(user.created_at.date()),
        ],
    )?;
    Ok(())
}

pub fn insert_certificate(
    conn: &Connection,
    cert: &CertificateRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO certificates
            (certificate_id, candidate_id, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            cert.id,
            cert.candidate_id,
            cert.status,
            timestamp(&cert.created_at),
            day_key(cert.created_at.date()),
        ],
    )?;
    Ok(())
}

/// Load a snapshot in one transaction; either every record lands or none.
pub fn import_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<usize, rusqlite::Error> {
    let tx = conn.transaction()?;
    for job in &snapshot.jobs {
        insert_job(&tx, job)?;
    }
    for app in &snapshot.applications {
        insert_application(&tx, app)?;
    }
    for user in &snapshot.users {
        insert_user(&tx, user)?;
    }
    for cert in &snapshot.certificates {
        insert_certificate(&tx, cert)?;
    }
    tx.commit()?;
    Ok(snapshot.len())
}

// ── Status ─────────────────────────────────────────────────────────

/// Row count per record table.
pub fn table_counts(conn: &Connection) -> Result<Vec<(EntityType, u64)>, rusqlite::Error> {
    let mut counts = Vec::new();
    for entity in [
        EntityType::Job,
        EntityType::Application,
        EntityType::User,
        EntityType::Certificate,
    ] {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        counts.push((entity, n as u64));
    }
    Ok(counts)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_derives_date_key() {
        let db = Database::open_memory().await.unwrap();
        let (created_at, key): (String, String) = db
            .writer()
            .call(|conn| {
                insert_job(
                    conn,
                    &JobRecord {
                        id: "j1".into(),
                        company_id: "acme".into(),
                        status: "published".into(),
                        created_at: at(2024, 1, 5),
                    },
                )?;
                conn.query_row(
                    "SELECT created_at, created_date_key FROM jobs WHERE job_id = 'j1'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await
            .unwrap();
        assert_eq!(created_at, "2024-01-05 10:30:00.000");
        assert_eq!(key, "2024-01-05");
    }

    #[tokio::test]
    async fn test_import_snapshot_and_counts() {
        let db = Database::open_memory().await.unwrap();
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "jobs": [
                    {"id": "j1", "company_id": "acme", "status": "published", "created_at": "2024-01-05T09:00:00"}
                ],
                "applications": [
                    {"id": "a1", "job_id": "j1", "company_id": "acme", "candidate_id": "u1",
                     "status": "pending", "created_at": "2024-01-06T09:00:00"}
                ],
                "users": [
                    {"id": "u1", "role": "job_seeker", "status": "active", "created_at": "2024-01-01T09:00:00"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(snapshot.len(), 3);

        let (imported, counts) = db
            .writer()
            .call(move |conn| {
                let n = import_snapshot(conn, &snapshot)?;
                Ok::<_, rusqlite::Error>((n, table_counts(conn)?))
            })
            .await
            .unwrap();
        assert_eq!(imported, 3);
        assert_eq!(
            counts,
            vec![
                (EntityType::Job, 1),
                (EntityType::Application, 1),
                (EntityType::User, 1),
                (EntityType::Certificate, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let db = Database::open_memory().await.unwrap();
        let (missing, value, all) = db
            .writer()
            .call(|conn| {
                let missing = get_config(conn, "bucket_strategy")?;
                set_config(conn, "bucket_strategy", "grouped")?;
                set_config(conn, "bucket_strategy", "per_day")?;
                set_config(conn, "aggregate_timeout_ms", "5000")?;
                let value = get_config(conn, "bucket_strategy")?;
                Ok::<_, rusqlite::Error>((missing, value, list_config(conn)?))
            })
            .await
            .unwrap();
        assert_eq!(missing, None);
        assert_eq!(value.as_deref(), Some("per_day"));
        assert_eq!(
            all,
            vec![
                ("aggregate_timeout_ms".to_string(), "5000".to_string()),
                ("bucket_strategy".to_string(), "per_day".to_string()),
            ]
        );
    }
}
