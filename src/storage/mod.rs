pub mod repository;

use std::sync::Arc;

use rusqlite::InterruptHandle;
use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode. Insight reads go through the reader and never wait on an
/// import running on the writer.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
    reader_interrupt: Arc<InterruptHandle>,
}

impl Database {
    /// Open the database at the default path (`~/.hireinsights/hireinsights.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".hireinsights");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("hireinsights.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening warehouse at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;
        let reader_interrupt = Self::interrupt_handle(&reader).await?;

        Ok(Self {
            writer,
            reader,
            reader_interrupt,
        })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        let reader_interrupt = Self::interrupt_handle(&writer).await?;
        Ok(Self {
            reader: writer.clone(),
            writer,
            reader_interrupt,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            let migrations = Migrations::new(vec![M::up(include_str!(
                "migrations/001_initial.sql"
            ))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA query_only=ON;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    async fn interrupt_handle(conn: &tokio_rusqlite::Connection) -> Result<Arc<InterruptHandle>> {
        let handle = conn
            .call(|conn| Ok::<_, rusqlite::Error>(conn.get_interrupt_handle()))
            .await?;
        Ok(Arc::new(handle))
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    /// Handle that aborts whatever statement the reader is executing.
    pub fn reader_interrupt(&self) -> &Arc<InterruptHandle> {
        &self.reader_interrupt
    }
}
