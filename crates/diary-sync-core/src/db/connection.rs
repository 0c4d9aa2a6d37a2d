//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Database wrapper for the local libSQL file that holds sync state
pub struct Database {
    // Keeps the database handle alive for the lifetime of the connection.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open the sync state file at `path`, creating and migrating it as needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Builder::new_local(path).build().await?;
        let database = Self::connect(db).await?;
        tracing::debug!("Opened sync state database at {}", path.display());
        Ok(database)
    }

    /// Open a throwaway in-memory database
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::connect(db).await
    }

    async fn connect(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        // Small documents rewritten on every store mutation. In-memory
        // databases reject WAL, which is harmless.
        for pragma in [
            "PRAGMA journal_mode = WAL;",
            "PRAGMA synchronous = NORMAL;",
            "PRAGMA busy_timeout = 5000;",
        ] {
            if let Err(error) = conn.execute(pragma, ()).await {
                tracing::debug!("Ignoring failed {}: {}", pragma, error);
            }
        }
        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
