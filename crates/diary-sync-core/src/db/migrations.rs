//! Versioned schema for the sync state database

use crate::error::Result;
use libsql::Connection;

/// Schema steps, applied in order; each runs in its own transaction
const MIGRATIONS: &[(i32, &[&str])] = &[(
    1,
    &[
        // One JSON document per store: config, queue, conflicts, history, device
        "CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    ],
)];

/// Latest schema version
pub const CURRENT_VERSION: i32 = 1;

/// Bring the schema up to `CURRENT_VERSION`
pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let applied = schema_version(conn).await?;
    for &(version, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        apply(conn, version, statements).await?;
        tracing::info!("Migrated sync state database to version {}", version);
    }
    Ok(())
}

/// Highest applied version, 0 for a fresh database
async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql has no execute_batch; statements run one by one inside a transaction
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for statement in statements {
        if let Err(e) = conn.execute(statement, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    let recorded = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await;
    if let Err(e) = recorded {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }
    Ok(())
}
