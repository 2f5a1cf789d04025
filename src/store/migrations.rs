//! Version-tracked database migrations for the libSQL backend.
//!
//! `run_migrations()` reads the highest applied version from `_migrations`
//! and applies only newer entries, in order.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "profiles",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                full_name TEXT,
                user_type TEXT,
                onboarding_step INTEGER NOT NULL DEFAULT 0,
                onboarding_completed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS role_profiles (
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                onboarding_step INTEGER NOT NULL DEFAULT 0,
                onboarding_completed INTEGER NOT NULL DEFAULT 0,
                verification TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, role)
            );
            CREATE INDEX IF NOT EXISTS idx_role_profiles_user ON role_profiles(user_id);
        "#,
    },
    Migration {
        version: 2,
        name: "drafts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS drafts (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
];

/// Bring the schema up to the newest version.
///
/// Each pending migration runs as one batch and is recorded right after it
/// succeeds, so a failure leaves earlier versions applied.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("migration ledger unavailable: {e}")))?;

    let from = get_current_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        tracing::debug!(version = from, "Schema up to date");
        return Ok(());
    }

    for migration in &pending {
        conn.execute_batch(migration.sql).await.map_err(|e| {
            DatabaseError::Migration(format!("schema v{} ({}): {e}", migration.version, migration.name))
        })?;
        seed_version(conn, migration.version, migration.name).await?;
        tracing::debug!(version = migration.version, name = migration.name, "Schema migration applied");
    }

    tracing::info!(
        from,
        to = get_current_version(conn).await?,
        applied = pending.len(),
        "Profile and draft schema migrated"
    );
    Ok(())
}

/// Newest recorded schema version; 0 on a fresh database.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let failed = |e: libsql::Error| DatabaseError::Migration(format!("reading schema version: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(failed)?;
    match rows.next().await.map_err(failed)? {
        Some(row) => row.get::<i64>(0).map_err(failed),
        None => Ok(0),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("recording schema v{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                libsql::params![table],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        row.get::<i64>(0).unwrap() == 1
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in ["profiles", "role_profiles", "drafts", "_migrations"] {
            assert!(table_exists(&conn, table).await, "Table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[tokio::test]
    async fn partial_database_is_brought_forward() {
        let conn = test_conn().await;
        conn.execute_batch(MIGRATIONS[0].sql).await.unwrap();
        conn.execute(
            "CREATE TABLE _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
            (),
        )
        .await
        .unwrap();
        seed_version(&conn, 1, "profiles").await.unwrap();
        assert!(!table_exists(&conn, "drafts").await);

        run_migrations(&conn).await.unwrap();
        assert!(table_exists(&conn, "drafts").await);
        assert_eq!(get_current_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn version_tracking() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT version, name FROM _migrations ORDER BY version", ())
            .await
            .unwrap();
        for expected in MIGRATIONS {
            let row = rows.next().await.unwrap().unwrap();
            assert_eq!(row.get::<i64>(0).unwrap(), expected.version);
            assert_eq!(row.get::<String>(1).unwrap(), expected.name);
        }
        assert!(rows.next().await.unwrap().is_none());
    }
}
