use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Creates the ledger schema. Safe to run on every start.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // Operation log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation_type TEXT NOT NULL,
            document_id TEXT,
            document_name TEXT,
            metadata TEXT,
            status TEXT NOT NULL DEFAULT 'success',
            error_message TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pre-delete payload backups
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS backups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            document_data TEXT NOT NULL,
            backed_up_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_operations_doc_id ON operations(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_backups_doc_id ON backups(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_operations_created_at ON operations(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}
