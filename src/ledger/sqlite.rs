//! SQLite-backed [`Ledger`] implementation.
//!
//! Wraps a [`SqlitePool`] and maps each ledger operation to plain SQL
//! against the `operations` and `backups` tables created by
//! [`migrate::ensure_schema`](crate::migrate::ensure_schema). JSON payloads
//! are stored as TEXT.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{
    Backup, BackupRecord, DeletedDocument, NewOperation, OperationRecord, OperationStatus,
    DELETE_OPERATION,
};

use super::{now_ts, Ledger};

pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Opens the ledger database and creates the tables if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        migrate::ensure_schema(&pool)
            .await
            .context("Failed to create ledger tables")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_json(column: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("corrupt JSON in ledger column {}", column))
}

fn operation_from_row(row: &SqliteRow) -> Result<OperationRecord> {
    let metadata: Option<String> = row.get("metadata");
    let status: String = row.get("status");
    Ok(OperationRecord {
        id: row.get("id"),
        operation_type: row.get("operation_type"),
        document_id: row.get("document_id"),
        document_name: row.get("document_name"),
        metadata: metadata
            .as_deref()
            .map(|m| parse_json("operations.metadata", m))
            .transpose()?,
        status: OperationStatus::parse(&status)?,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

fn backup_from_row(row: &SqliteRow) -> Result<BackupRecord> {
    let data: String = row.get("document_data");
    Ok(BackupRecord {
        id: row.get("id"),
        document_id: row.get("document_id"),
        document_data: parse_json("backups.document_data", &data)?,
        backed_up_at: row.get("backed_up_at"),
    })
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn log_operation(&self, op: &NewOperation) -> Result<i64> {
        let metadata = op
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO operations (operation_type, document_id, document_name, metadata,
                                    status, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&op.operation_type)
        .bind(&op.document_id)
        .bind(&op.document_name)
        .bind(metadata)
        .bind(op.status.as_str())
        .bind(&op.error_message)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .context("Failed to write operation record")?;

        let id = result.last_insert_rowid();
        log::debug!(
            "ledger: operation {} {} doc={:?} status={}",
            id,
            op.operation_type,
            op.document_id,
            op.status.as_str()
        );
        Ok(id)
    }

    async fn backup_document(&self, document_id: &str, document_data: &Value) -> Result<i64> {
        let data = serde_json::to_string(document_data)?;

        let result = sqlx::query(
            "INSERT INTO backups (document_id, document_data, backed_up_at) VALUES (?, ?, ?)",
        )
        .bind(document_id)
        .bind(data)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .context("Failed to write backup record")?;

        let id = result.last_insert_rowid();
        log::debug!("ledger: backup {} for doc {}", id, document_id);
        Ok(id)
    }

    async fn get_backup(&self, document_id: &str) -> Result<Option<Backup>> {
        let row = sqlx::query(
            r#"
            SELECT id, document_id, document_data, backed_up_at
            FROM backups
            WHERE document_id = ?
            ORDER BY backed_up_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(backup_from_row)
            .transpose()
            .map(|b| b.map(Backup::from))
    }

    async fn get_backup_history(&self, document_id: &str) -> Result<Vec<BackupRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, document_data, backed_up_at
            FROM backups
            WHERE document_id = ?
            ORDER BY backed_up_at DESC, id DESC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(backup_from_row).collect()
    }

    async fn get_operations(&self, limit: i64) -> Result<Vec<OperationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, operation_type, document_id, document_name, metadata,
                   status, error_message, created_at
            FROM operations
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(operation_from_row).collect()
    }

    async fn get_deleted_documents(&self, limit: i64) -> Result<Vec<DeletedDocument>> {
        // Same join as `view::deleted_documents`, evaluated by SQLite so the
        // limit applies before payloads are decoded.
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.document_id, b.document_data, b.backed_up_at
            FROM backups b
            WHERE EXISTS (
                SELECT 1 FROM operations o
                WHERE o.document_id = b.document_id AND o.operation_type = ?
            )
            ORDER BY b.backed_up_at DESC, b.id DESC
            LIMIT ?
            "#,
        )
        .bind(DELETE_OPERATION)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| backup_from_row(row).map(|b| DeletedDocument::from_backup(&b)))
            .collect()
    }
}
