//! The document-lifecycle ledger.
//!
//! The [`Ledger`] trait is the append-only record of operations and the
//! backup table holding each document's payload as it was right before a
//! delete. There is no update or delete path: rows are only inserted.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`log_operation`](Ledger::log_operation) | Append an operation record |
//! | [`backup_document`](Ledger::backup_document) | Append a payload backup |
//! | [`get_backup`](Ledger::get_backup) | Most recent backup of a document |
//! | [`get_backup_history`](Ledger::get_backup_history) | Every backup of a document |
//! | [`get_operations`](Ledger::get_operations) | Recent operations, newest first |
//! | [`get_deleted_documents`](Ledger::get_deleted_documents) | Backups joined to delete operations |
//!
//! Storage errors are returned as-is; the ledger never retries.
//! Concurrent writers are serialized by the backend (SQLite locking, or
//! the `RwLock` in [`memory::InMemoryLedger`]).

pub mod memory;
pub mod sqlite;
pub mod view;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Backup, BackupRecord, DeletedDocument, NewOperation, OperationRecord};

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Appends an operation record and returns its id.
    async fn log_operation(&self, op: &NewOperation) -> Result<i64>;

    /// Appends a backup of `document_data` for `document_id` and returns its id.
    ///
    /// The payload is stored verbatim; its shape is not validated.
    async fn backup_document(&self, document_id: &str, document_data: &Value) -> Result<i64>;

    /// Returns the most recent backup, or `None` if the document was never backed up.
    ///
    /// Ordered by `backed_up_at` then insertion order.
    async fn get_backup(&self, document_id: &str) -> Result<Option<Backup>> {
        Ok(self
            .get_backup_history(document_id)
            .await?
            .into_iter()
            .next()
            .map(Backup::from))
    }

    /// Returns every backup of a document, newest first.
    async fn get_backup_history(&self, document_id: &str) -> Result<Vec<BackupRecord>>;

    /// Returns up to `limit` operation records, newest first.
    async fn get_operations(&self, limit: i64) -> Result<Vec<OperationRecord>>;

    /// Returns up to `limit` entries of the deleted-documents view.
    ///
    /// See [`view::deleted_documents`] for the exact semantics.
    async fn get_deleted_documents(&self, limit: i64) -> Result<Vec<DeletedDocument>>;
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
