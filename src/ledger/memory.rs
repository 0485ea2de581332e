//! In-memory [`Ledger`] implementation for tests and embedding.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Ids are assigned in insertion
//! order starting at 1, mirroring SQLite's `AUTOINCREMENT`.

use std::cmp::Reverse;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{BackupRecord, DeletedDocument, NewOperation, OperationRecord};

use super::{now_ts, view, Ledger};

#[derive(Default)]
pub struct InMemoryLedger {
    operations: RwLock<Vec<OperationRecord>>,
    backups: RwLock<Vec<BackupRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.read().unwrap().len()
    }

    pub fn backup_count(&self) -> usize {
        self.backups.read().unwrap().len()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn log_operation(&self, op: &NewOperation) -> Result<i64> {
        let mut ops = self.operations.write().unwrap();
        let id = ops.len() as i64 + 1;
        ops.push(OperationRecord {
            id,
            operation_type: op.operation_type.clone(),
            document_id: op.document_id.clone(),
            document_name: op.document_name.clone(),
            metadata: op.metadata.clone(),
            status: op.status,
            error_message: op.error_message.clone(),
            created_at: now_ts(),
        });
        Ok(id)
    }

    async fn backup_document(&self, document_id: &str, document_data: &Value) -> Result<i64> {
        let mut backups = self.backups.write().unwrap();
        let id = backups.len() as i64 + 1;
        backups.push(BackupRecord {
            id,
            document_id: document_id.to_string(),
            document_data: document_data.clone(),
            backed_up_at: now_ts(),
        });
        Ok(id)
    }

    async fn get_backup_history(&self, document_id: &str) -> Result<Vec<BackupRecord>> {
        let backups = self.backups.read().unwrap();
        let mut history: Vec<BackupRecord> = backups
            .iter()
            .filter(|b| b.document_id == document_id)
            .cloned()
            .collect();
        history.sort_by_key(|b| Reverse((b.backed_up_at, b.id)));
        Ok(history)
    }

    async fn get_operations(&self, limit: i64) -> Result<Vec<OperationRecord>> {
        let ops = self.operations.read().unwrap();
        let mut recent: Vec<OperationRecord> = ops.clone();
        recent.sort_by_key(|op| Reverse((op.created_at, op.id)));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }

    async fn get_deleted_documents(&self, limit: i64) -> Result<Vec<DeletedDocument>> {
        let backups = self.backups.read().unwrap();
        let ops = self.operations.read().unwrap();
        Ok(view::deleted_documents(&backups, &ops, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.log_operation(&NewOperation::new("upload")).await.unwrap(), 1);
        assert_eq!(ledger.log_operation(&NewOperation::new("delete")).await.unwrap(), 2);
        assert_eq!(ledger.backup_document("a", &json!({})).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_backup_wins() {
        let ledger = InMemoryLedger::new();
        ledger.backup_document("a", &json!({"v": 1})).await.unwrap();
        ledger.backup_document("a", &json!({"v": 2})).await.unwrap();
        let backup = ledger.get_backup("a").await.unwrap().unwrap();
        assert_eq!(backup.data, json!({"v": 2}));
        assert!(ledger.get_backup("missing").await.unwrap().is_none());
    }
}
