//! Read-side view of deleted documents.
//!
//! A backup is listed only when at least one operation record with
//! `operation_type = "delete"` shares its `document_id` (an inner join,
//! not a foreign key). Backups without such a record are kept in the
//! ledger but never appear here. Each backup row is listed at most once,
//! newest `backed_up_at` first, ties broken by the later insert.

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::models::{BackupRecord, DeletedDocument, OperationRecord, DELETE_OPERATION};

pub fn deleted_documents(
    backups: &[BackupRecord],
    operations: &[OperationRecord],
    limit: i64,
) -> Vec<DeletedDocument> {
    let deleted_ids: HashSet<&str> = operations
        .iter()
        .filter(|op| op.operation_type == DELETE_OPERATION)
        .filter_map(|op| op.document_id.as_deref())
        .collect();

    let mut joined: Vec<&BackupRecord> = backups
        .iter()
        .filter(|b| deleted_ids.contains(b.document_id.as_str()))
        .collect();
    joined.sort_by_key(|b| Reverse((b.backed_up_at, b.id)));

    joined
        .into_iter()
        .take(limit.max(0) as usize)
        .map(DeletedDocument::from_backup)
        .collect()
}
