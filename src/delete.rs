//! Backup-then-delete orchestration.
//!
//! [`delete_with_backup`] runs three steps in order, with no rollback:
//!
//! 1. fetch the document from the knowledge base;
//! 2. write its payload to the ledger as a backup;
//! 3. delete it remotely, then append an operation record for the
//!    outcome (success or error).
//!
//! A failure in step 1 or 2 stops the sequence before the remote delete,
//! so a document is never deleted through this path without a backup.
//! A crash between the remote delete and the log write leaves a deletion
//! with a backup but no operation record; that window is not closed here.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

use crate::kb::KnowledgeBase;
use crate::ledger::Ledger;
use crate::models::{NewOperation, DELETE_OPERATION};

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub document_id: String,
    pub document_name: String,
    pub backup_id: i64,
    pub operation_id: i64,
}

pub async fn delete_with_backup(
    kb: &dyn KnowledgeBase,
    ledger: &dyn Ledger,
    document_id: &str,
) -> Result<DeleteOutcome> {
    let response = kb
        .get_document(document_id)
        .await
        .with_context(|| format!("Failed to fetch document {} before delete", document_id))?;

    let payload = match response.get("data") {
        Some(data) if !data.is_null() => data.clone(),
        _ => json!({}),
    };
    let document_name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();

    let backup_id = ledger
        .backup_document(document_id, &payload)
        .await
        .with_context(|| format!("Failed to back up document {}; not deleting", document_id))?;
    log::info!("backed up {} ({}) as backup {}", document_id, document_name, backup_id);

    let op = NewOperation::new(DELETE_OPERATION)
        .document(document_id)
        .name(document_name.clone());

    match kb.delete_document(document_id).await {
        Ok(_) => {
            let operation_id = ledger.log_operation(&op).await?;
            log::info!("deleted {} (operation {})", document_id, operation_id);
            Ok(DeleteOutcome {
                document_id: document_id.to_string(),
                document_name,
                backup_id,
                operation_id,
            })
        }
        Err(err) => {
            log::warn!("remote delete of {} failed: {:#}", document_id, err);
            ledger.log_operation(&op.failed(err.to_string())).await?;
            Err(err)
        }
    }
}

/// CLI entry point: runs the orchestrated delete and prints the outcome.
pub async fn run_delete(
    kb: &dyn KnowledgeBase,
    ledger: &dyn Ledger,
    document_id: &str,
    verbose: bool,
) -> Result<()> {
    let outcome = delete_with_backup(kb, ledger, document_id).await?;
    println!(
        "Document {} deleted and backed up successfully.",
        outcome.document_id
    );
    if verbose {
        println!("  name:      {}", outcome.document_name);
        println!("  backup:    #{}", outcome.backup_id);
        println!("  operation: #{}", outcome.operation_id);
    }
    Ok(())
}
