//! Ledger inspection commands.
//!
//! `kbctl operations`, `kbctl backups`, and `kbctl backup <id>` read the
//! local ledger only; they never contact the knowledge base.

use anyhow::Result;

use crate::documents::OutputFormat;
use crate::ledger::Ledger;
use crate::models::{format_ts_iso, OperationStatus};

pub async fn run_operations(ledger: &dyn Ledger, limit: i64, format: OutputFormat) -> Result<()> {
    let ops = ledger.get_operations(limit).await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
        return Ok(());
    }

    if ops.is_empty() {
        println!("No operations recorded.");
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:<10} {:<8} {:<26} NAME",
        "ID", "WHEN", "TYPE", "STATUS", "DOCUMENT"
    );
    for op in &ops {
        println!(
            "{:<6} {:<20} {:<10} {:<8} {:<26} {}",
            op.id,
            format_ts_iso(op.created_at),
            op.operation_type,
            op.status.as_str(),
            op.document_id.as_deref().unwrap_or("-"),
            op.document_name.as_deref().unwrap_or("-"),
        );
        if op.status == OperationStatus::Error {
            if let Some(ref message) = op.error_message {
                println!("       error: {}", message);
            }
        }
    }
    Ok(())
}

pub async fn run_deleted(ledger: &dyn Ledger, limit: i64, format: OutputFormat) -> Result<()> {
    let docs = ledger.get_deleted_documents(limit).await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("No deleted documents with backups.");
        return Ok(());
    }

    println!("{:<26} {:<20} {:<10} NAME", "DOCUMENT", "BACKED UP", "TYPE");
    for doc in &docs {
        println!(
            "{:<26} {:<20} {:<10} {}",
            doc.document_id,
            format_ts_iso(doc.backed_up_at),
            doc.doc_type,
            doc.name
        );
    }
    Ok(())
}

/// Prints the most recent backup (or every backup with `history`) as JSON.
///
/// A document with no backup is reported on stderr and exits non-zero.
pub async fn run_backup(ledger: &dyn Ledger, document_id: &str, history: bool) -> Result<()> {
    let json = if history {
        let records = ledger.get_backup_history(document_id).await?;
        if records.is_empty() {
            anyhow::bail!("no backup found for document {}", document_id);
        }
        serde_json::to_string_pretty(&records)?
    } else {
        match ledger.get_backup(document_id).await? {
            Some(backup) => serde_json::to_string_pretty(&backup)?,
            None => anyhow::bail!("no backup found for document {}", document_id),
        }
    };
    println!("{}", json);
    Ok(())
}
