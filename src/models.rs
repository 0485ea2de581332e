//! Ledger data types.
//!
//! Operation records and backup records are immutable once written; the
//! ledger only ever inserts them. Timestamps are unix seconds.

use serde::Serialize;
use serde_json::Value;

pub const DELETE_OPERATION: &str = "delete";

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    #[default]
    Success,
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "success" => Ok(OperationStatus::Success),
            "error" => Ok(OperationStatus::Error),
            other => anyhow::bail!("unknown operation status in ledger: '{}'", other),
        }
    }
}

/// Input to [`Ledger::log_operation`](crate::ledger::Ledger::log_operation).
#[derive(Debug, Clone, Default)]
pub struct NewOperation {
    pub operation_type: String,
    pub document_id: Option<String>,
    pub document_name: Option<String>,
    pub metadata: Option<Value>,
    pub status: OperationStatus,
    pub error_message: Option<String>,
}

impl NewOperation {
    pub fn new(operation_type: impl Into<String>) -> Self {
        Self {
            operation_type: operation_type.into(),
            ..Default::default()
        }
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.document_name = Some(name.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = OperationStatus::Error;
        self.error_message = Some(message.into());
        self
    }
}

/// A row of the operation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    pub id: i64,
    pub operation_type: String,
    pub document_id: Option<String>,
    pub document_name: Option<String>,
    pub metadata: Option<Value>,
    pub status: OperationStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// A row of the backup table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub id: i64,
    pub document_id: String,
    pub document_data: Value,
    pub backed_up_at: i64,
}

/// The most recent backup of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backup {
    pub data: Value,
    pub backed_up_at: i64,
}

impl From<BackupRecord> for Backup {
    fn from(record: BackupRecord) -> Self {
        Self {
            data: record.document_data,
            backed_up_at: record.backed_up_at,
        }
    }
}

/// Entry of the deleted-documents view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedDocument {
    pub document_id: String,
    pub backed_up_at: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

impl DeletedDocument {
    /// Projects a backup row, reading `name` / `type` from the payload.
    pub fn from_backup(record: &BackupRecord) -> Self {
        let field = |key: &str, fallback: &str| {
            record
                .document_data
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            document_id: record.document_id.clone(),
            backed_up_at: record.backed_up_at,
            name: field("name", "Unnamed"),
            doc_type: field("type", "Unknown"),
        }
    }
}

/// Formats a unix timestamp as ISO-8601 UTC.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
