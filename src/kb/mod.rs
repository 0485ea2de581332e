//! Remote knowledge-base client abstraction.
//!
//! [`KnowledgeBase`] is the seam the delete orchestrator, CLI, and HTTP
//! server talk to. [`voiceflow::VoiceflowClient`] is the HTTPS
//! implementation; tests substitute their own.
//!
//! Request bodies are built by the free functions in this module
//! ([`url_payload`], [`TableUpload::payload`], [`QueryOptions::payload`])
//! so the wire shapes can be checked without a network.
//!
//! Every failed call surfaces as a [`RemoteCallError`] inside the
//! returned `anyhow::Error`. Nothing here retries.

pub mod voiceflow;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::Path;

pub use voiceflow::VoiceflowClient;

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Fetches a document. The response is returned as-is; the document
    /// itself sits under `data`.
    async fn get_document(&self, document_id: &str) -> Result<Value>;

    async fn delete_document(&self, document_id: &str) -> Result<Value>;

    /// Uploads a PDF/TXT/DOCX file as multipart form data.
    async fn upload_file(&self, path: &Path, options: &UploadOptions) -> Result<Value>;

    async fn upload_url(
        &self,
        url: &str,
        name: Option<&str>,
        options: &UploadOptions,
    ) -> Result<Value>;

    async fn upload_table(&self, table: &TableUpload, options: &UploadOptions) -> Result<Value>;

    /// Replaces the file behind an existing document.
    async fn update_document(
        &self,
        document_id: &str,
        path: &Path,
        options: &UploadOptions,
    ) -> Result<Value>;

    async fn query(&self, question: &str, options: &QueryOptions) -> Result<QueryResponse>;

    /// Lists documents; returns the `data` array of the response.
    async fn list_documents(&self, limit: u32, offset: u32) -> Result<Vec<Value>>;
}

/// A failed call to the remote knowledge base.
///
/// `status` is `None` when no HTTP response was received (DNS, TLS,
/// timeout); `body` then holds the transport error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCallError {
    pub status: Option<u16>,
    pub body: String,
}

impl fmt::Display for RemoteCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "knowledge base returned HTTP {}: {}", status, self.body),
            None => write!(f, "knowledge base request failed: {}", self.body),
        }
    }
}

impl std::error::Error for RemoteCallError {}

/// Options shared by the upload endpoints.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Legacy tag list, e.g. `[{"name": "faq"}]`.
    pub tags: Option<Value>,
    pub metadata: Option<Value>,
    pub overwrite: Option<bool>,
    pub max_chunk_size: Option<u32>,
}

impl UploadOptions {
    /// Query string parameters (`overwrite`, `maxChunkSize`).
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(overwrite) = self.overwrite {
            params.push(("overwrite", if overwrite { "true" } else { "false" }.to_string()));
        }
        if let Some(size) = self.max_chunk_size {
            params.push(("maxChunkSize", size.to_string()));
        }
        params
    }
}

/// Body of a URL upload: `{"data": {"type": "url", "url": ..}}`.
pub fn url_payload(url: &str, name: Option<&str>, options: &UploadOptions) -> Value {
    let mut data = Map::new();
    data.insert("type".into(), json!("url"));
    data.insert("url".into(), json!(url));
    if let Some(metadata) = non_empty(&options.metadata) {
        data.insert("metadata".into(), metadata.clone());
    }
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        data.insert("name".into(), json!(name));
    }
    if let Some(tags) = non_empty(&options.tags) {
        data.insert("tags".into(), tags.clone());
    }
    json!({ "data": data })
}

/// Tabular data to upload: rows plus a per-column schema.
///
/// `schema` maps column name to `{"type": "string"|"number"|.., "searchable": bool}`.
#[derive(Debug, Clone)]
pub struct TableUpload {
    pub name: String,
    pub items: Vec<Value>,
    pub schema: Map<String, Value>,
}

impl TableUpload {
    /// Builds a table upload from untyped JSON, rejecting wrong shapes.
    pub fn from_json(name: &str, items: Value, schema: Value) -> Result<Self> {
        if name.trim().is_empty() {
            bail!("table name must not be empty");
        }
        let items = match items {
            Value::Array(rows) => rows,
            _ => bail!("table items must be a JSON array of row objects"),
        };
        let schema = match schema {
            Value::Object(map) => map,
            _ => bail!("table schema must be a JSON object keyed by column name"),
        };
        Ok(Self {
            name: name.to_string(),
            items,
            schema,
        })
    }

    /// Request body. Columns without a `type` are dropped; columns with
    /// `searchable: true` are listed in `searchableFields`.
    pub fn payload(&self, options: &UploadOptions) -> Value {
        let mut fields = Map::new();
        let mut searchable = Vec::new();
        for (column, cfg) in &self.schema {
            let Some(field_type) = cfg.get("type").filter(|t| !t.is_null()) else {
                continue;
            };
            fields.insert(column.clone(), json!({ "type": field_type }));
            if cfg.get("searchable") == Some(&Value::Bool(true)) {
                searchable.push(column.clone());
            }
        }

        let mut data = Map::new();
        data.insert("name".into(), json!(self.name));
        data.insert(
            "schema".into(),
            json!({ "fields": fields, "searchableFields": searchable }),
        );
        data.insert("items".into(), Value::Array(self.items.clone()));
        if let Some(metadata) = non_empty(&options.metadata) {
            data.insert("metadata".into(), metadata.clone());
        }
        if let Some(tags) = non_empty(&options.tags) {
            data.insert("tags".into(), tags.clone());
        }
        json!({ "data": data })
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub chunk_limit: u32,
    pub synthesis: bool,
    pub tags: Option<Value>,
    /// Metadata filter, e.g. `{"$eq": {"category": "store-info"}}`.
    pub metadata: Option<Value>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            chunk_limit: 5,
            synthesis: true,
            tags: None,
            metadata: None,
        }
    }
}

impl QueryOptions {
    pub fn payload(&self, question: &str) -> Value {
        let mut body = json!({
            "question": question,
            "chunkLimit": self.chunk_limit,
            "synthesis": self.synthesis,
        });
        let mut settings = Map::new();
        if let Some(tags) = non_empty(&self.tags) {
            settings.insert("tags".into(), tags.clone());
        }
        if let Some(metadata) = non_empty(&self.metadata) {
            settings.insert("metadata".into(), metadata.clone());
        }
        if !settings.is_empty() {
            body["settings"] = Value::Object(settings);
        }
        body
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub chunks: Vec<QueryChunk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryChunk {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Extracts `data.documentID` from an upload response.
pub fn document_id(response: &Value) -> Option<&str> {
    response
        .get("data")
        .and_then(|d| d.get("documentID"))
        .and_then(Value::as_str)
}

// Empty objects/arrays are treated like absent values, matching how the
// remote API ignores them.
fn non_empty(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| match v {
        Value::Null => false,
        Value::Object(m) => !m.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    })
}

/// Rejects ids that cannot name a single document: blank, `.` or `..`.
///
/// Everything else is accepted; the client percent-encodes the id into
/// one path segment.
pub fn validate_document_id(document_id: &str) -> Result<()> {
    if document_id.trim().is_empty() || document_id == "." || document_id == ".." {
        bail!("invalid document id: {:?}", document_id);
    }
    Ok(())
}

/// Parses a JSON command-line or form argument.
///
/// Called before any remote or ledger call so bad input never leaves
/// partial state behind.
pub fn parse_json_arg(field: &str, raw: Option<&str>) -> Result<Option<Value>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {} JSON: {}", field, e)),
    }
}
