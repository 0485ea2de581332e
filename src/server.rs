//! JSON HTTP API.
//!
//! Exposes the knowledge-base operations and the ledger views over HTTP
//! for browser front ends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/documents` | List remote documents (`limit`, `offset`) |
//! | `GET`    | `/documents/{id}` | Fetch a remote document |
//! | `DELETE` | `/documents/{id}` | Back up, delete, and log |
//! | `POST`   | `/uploads/url` | Upload a URL |
//! | `POST`   | `/uploads/table` | Upload table rows |
//! | `POST`   | `/query` | Query the knowledge base |
//! | `GET`    | `/operations` | Operation log (`limit`, default 100) |
//! | `GET`    | `/backups` | Deleted documents view (`limit`, default 100) |
//! | `GET`    | `/backups/{id}` | Most recent backup of a document |
//! | `POST`   | `/suggest/metadata` | Metadata suggestions |
//! | `POST`   | `/suggest/chunk-size` | Chunk size suggestion |
//!
//! # Credentials
//!
//! A knowledge-base client is built per request from the server's
//! immutable [`KbConfig`]. A request may send `X-Api-Key` and
//! `X-Project-Id` headers; they apply to that request only.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "url is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `remote_error` (502),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{Config, KbConfig};
use crate::delete::{delete_with_backup, DeleteOutcome};
use crate::kb::{
    validate_document_id, KnowledgeBase, QueryOptions, QueryResponse, RemoteCallError,
    TableUpload, UploadOptions, VoiceflowClient,
};
use crate::ledger::{Ledger, SqliteLedger};
use crate::models::{Backup, DeletedDocument, OperationRecord};
use crate::suggest;

/// Builds a knowledge-base client for one request.
pub type KbFactory =
    Arc<dyn Fn(&KbConfig) -> anyhow::Result<Arc<dyn KnowledgeBase>> + Send + Sync>;

/// The production factory: a fresh [`VoiceflowClient`] per request.
pub fn voiceflow_factory() -> KbFactory {
    Arc::new(|kb: &KbConfig| -> anyhow::Result<Arc<dyn KnowledgeBase>> {
        let client: Arc<dyn KnowledgeBase> = Arc::new(VoiceflowClient::new(kb)?);
        Ok(client)
    })
}

#[derive(Clone)]
struct AppState {
    kb_config: Arc<KbConfig>,
    ledger: Arc<dyn Ledger>,
    kb_factory: KbFactory,
}

impl AppState {
    fn kb(&self, headers: &HeaderMap) -> Result<Arc<dyn KnowledgeBase>, AppError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let kb = self
            .kb_config
            .with_credentials(header("x-api-key"), header("x-project-id"));
        if kb.api_key.is_none() {
            return Err(bad_request(
                "no API key configured; set kb.api_key or send X-Api-Key",
            ));
        }
        (self.kb_factory)(&kb).map_err(internal)
    }
}

/// Starts the server on `[server].bind` with a SQLite ledger and the
/// Voiceflow client. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ledger = SqliteLedger::open(config).await?;
    let app = router(config, Arc::new(ledger), voiceflow_factory());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the router. Exposed so tests and embedders can supply their
/// own ledger and client factory.
pub fn router(config: &Config, ledger: Arc<dyn Ledger>, kb_factory: KbFactory) -> Router {
    let state = AppState {
        kb_config: Arc::new(config.kb.clone()),
        ledger,
        kb_factory,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete),
        )
        .route("/uploads/url", post(handle_upload_url))
        .route("/uploads/table", post(handle_upload_table))
        .route("/query", post(handle_query))
        .route("/operations", get(handle_operations))
        .route("/backups", get(handle_backups))
        .route("/backups/{id}", get(handle_backup))
        .route("/suggest/metadata", post(handle_suggest_metadata))
        .route("/suggest/chunk-size", post(handle_suggest_chunk_size))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

/// Maps a failed operation to a response: remote failures become 502
/// (404 when the knowledge base itself said so), everything else 500.
fn classify(err: anyhow::Error) -> AppError {
    let remote = err
        .chain()
        .find_map(|e| e.downcast_ref::<RemoteCallError>())
        .cloned();
    match remote {
        Some(RemoteCallError {
            status: Some(404), ..
        }) => not_found(format!("{:#}", err)),
        Some(_) => AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "remote_error",
            message: format!("{:#}", err),
        },
        None => internal(err),
    }
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_list_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_list_limit() -> u32 {
    50
}

async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let kb = state.kb(&headers)?;
    let docs = kb
        .list_documents(params.limit, params.offset)
        .await
        .map_err(classify)?;
    Ok(Json(json!({ "data": docs })))
}

async fn handle_get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    validate_document_id(&id).map_err(|e| bad_request(e.to_string()))?;
    let kb = state.kb(&headers)?;
    let doc = kb.get_document(&id).await.map_err(classify)?;
    Ok(Json(doc))
}

async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, AppError> {
    validate_document_id(&id).map_err(|e| bad_request(e.to_string()))?;
    let kb = state.kb(&headers)?;
    let outcome = delete_with_backup(kb.as_ref(), state.ledger.as_ref(), &id)
        .await
        .map_err(classify)?;
    Ok(Json(outcome))
}

/// Upload options as sent in request bodies.
#[derive(Deserialize, Default)]
struct UploadFields {
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    overwrite: Option<bool>,
    #[serde(default)]
    max_chunk_size: Option<u32>,
}

impl UploadFields {
    fn into_options(self) -> Result<UploadOptions, AppError> {
        if let Some(ref metadata) = self.metadata {
            if !metadata.is_object() && !metadata.is_null() {
                return Err(bad_request("metadata must be a JSON object"));
            }
        }
        Ok(UploadOptions {
            tags: self.tags,
            metadata: self.metadata,
            overwrite: self.overwrite,
            max_chunk_size: self.max_chunk_size,
        })
    }
}

#[derive(Deserialize)]
struct UploadUrlRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    options: UploadFields,
}

async fn handle_upload_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadUrlRequest>,
) -> Result<Json<Value>, AppError> {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return Err(bad_request("url is required"));
    }
    let options = req.options.into_options()?;
    let kb = state.kb(&headers)?;
    let response = kb
        .upload_url(&url, req.name.as_deref(), &options)
        .await
        .map_err(classify)?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct UploadTableRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    items: Value,
    #[serde(default)]
    schema: Value,
    #[serde(flatten)]
    options: UploadFields,
}

async fn handle_upload_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadTableRequest>,
) -> Result<Json<Value>, AppError> {
    let table = TableUpload::from_json(&req.name, req.items, req.schema)
        .map_err(|e| bad_request(e.to_string()))?;
    let options = req.options.into_options()?;
    let kb = state.kb(&headers)?;
    let response = kb.upload_table(&table, &options).await.map_err(classify)?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: String,
    #[serde(default)]
    chunk_limit: Option<u32>,
    #[serde(default)]
    synthesis: Option<bool>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
}

async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let defaults = QueryOptions::default();
    let options = QueryOptions {
        chunk_limit: req.chunk_limit.unwrap_or(defaults.chunk_limit),
        synthesis: req.synthesis.unwrap_or(defaults.synthesis),
        tags: req.tags,
        metadata: req.metadata,
    };
    let kb = state.kb(&headers)?;
    let result = kb.query(&req.question, &options).await.map_err(classify)?;
    Ok(Json(result))
}

// ============ Ledger views ============

#[derive(Deserialize)]
struct LedgerParams {
    #[serde(default = "default_ledger_limit")]
    limit: i64,
}

fn default_ledger_limit() -> i64 {
    100
}

async fn handle_operations(
    State(state): State<AppState>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<Vec<OperationRecord>>, AppError> {
    let ops = state
        .ledger
        .get_operations(params.limit)
        .await
        .map_err(internal)?;
    Ok(Json(ops))
}

async fn handle_backups(
    State(state): State<AppState>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<Vec<DeletedDocument>>, AppError> {
    let docs = state
        .ledger
        .get_deleted_documents(params.limit)
        .await
        .map_err(internal)?;
    Ok(Json(docs))
}

async fn handle_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Backup>, AppError> {
    match state.ledger.get_backup(&id).await.map_err(internal)? {
        Some(backup) => Ok(Json(backup)),
        None => Err(not_found(format!("no backup for document {}", id))),
    }
}

// ============ Suggestions ============

#[derive(Deserialize)]
struct SuggestMetadataRequest {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    table_name: Option<String>,
}

async fn handle_suggest_metadata(Json(req): Json<SuggestMetadataRequest>) -> Json<Value> {
    let meta = suggest::generate_metadata_suggestions(
        req.filename.as_deref(),
        req.url.as_deref(),
        req.table_name.as_deref(),
    );
    Json(Value::Object(meta))
}

#[derive(Deserialize)]
struct SuggestChunkSizeRequest {
    #[serde(default)]
    content_length: Option<u64>,
    #[serde(default)]
    document_type: Option<String>,
}

async fn handle_suggest_chunk_size(Json(req): Json<SuggestChunkSizeRequest>) -> Json<Value> {
    let size = suggest::calculate_optimal_chunk_size(
        req.content_length,
        None,
        req.document_type.as_deref().unwrap_or("general"),
    );
    Json(json!({ "suggested_chunk_size": size }))
}
