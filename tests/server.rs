//! HTTP API tests with an in-memory ledger and a scripted knowledge base.

use anyhow::Result;
use async_trait::async_trait;
use kb_ledger::config::{Config, KbConfig};
use kb_ledger::kb::{
    KnowledgeBase, QueryChunk, QueryOptions, QueryResponse, RemoteCallError, TableUpload,
    UploadOptions,
};
use kb_ledger::ledger::{InMemoryLedger, Ledger};
use kb_ledger::server::{router, KbFactory};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

// ─── Scripted knowledge base ────────────────────────────────────────

struct ScriptedKb {
    api_key: String,
    seen_keys: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl KnowledgeBase for ScriptedKb {
    async fn get_document(&self, id: &str) -> Result<Value> {
        self.seen_keys.lock().unwrap().push(self.api_key.clone());
        if id == "missing" {
            return Err(RemoteCallError {
                status: Some(404),
                body: "not found".into(),
            }
            .into());
        }
        Ok(json!({"data": {"documentID": id, "name": "Refund Policy", "type": "pdf"}}))
    }

    async fn delete_document(&self, id: &str) -> Result<Value> {
        if id == "locked" {
            return Err(RemoteCallError {
                status: Some(409),
                body: "document locked".into(),
            }
            .into());
        }
        Ok(Value::Null)
    }

    async fn upload_file(&self, _: &Path, _: &UploadOptions) -> Result<Value> {
        Ok(json!({"data": {"documentID": "file_doc"}}))
    }

    async fn upload_url(&self, url: &str, _: Option<&str>, _: &UploadOptions) -> Result<Value> {
        Ok(json!({"data": {"documentID": "url_doc", "url": url}}))
    }

    async fn upload_table(&self, table: &TableUpload, _: &UploadOptions) -> Result<Value> {
        Ok(json!({"data": {"documentID": "table_doc", "rows": table.items.len()}}))
    }

    async fn update_document(&self, id: &str, _: &Path, _: &UploadOptions) -> Result<Value> {
        Ok(json!({"data": {"documentID": id}}))
    }

    async fn query(&self, question: &str, options: &QueryOptions) -> Result<QueryResponse> {
        Ok(QueryResponse {
            output: options.synthesis.then(|| format!("answer to {}", question)),
            chunks: vec![QueryChunk {
                score: Some(0.5),
                content: "chunk".into(),
                ..Default::default()
            }],
        })
    }

    async fn list_documents(&self, limit: u32, _: u32) -> Result<Vec<Value>> {
        Ok((0..limit.min(3))
            .map(|i| json!({"documentID": format!("d{}", i)}))
            .collect())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    ledger: Arc<InMemoryLedger>,
    seen_keys: Arc<Mutex<Vec<String>>>,
    http: reqwest::Client,
}

async fn start(api_key: Option<&str>) -> TestServer {
    let config = Config {
        kb: KbConfig {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        },
        ..Default::default()
    };
    let ledger = Arc::new(InMemoryLedger::new());
    let seen_keys = Arc::new(Mutex::new(Vec::new()));

    let keys = seen_keys.clone();
    let factory: KbFactory = Arc::new(move |kb: &KbConfig| -> Result<Arc<dyn KnowledgeBase>> {
        let client: Arc<dyn KnowledgeBase> = Arc::new(ScriptedKb {
            api_key: kb.api_key()?.to_string(),
            seen_keys: keys.clone(),
        });
        Ok(client)
    });

    let app = router(&config, ledger.clone(), factory);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        ledger,
        seen_keys,
        http: reqwest::Client::new(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let srv = start(Some("key")).await;
    let body: Value = srv
        .http
        .get(format!("{}/health", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_delete_records_backup_and_operation() {
    let srv = start(Some("key")).await;

    let resp = srv
        .http
        .delete(format!("{}/documents/doc_42", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["document_name"], "Refund Policy");

    let backups: Value = srv
        .http
        .get(format!("{}/backups", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(backups[0]["document_id"], "doc_42");
    assert_eq!(backups[0]["type"], "pdf");

    let backup: Value = srv
        .http
        .get(format!("{}/backups/doc_42", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(backup["data"]["name"], "Refund Policy");

    let ops: Value = srv
        .http
        .get(format!("{}/operations?limit=5", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ops[0]["operation_type"], "delete");
    assert_eq!(ops[0]["status"], "success");
}

#[tokio::test]
async fn test_delete_of_missing_document_is_404_and_writes_nothing() {
    let srv = start(Some("key")).await;

    let resp = srv
        .http
        .delete(format!("{}/documents/missing", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(srv.ledger.backup_count(), 0);
    assert_eq!(srv.ledger.operation_count(), 0);
}

#[tokio::test]
async fn test_failed_remote_delete_is_502_and_logged() {
    let srv = start(Some("key")).await;

    let resp = srv
        .http
        .delete(format!("{}/documents/locked", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "remote_error");

    let ops = srv.ledger.get_operations(10).await.unwrap();
    assert_eq!(
        ops[0].error_message.as_deref(),
        Some("knowledge base returned HTTP 409: document locked")
    );
    assert!(srv.ledger.get_backup("locked").await.unwrap().is_some());
}

#[tokio::test]
async fn test_backup_not_found() {
    let srv = start(Some("key")).await;
    let resp = srv
        .http
        .get(format!("{}/backups/never", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_per_request_api_key() {
    let srv = start(None).await;

    // No configured key and no header: rejected before any remote call.
    let resp = srv
        .http
        .get(format!("{}/documents/doc_1", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = srv
        .http
        .get(format!("{}/documents/doc_1", srv.base))
        .header("X-Api-Key", "request-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(srv.seen_keys.lock().unwrap().as_slice(), ["request-key"]);

    // The header did not leak into server-wide config.
    let resp = srv
        .http
        .get(format!("{}/documents/doc_1", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_upload_validation() {
    let srv = start(Some("key")).await;

    let resp = srv
        .http
        .post(format!("{}/uploads/url", srv.base))
        .json(&json!({"url": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = srv
        .http
        .post(format!("{}/uploads/table", srv.base))
        .json(&json!({"name": "t", "items": {"not": "a list"}, "schema": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = srv
        .http
        .post(format!("{}/uploads/url", srv.base))
        .json(&json!({"url": "https://example.com", "metadata": "oops"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = srv
        .http
        .post(format!("{}/uploads/table", srv.base))
        .json(&json!({"name": "t", "items": [{"a": 1}, {"a": 2}], "schema": {"a": {"type": "number"}}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["rows"], 2);
}

#[tokio::test]
async fn test_query_and_list() {
    let srv = start(Some("key")).await;

    let body: Value = srv
        .http
        .post(format!("{}/query", srv.base))
        .json(&json!({"question": "hours?", "synthesis": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["output"].is_null());
    assert_eq!(body["chunks"][0]["content"], "chunk");

    let resp = srv
        .http
        .post(format!("{}/query", srv.base))
        .json(&json!({"question": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = srv
        .http
        .get(format!("{}/documents?limit=2", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_suggestions() {
    let srv = start(None).await;

    let body: Value = srv
        .http
        .post(format!("{}/suggest/chunk-size", srv.base))
        .json(&json!({"content_length": 10000, "document_type": "technical"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["suggested_chunk_size"], 1200);

    let body: Value = srv
        .http
        .post(format!("{}/suggest/metadata", srv.base))
        .json(&json!({"table_name": "customers"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["type"], "user_data");
}

#[tokio::test]
async fn test_upload_route_names_are_valid_document_ids() {
    let srv = start(Some("key")).await;

    for id in ["url", "table"] {
        let body: Value = srv
            .http
            .get(format!("{}/documents/{}", srv.base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"]["documentID"], id);
    }
}

#[tokio::test]
async fn test_blank_id_rejected_without_ledger_writes() {
    let srv = start(Some("key")).await;

    let resp = srv
        .http
        .delete(format!("{}/documents/%20%20", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(srv.ledger.backup_count(), 0);
    assert_eq!(srv.ledger.operation_count(), 0);
    assert!(srv.seen_keys.lock().unwrap().is_empty());
}
