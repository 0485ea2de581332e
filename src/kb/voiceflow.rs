//! HTTPS client for the Voiceflow Knowledge Base API.
//!
//! Endpoints used:
//!
//! | Method | Path | Base |
//! |--------|------|------|
//! | `POST` | `/v1/knowledge-base/docs/upload` | `base_url` (multipart or JSON) |
//! | `POST` | `/v1/knowledge-base/docs/upload/table` | `base_url` |
//! | `GET` / `DELETE` | `/v1/knowledge-base/docs/{id}` | `base_url` |
//! | `PUT` | `/v1/knowledge-base/docs/{id}/upload` | `base_url` (multipart) |
//! | `GET` | `/v1/knowledge-base/docs?limit&offset` | `base_url` |
//! | `POST` | `/knowledge-base/query` | `query_url` |
//!
//! Document ids are sent as one percent-encoded path segment.
//! The API key goes verbatim into the `Authorization` header (no
//! `Bearer` prefix). Non-2xx responses become [`RemoteCallError`]s
//! immediately; there is no retry or backoff.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::KbConfig;

use super::{
    url_payload, validate_document_id, KnowledgeBase, QueryOptions, QueryResponse,
    RemoteCallError, TableUpload, UploadOptions,
};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub struct VoiceflowClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    query_url: String,
}

impl VoiceflowClient {
    /// Builds a client from explicit configuration.
    ///
    /// Each client owns its credentials; nothing is read from or written
    /// to process-wide state.
    pub fn new(config: &KbConfig) -> Result<Self> {
        let api_key = config.api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        log::debug!(
            "knowledge base client for project {} at {}",
            config.project_id.as_deref().unwrap_or("(unset)"),
            config.base_url
        );

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            query_url: config.query_url.trim_end_matches('/').to_string(),
        })
    }

    fn docs_url(&self, suffix: &str) -> String {
        format!("{}/v1/knowledge-base/docs{}", self.base_url, suffix)
    }

    /// URL of a single document. The id becomes exactly one path segment;
    /// `/`, `?`, `#` and `%` in it are percent-encoded.
    fn document_url(&self, document_id: &str, extra: &[&str]) -> Result<Url> {
        validate_document_id(document_id)?;
        let mut url = Url::parse(&self.docs_url(""))
            .with_context(|| format!("invalid knowledge base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("knowledge base URL cannot have a path: {}", self.base_url))?
            .push(document_id)
            .extend(extra);
        Ok(url)
    }

    fn json_body(&self, request: RequestBuilder, body: &Value) -> Result<RequestBuilder> {
        Ok(request
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(serde_json::to_vec(body)?))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .header(AUTHORIZATION, &self.api_key)
            .send()
            .await
            .map_err(|e| RemoteCallError {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RemoteCallError {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RemoteCallError {
                status: Some(status.as_u16()),
                body: text,
            }
            .into());
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .with_context(|| format!("knowledge base returned non-JSON body (HTTP {})", status))
    }
}

async fn file_form(path: &Path, options: &UploadOptions) -> Result<Form> {
    if !path.is_file() {
        bail!("File not found: {}", path.display());
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let mut form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
    if let Some(tags) = options.tags.as_ref().filter(|t| !t.is_null()) {
        form = form.text("tags", serde_json::to_string(tags)?);
    }
    if let Some(metadata) = options.metadata.as_ref().filter(|m| !m.is_null()) {
        form = form.text("metadata", serde_json::to_string(metadata)?);
    }
    Ok(form)
}

#[async_trait]
impl KnowledgeBase for VoiceflowClient {
    async fn get_document(&self, document_id: &str) -> Result<Value> {
        let url = self.document_url(document_id, &[])?;
        self.send(self.http.get(url).header(CONTENT_TYPE, JSON_CONTENT_TYPE))
            .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<Value> {
        let url = self.document_url(document_id, &[])?;
        self.send(self.http.delete(url).header(CONTENT_TYPE, JSON_CONTENT_TYPE))
            .await
    }

    async fn upload_file(&self, path: &Path, options: &UploadOptions) -> Result<Value> {
        let form = file_form(path, options).await?;
        let request = self
            .http
            .post(self.docs_url("/upload"))
            .query(&options.query_params())
            .multipart(form);
        self.send(request).await
    }

    async fn upload_url(
        &self,
        url: &str,
        name: Option<&str>,
        options: &UploadOptions,
    ) -> Result<Value> {
        let body = url_payload(url, name, options);
        let request = self
            .http
            .post(self.docs_url("/upload"))
            .query(&options.query_params());
        self.send(self.json_body(request, &body)?).await
    }

    async fn upload_table(&self, table: &TableUpload, options: &UploadOptions) -> Result<Value> {
        let body = table.payload(options);
        let request = self
            .http
            .post(self.docs_url("/upload/table"))
            .query(&options.query_params());
        self.send(self.json_body(request, &body)?).await
    }

    async fn update_document(
        &self,
        document_id: &str,
        path: &Path,
        options: &UploadOptions,
    ) -> Result<Value> {
        let url = self.document_url(document_id, &["upload"])?;
        let form = file_form(path, options).await?;
        let request = self
            .http
            .put(url)
            .multipart(form);
        self.send(request).await
    }

    async fn query(&self, question: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let body = options.payload(question);
        let request = self
            .http
            .post(format!("{}/knowledge-base/query", self.query_url));
        let value = self.send(self.json_body(request, &body)?).await?;
        serde_json::from_value(value).context("unexpected query response shape")
    }

    async fn list_documents(&self, limit: u32, offset: u32) -> Result<Vec<Value>> {
        let request = self
            .http
            .get(self.docs_url(""))
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .query(&[("limit", limit), ("offset", offset)]);
        let value = self.send(request).await?;
        Ok(match value.get("data") {
            Some(Value::Array(docs)) => docs.clone(),
            _ => Vec::new(),
        })
    }
}
