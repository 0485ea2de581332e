//! Knowledge-base document commands.
//!
//! CLI entry points for uploading, querying, inspecting, updating, and
//! listing remote documents. Each takes the client as a trait object so
//! the same code runs against [`VoiceflowClient`](crate::kb::VoiceflowClient)
//! or a test double. JSON arguments are parsed by the caller (see
//! [`parse_json_arg`](crate::kb::parse_json_arg)) before anything here runs.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::Value;
use std::path::Path;

use crate::kb::{self, KnowledgeBase, QueryOptions, QueryResponse, TableUpload, UploadOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

const PREVIEW_CHARS: usize = 200;

fn print_upload_result(what: &str, response: &Value, verbose: bool) -> Result<()> {
    println!("{} uploaded successfully.", what);
    println!(
        "  Document ID: {}",
        kb::document_id(response).unwrap_or("(none returned)")
    );
    if verbose {
        println!("  Full response: {}", serde_json::to_string_pretty(response)?);
    }
    Ok(())
}

pub async fn run_upload_file(
    kb: &dyn KnowledgeBase,
    path: &Path,
    options: &UploadOptions,
    verbose: bool,
) -> Result<()> {
    let response = kb.upload_file(path, options).await?;
    print_upload_result("File", &response, verbose)
}

pub async fn run_upload_url(
    kb: &dyn KnowledgeBase,
    url: &str,
    name: Option<&str>,
    options: &UploadOptions,
    verbose: bool,
) -> Result<()> {
    let response = kb.upload_url(url, name, options).await?;
    print_upload_result("URL", &response, verbose)
}

/// Reads the row and schema JSON files into a [`TableUpload`].
pub fn load_table(name: &str, data_file: &Path, schema_file: &Path) -> Result<TableUpload> {
    let read_json = |path: &Path| -> Result<Value> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
    };
    TableUpload::from_json(name, read_json(data_file)?, read_json(schema_file)?)
}

pub async fn run_upload_table(
    kb: &dyn KnowledgeBase,
    table: &TableUpload,
    options: &UploadOptions,
    verbose: bool,
) -> Result<()> {
    let response = kb.upload_table(table, options).await?;
    print_upload_result("Table", &response, verbose)
}

pub async fn run_update(
    kb: &dyn KnowledgeBase,
    document_id: &str,
    path: &Path,
    options: &UploadOptions,
    verbose: bool,
) -> Result<()> {
    let response = kb.update_document(document_id, path, options).await?;
    println!("Document {} updated successfully.", document_id);
    if verbose {
        println!("  Full response: {}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}

/// Shortens chunk text for terminal display.
pub fn preview(content: &str, verbose: bool) -> String {
    if verbose || content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let cut: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

pub async fn run_query(
    kb: &dyn KnowledgeBase,
    question: &str,
    options: &QueryOptions,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let result = kb.query(question, options).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_query_text(question, &result, verbose),
    }
    Ok(())
}

fn print_query_text(question: &str, result: &QueryResponse, verbose: bool) {
    let rule = "=".repeat(60);
    println!();
    println!("{}", rule);
    println!("Question: {}", question);
    println!("{}", rule);

    if let Some(output) = result.output.as_deref().filter(|o| !o.is_empty()) {
        println!();
        println!("Answer:");
        println!("{}", output);
        println!();
    }

    if !result.chunks.is_empty() {
        println!("Found {} relevant chunks:", result.chunks.len());
        println!();
        for (i, chunk) in result.chunks.iter().enumerate() {
            let score = chunk
                .score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "N/A".to_string());
            println!("  [{}] Score: {}", i + 1, score);
            println!("      {}", preview(&chunk.content, verbose));
            println!();
        }
    }
}

pub async fn run_get(kb: &dyn KnowledgeBase, document_id: &str, format: OutputFormat) -> Result<()> {
    let response = kb.get_document(document_id).await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let data = response.get("data").cloned().unwrap_or(Value::Null);
    let field = |key: &str| {
        data.get(key)
            .map(display_value)
            .unwrap_or_else(|| "-".to_string())
    };

    println!("--- Document ---");
    println!("id:       {}", field("documentID"));
    println!("name:     {}", field("name"));
    println!("type:     {}", field("type"));
    println!("status:   {}", field("status"));
    if let Some(metadata) = data.get("metadata").filter(|m| !m.is_null()) {
        println!("metadata: {}", serde_json::to_string_pretty(metadata)?);
    }
    Ok(())
}

pub async fn run_list(
    kb: &dyn KnowledgeBase,
    limit: u32,
    offset: u32,
    format: OutputFormat,
) -> Result<()> {
    let docs = kb.list_documents(limit, offset).await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    println!("Documents (showing {}):", docs.len());
    println!();
    for doc in &docs {
        println!(
            "  * {}",
            doc.get("name").and_then(Value::as_str).unwrap_or("Unnamed")
        );
        println!(
            "    ID:   {}",
            doc.get("documentID").map(display_value).unwrap_or_default()
        );
        println!(
            "    Type: {}",
            doc.get("type").map(display_value).unwrap_or_default()
        );
        println!();
    }
    Ok(())
}

// Strings print bare; anything else prints as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "a".repeat(250);
        let short = preview(&long, false);
        assert_eq!(short.len(), 203);
        assert!(short.ends_with("..."));
        assert_eq!(preview(&long, true), long);
        assert_eq!(preview("short", false), "short");
    }

    #[test]
    fn test_preview_is_char_safe() {
        let text = "é".repeat(201);
        assert_eq!(preview(&text, false).chars().count(), 203);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("pdf")), "pdf");
        assert_eq!(display_value(&json!(3)), "3");
    }

    #[test]
    fn test_load_table_from_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let data = tmp.path().join("rows.json");
        let schema = tmp.path().join("schema.json");
        std::fs::write(&data, r#"[{"id": 1}]"#).unwrap();
        std::fs::write(&schema, r#"{"id": {"type": "number", "searchable": true}}"#).unwrap();

        let table = load_table("products", &data, &schema).unwrap();
        assert_eq!(table.items.len(), 1);

        std::fs::write(&schema, "not json").unwrap();
        let err = load_table("products", &data, &schema).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }
}
