//! Upload heuristics: chunk size and metadata suggestions.
//!
//! Pure functions; nothing here touches the network or the ledger.

use serde_json::{json, Map, Value};
use std::path::Path;

/// Suggests a `maxChunkSize` (500–1500) for a document.
///
/// `content_length` wins over `file_path`; when neither yields a size the
/// content is treated as empty. `document_type` is one of `faq`,
/// `technical`, `marketing`, `general`, `code`, `table` (case-insensitive;
/// anything else counts as `general`).
pub fn calculate_optimal_chunk_size(
    content_length: Option<u64>,
    file_path: Option<&Path>,
    document_type: &str,
) -> u32 {
    let length = content_length
        .or_else(|| file_path.and_then(|p| std::fs::metadata(p).ok()).map(|m| m.len()))
        .unwrap_or(0);

    let base: u32 = match document_type.to_lowercase().as_str() {
        "faq" => 600,
        "technical" => 1200,
        "marketing" => 800,
        "code" => 1400,
        "table" => 700,
        _ => 1000,
    };

    match length {
        0..=999 => base.saturating_sub(200).min(700).max(500),
        1000..=4999 => base.saturating_sub(100).min(900).max(600),
        5000..=19999 => base,
        20000..=49999 => (base + 100).min(1300),
        _ => (base + 200).min(1500),
    }
}

/// Suggests metadata for an upload.
///
/// Only the first non-empty source is considered, in the order file,
/// URL, table name. Whitespace counts as content: `"  "` is a file name.
pub fn generate_metadata_suggestions(
    file_path: Option<&str>,
    url: Option<&str>,
    table_name: Option<&str>,
) -> Map<String, Value> {
    let present = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(str::to_string);

    if let Some(file) = present(file_path) {
        file_metadata(&file)
    } else if let Some(url) = present(url) {
        url_metadata(&url)
    } else if let Some(table) = present(table_name) {
        table_metadata(&table)
    } else {
        Map::new()
    }
}

fn set(meta: &mut Map<String, Value>, doc_type: &str, category: &str) {
    meta.insert("type".into(), json!(doc_type));
    meta.insert("category".into(), json!(category));
}

fn file_metadata(file: &str) -> Map<String, Value> {
    let path = Path::new(file);
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut meta = Map::new();
    let category = match extension.as_str() {
        "pdf" | "docx" | "doc" | "md" => "documentation",
        "txt" => "text",
        "csv" | "json" | "xml" => "data",
        _ => "document",
    };
    meta.insert("category".into(), json!(category));

    let lower = filename.to_lowercase();
    if lower.contains("faq") {
        set(&mut meta, "faq", "support");
    } else if lower.contains("guide") || lower.contains("manual") {
        set(&mut meta, "guide", "documentation");
    } else if lower.contains("spec") || lower.contains("technical") {
        set(&mut meta, "technical", "documentation");
    } else if lower.contains("product") || lower.contains("catalog") {
        set(&mut meta, "catalog", "products");
    }

    meta.insert("source".into(), json!("file_upload"));
    meta.insert("filename".into(), json!(filename));
    meta
}

fn url_metadata(raw: &str) -> Map<String, Value> {
    let (domain, path) = match url::Url::parse(raw) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_string();
            let domain = match parsed.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            };
            (domain, parsed.path().to_string())
        }
        // Schemeless input such as "example.com/docs" has no authority.
        Err(_) => (String::new(), raw.to_string()),
    };

    let mut meta = Map::new();
    meta.insert("source".into(), json!("url"));
    meta.insert("domain".into(), json!(domain));
    meta.insert("category".into(), json!("web_content"));

    let lower = path.to_lowercase();
    if lower.contains("/blog") || lower.contains("/article") {
        set(&mut meta, "blog", "content");
    } else if lower.contains("/docs") || lower.contains("/documentation") {
        set(&mut meta, "documentation", "docs");
    } else if lower.contains("/faq") || lower.contains("/help") {
        set(&mut meta, "faq", "support");
    } else if lower.contains("/api") {
        set(&mut meta, "api_reference", "technical");
    } else if lower.contains("/product") {
        set(&mut meta, "product_page", "products");
    }
    meta
}

fn table_metadata(name: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("source".into(), json!("table_upload"));
    set(&mut meta, "table", "structured_data");

    let lower = name.to_lowercase();
    if lower.contains("product") || lower.contains("catalog") {
        set(&mut meta, "product_catalog", "products");
    } else if lower.contains("customer") || lower.contains("user") {
        set(&mut meta, "user_data", "users");
    } else if lower.contains("price") || lower.contains("pricing") {
        set(&mut meta, "pricing_table", "pricing");
    } else if lower.contains("faq") {
        set(&mut meta, "faq_table", "support");
    }
    meta
}

/// Prints suggestions for the `kbctl suggest metadata` command.
pub fn run_suggest_metadata(
    file: Option<&str>,
    url: Option<&str>,
    table: Option<&str>,
) -> anyhow::Result<()> {
    let meta = generate_metadata_suggestions(file, url, table);
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_chunk_size_bands_general() {
        assert_eq!(calculate_optimal_chunk_size(Some(10), None, "general"), 700);
        assert_eq!(calculate_optimal_chunk_size(Some(2_000), None, "general"), 900);
        assert_eq!(calculate_optimal_chunk_size(Some(10_000), None, "general"), 1000);
        assert_eq!(calculate_optimal_chunk_size(Some(30_000), None, "general"), 1100);
        assert_eq!(calculate_optimal_chunk_size(Some(100_000), None, "general"), 1200);
    }

    #[test]
    fn test_chunk_size_respects_floors_and_caps() {
        // faq: 600 - 200 = 400, floored at 500
        assert_eq!(calculate_optimal_chunk_size(Some(0), None, "FAQ"), 500);
        // code: 1400 + 100 capped at 1300
        assert_eq!(calculate_optimal_chunk_size(Some(25_000), None, "code"), 1300);
        // code: 1400 + 200 capped at 1500
        assert_eq!(calculate_optimal_chunk_size(Some(60_000), None, "code"), 1500);
        // unknown type behaves like general
        assert_eq!(calculate_optimal_chunk_size(Some(10_000), None, "poetry"), 1000);
    }

    #[test]
    fn test_chunk_size_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'x'; 6_000]).unwrap();
        assert_eq!(
            calculate_optimal_chunk_size(None, Some(file.path()), "technical"),
            1200
        );
        // unreadable file counts as empty
        assert_eq!(
            calculate_optimal_chunk_size(None, Some(Path::new("/no/such/file")), "technical"),
            700
        );
    }

    #[test]
    fn test_file_metadata() {
        let meta = generate_metadata_suggestions(Some("docs/Store_FAQ.pdf"), None, None);
        assert_eq!(meta["type"], "faq");
        assert_eq!(meta["category"], "support");
        assert_eq!(meta["source"], "file_upload");
        assert_eq!(meta["filename"], "Store_FAQ.pdf");

        let meta = generate_metadata_suggestions(Some("notes.txt"), None, None);
        assert_eq!(meta["category"], "text");
        assert!(meta.get("type").is_none());
    }

    #[test]
    fn test_url_metadata() {
        let meta =
            generate_metadata_suggestions(None, Some("https://example.com/docs/setup"), None);
        assert_eq!(meta["domain"], "example.com");
        assert_eq!(meta["type"], "documentation");
        assert_eq!(meta["category"], "docs");

        let meta = generate_metadata_suggestions(None, Some("https://example.com/"), None);
        assert_eq!(meta["category"], "web_content");
    }

    #[test]
    fn test_table_metadata() {
        let meta = generate_metadata_suggestions(None, None, Some("Pricing 2024"));
        assert_eq!(meta["type"], "pricing_table");
        assert_eq!(meta["category"], "pricing");
        assert_eq!(meta["source"], "table_upload");
    }

    #[test]
    fn test_first_source_wins_and_empty() {
        let meta = generate_metadata_suggestions(Some(""), Some("https://a.io/blog/x"), Some("faq"));
        assert_eq!(meta["type"], "blog");
        assert!(generate_metadata_suggestions(None, None, None).is_empty());
    }

    #[test]
    fn test_whitespace_source_is_not_skipped() {
        let meta = generate_metadata_suggestions(Some("  "), Some("https://a.io/blog/x"), None);
        assert_eq!(meta["source"], "file_upload");
        assert_eq!(meta["filename"], "  ");
        assert_eq!(meta["category"], "document");
    }
}
