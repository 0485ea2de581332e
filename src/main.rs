//! # kbctl
//!
//! Command-line console for a Voiceflow knowledge base with a local
//! delete-backup ledger.
//!
//! ## Usage
//!
//! ```bash
//! kbctl --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbctl init` | Create the ledger database |
//! | `kbctl upload-file <file>` | Upload a PDF/TXT/DOCX file |
//! | `kbctl upload-url <url>` | Upload a web page |
//! | `kbctl upload-table <name>` | Upload tabular data |
//! | `kbctl query "<question>"` | Query the knowledge base |
//! | `kbctl get <id>` | Show a document |
//! | `kbctl delete <id>` | Back up, delete, and log a document |
//! | `kbctl update <id> <file>` | Replace a document's file |
//! | `kbctl list` | List documents |
//! | `kbctl operations` | Show the operation log |
//! | `kbctl backups` | Show deleted documents that have backups |
//! | `kbctl backup <id>` | Print a document's backed-up payload |
//! | `kbctl suggest ...` | Metadata / chunk size heuristics |
//! | `kbctl serve` | Start the HTTP API |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use kb_ledger::config::{self, Config};
use kb_ledger::documents::{self, OutputFormat};
use kb_ledger::kb::{parse_json_arg, QueryOptions, UploadOptions, VoiceflowClient};
use kb_ledger::ledger::SqliteLedger;
use kb_ledger::{delete, history, migrate, server, suggest};

/// kbctl: manage a Voiceflow knowledge base and keep a local backup of
/// everything you delete.
#[derive(Parser)]
#[command(name = "kbctl", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// API key; overrides the config file and `VF_API_KEY`.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Project id; overrides the config file and `VF_PROJECT_ID`.
    #[arg(long, global = true)]
    project_id: Option<String>,

    /// Print full responses and untruncated chunks.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger database and tables. Safe to run repeatedly.
    Init,

    /// Upload a file.
    UploadFile {
        file: PathBuf,
        /// Metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
        /// Replace an existing document with the same name.
        #[arg(long)]
        overwrite: bool,
        #[arg(long, conflicts_with = "auto_chunk_size")]
        max_chunk_size: Option<u32>,
        /// Pick `maxChunkSize` from the file size and `--doc-type`.
        #[arg(long)]
        auto_chunk_size: bool,
        /// Document type used by `--auto-chunk-size`.
        #[arg(long, default_value = "general")]
        doc_type: String,
    },

    /// Upload a URL.
    UploadUrl {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        overwrite: bool,
        #[arg(long)]
        max_chunk_size: Option<u32>,
    },

    /// Upload table data from JSON files.
    UploadTable {
        name: String,
        /// JSON array of row objects.
        #[arg(long)]
        data_file: PathBuf,
        /// JSON object: column -> {"type": .., "searchable": bool}.
        #[arg(long)]
        schema_file: PathBuf,
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },

    /// Query the knowledge base.
    Query {
        question: String,
        /// Maximum chunks to return.
        #[arg(long, default_value_t = 5)]
        limit: u32,
        /// Return chunks only, without a synthesized answer.
        #[arg(long)]
        no_synthesis: bool,
        /// Metadata filter as JSON, e.g. '{"$eq": {"category": "faq"}}'.
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show a document.
    Get {
        document_id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Delete a document after backing it up to the ledger.
    Delete {
        document_id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        confirm: bool,
    },

    /// Replace a document's file.
    Update {
        document_id: String,
        file: PathBuf,
        #[arg(long)]
        metadata: Option<String>,
    },

    /// List documents.
    List {
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show recent ledger operations, newest first.
    Operations {
        #[arg(long, default_value_t = 100)]
        limit: i64,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show deleted documents that have a backup.
    Backups {
        #[arg(long, default_value_t = 100)]
        limit: i64,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the backed-up payload of a document as JSON.
    Backup {
        document_id: String,
        /// Print every backup, newest first.
        #[arg(long)]
        history: bool,
    },

    /// Upload heuristics.
    Suggest {
        #[command(subcommand)]
        action: SuggestAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum SuggestAction {
    /// Suggest metadata from a file name, URL, or table name.
    Metadata {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        table: Option<String>,
    },
    /// Suggest a chunk size.
    ChunkSize {
        /// Content length in characters.
        #[arg(long)]
        length: Option<u64>,
        /// Measure this file instead of `--length`.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "general")]
        doc_type: String,
    },
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

fn confirm_delete(document_id: &str) -> Result<bool> {
    print!(
        "Are you sure you want to delete document {}? (yes/no): ",
        document_id
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

fn upload_options(
    metadata: Option<&str>,
    overwrite: bool,
    max_chunk_size: Option<u32>,
) -> Result<UploadOptions> {
    Ok(UploadOptions {
        metadata: parse_json_arg("metadata", metadata)?,
        overwrite: overwrite.then_some(true),
        max_chunk_size,
        ..Default::default()
    })
}

fn client(cfg: &Config) -> Result<VoiceflowClient> {
    VoiceflowClient::new(&cfg.kb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger();

    let mut cfg = config::load_config(&cli.config)?;
    cfg.kb = cfg.kb.with_credentials(cli.api_key, cli.project_id);
    let verbose = cli.verbose;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Ledger initialized at {}.", cfg.db.path.display());
        }
        Commands::UploadFile {
            file,
            metadata,
            overwrite,
            max_chunk_size,
            auto_chunk_size,
            doc_type,
        } => {
            let chunk_size = if auto_chunk_size {
                let size = suggest::calculate_optimal_chunk_size(None, Some(&file), &doc_type);
                log::info!("using maxChunkSize {}", size);
                Some(size)
            } else {
                max_chunk_size
            };
            let options = upload_options(metadata.as_deref(), overwrite, chunk_size)?;
            documents::run_upload_file(&client(&cfg)?, &file, &options, verbose).await?;
        }
        Commands::UploadUrl {
            url,
            name,
            metadata,
            overwrite,
            max_chunk_size,
        } => {
            let options = upload_options(metadata.as_deref(), overwrite, max_chunk_size)?;
            documents::run_upload_url(&client(&cfg)?, &url, name.as_deref(), &options, verbose)
                .await?;
        }
        Commands::UploadTable {
            name,
            data_file,
            schema_file,
            metadata,
            overwrite,
        } => {
            let options = upload_options(metadata.as_deref(), overwrite, None)?;
            let table = documents::load_table(&name, &data_file, &schema_file)?;
            documents::run_upload_table(&client(&cfg)?, &table, &options, verbose).await?;
        }
        Commands::Query {
            question,
            limit,
            no_synthesis,
            metadata,
            format,
        } => {
            let options = QueryOptions {
                chunk_limit: limit,
                synthesis: !no_synthesis,
                metadata: parse_json_arg("metadata", metadata.as_deref())?,
                tags: None,
            };
            documents::run_query(&client(&cfg)?, &question, &options, format, verbose).await?;
        }
        Commands::Get {
            document_id,
            format,
        } => {
            documents::run_get(&client(&cfg)?, &document_id, format).await?;
        }
        Commands::Delete {
            document_id,
            confirm,
        } => {
            let kb = client(&cfg)?;
            if !confirm && !confirm_delete(&document_id)? {
                println!("Deletion cancelled.");
                return Ok(());
            }
            let ledger = SqliteLedger::open(&cfg).await?;
            let result = delete::run_delete(&kb, &ledger, &document_id, verbose).await;
            ledger.close().await;
            result?;
        }
        Commands::Update {
            document_id,
            file,
            metadata,
        } => {
            let options = upload_options(metadata.as_deref(), false, None)?;
            documents::run_update(&client(&cfg)?, &document_id, &file, &options, verbose).await?;
        }
        Commands::List {
            limit,
            offset,
            format,
        } => {
            documents::run_list(&client(&cfg)?, limit, offset, format).await?;
        }
        Commands::Operations { limit, format } => {
            let ledger = SqliteLedger::open(&cfg).await?;
            history::run_operations(&ledger, limit, format).await?;
            ledger.close().await;
        }
        Commands::Backups { limit, format } => {
            let ledger = SqliteLedger::open(&cfg).await?;
            history::run_deleted(&ledger, limit, format).await?;
            ledger.close().await;
        }
        Commands::Backup {
            document_id,
            history: all,
        } => {
            let ledger = SqliteLedger::open(&cfg).await?;
            let result = history::run_backup(&ledger, &document_id, all).await;
            ledger.close().await;
            result?;
        }
        Commands::Suggest { action } => match action {
            SuggestAction::Metadata { file, url, table } => {
                suggest::run_suggest_metadata(file.as_deref(), url.as_deref(), table.as_deref())?;
            }
            SuggestAction::ChunkSize {
                length,
                file,
                doc_type,
            } => {
                let size =
                    suggest::calculate_optimal_chunk_size(length, file.as_deref(), &doc_type);
                println!("{}", size);
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
