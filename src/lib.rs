//! # kb-ledger
//!
//! A management console for a Voiceflow knowledge base that keeps a local
//! audit trail of deletions.
//!
//! Every delete made through this crate first copies the document's
//! current payload into a SQLite backup table, then deletes it remotely,
//! then appends an operation record with the outcome. The backup can be
//! inspected later and re-uploaded by hand.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │ CLI/HTTP │──▶│  delete    │──▶│ KnowledgeBase│──▶ Voiceflow API
//! │ (kbctl)  │   │ orchestr.  │   └──────────────┘
//! └──────────┘   └─────┬──────┘
//!                      ▼
//!                ┌──────────┐
//!                │  Ledger  │  operations + backups (SQLite)
//!                └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credential overrides |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Ledger schema |
//! | [`models`] | Ledger record types |
//! | [`ledger`] | Ledger trait, SQLite and in-memory backends, deleted-documents view |
//! | [`kb`] | Knowledge-base client trait and Voiceflow implementation |
//! | [`delete`] | Backup-then-delete orchestration |
//! | [`suggest`] | Metadata and chunk size heuristics |
//! | [`documents`] | CLI commands for remote documents |
//! | [`history`] | CLI commands for the ledger |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod db;
pub mod delete;
pub mod documents;
pub mod history;
pub mod kb;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod server;
pub mod suggest;
