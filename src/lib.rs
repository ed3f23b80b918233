//! fmlkb - Fuzzy Markup Language knowledge base
//!
//! Reads and writes fuzzy inference systems in FML, the XML vocabulary for
//! Mamdani systems, and keeps them in a relational store.
//!
//! # Architecture
//!
//! - [`model`] - the document model: system, variables, terms, rule base
//! - [`model::Shape`] - registry of membership-function shapes and their arity
//! - [`codec`] - FML text to document model and back
//! - [`rows`] - join rows to document model ([`rows::group_system`]) and
//!   document model to per-entity records ([`rows::flatten`])
//! - [`store`] - the [`KnowledgeStore`] trait with memory and SQLite backends
//! - [`service`] - codec plus store, driven by the CLI and the HTTP server
//!
//! # Example
//!
//! ```rust,ignore
//! use fmlkb::{CodecOptions, KnowledgeBaseService, MemoryStore};
//!
//! let mut service = KnowledgeBaseService::new(Box::new(MemoryStore::new()), CodecOptions::default());
//! service.put_fml(&std::fs::read_to_string("tipper.fml")?)?;
//! let fml = service.fetch_fml("tipper")?.unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod rows;
pub mod server;
pub mod service;
pub mod store;

// Re-export document model types
pub use model::{
    AntecedentClause, ConsequentClause, FuzzySystem, FuzzyTerm, FuzzyVariable, KnowledgeBase,
    MamdaniRuleBase, Rule, Shape, TermParams,
};

// Re-export codec entry points
pub use codec::{parse, serialize, CodecOptions};

// Re-export row types
pub use rows::{flatten, group_system, FlattenStats, KnowledgeRow, RowSink, RuleRow};

// Re-export store types
pub use store::{open_store, KnowledgeStore, MemoryStore, SqliteStore};

// Re-export the service
pub use service::{KnowledgeBaseService, Upload};

// Re-export async server types
pub use server::{create_router, run_server, AppState, ServerConfig};

// Re-export configuration types
pub use config::{ConfigError, FmlConfig, GeneralConfig, LogLevel, StoreBackend, StoreConfig};

// Re-export error types
pub use error::{ErrorCode, ErrorContext, ErrorResponse, FmlError, FmlResult};
