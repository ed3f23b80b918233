//! Relational knowledge-base stores
//!
//! A [`KnowledgeStore`] holds flattened fuzzy systems in five relations
//! (systems, variables, terms, rule bases, rules) and hands them back as the
//! denormalized join rows the row grouper consumes.
//!
//! Two backends:
//! - [`MemoryStore`] - vectors in process memory, for tests and `--memory`
//! - [`SqliteStore`] - a SQLite file with cascading foreign keys

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fs;

use tracing::debug;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::FmlResult;
use crate::model::FuzzySystem;
use crate::rows::{group_system, FlattenStats, KnowledgeRow, RuleRow};

/// Storage collaborator for whole fuzzy systems
///
/// Read methods return rows ordered by parent insertion, then leaf
/// insertion. An unknown name yields no rows at all.
pub trait KnowledgeStore: Send + Sync {
    /// Rows of the system × variable × term outer join for one system
    fn knowledge_rows(&self, system: &str) -> FmlResult<Vec<KnowledgeRow>>;

    /// Rows of the system × rule base × rule outer join for one system
    fn rule_rows(&self, system: &str) -> FmlResult<Vec<RuleRow>>;

    /// Names of every stored system, in insertion order
    fn system_names(&self) -> FmlResult<Vec<String>>;

    /// Flatten and persist `system` as one unit
    ///
    /// Either every entity is stored or none is. A name already present is
    /// `DuplicateSystem`.
    fn store_system(&mut self, system: &FuzzySystem) -> FmlResult<FlattenStats>;

    /// Delete one system and everything under it; false if it was absent
    fn delete_system(&mut self, name: &str) -> FmlResult<bool>;

    /// Delete every system, returning how many there were
    fn delete_all(&mut self) -> FmlResult<usize>;

    fn contains_system(&self, name: &str) -> FmlResult<bool> {
        Ok(self.system_names()?.iter().any(|n| n == name))
    }

    /// Rebuild a stored system; the sentinel system when absent
    fn load_system(&self, name: &str) -> FmlResult<FuzzySystem> {
        let knowledge = self.knowledge_rows(name)?;
        let rules = self.rule_rows(name)?;
        debug!(system = name, knowledge_rows = knowledge.len(), rule_rows = rules.len(), "grouping rows");
        group_system(&knowledge, &rules)
    }
}

/// Open the backend named by `config`
pub fn open_store(config: &StoreConfig) -> FmlResult<Box<dyn KnowledgeStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config.resolved_database_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            debug!(path = %path.display(), "opening sqlite store");
            Ok(Box::new(SqliteStore::open(&path)?))
        }
    }
}
