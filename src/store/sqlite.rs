//! SQLite-backed knowledge store
//!
//! One table per entity, each child keyed to its parent with
//! `ON DELETE CASCADE`. Rule clause arrays are stored as JSON text columns.
//!
//! # Usage
//!
//! ```ignore
//! use fmlkb::store::{KnowledgeStore, SqliteStore};
//!
//! let mut store = SqliteStore::open("fmlkb.db")?;
//! store.store_system(&system)?;
//! let again = store.load_system(&system.name)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::KnowledgeStore;
use crate::error::{FmlError, FmlResult};
use crate::model::FuzzySystem;
use crate::rows::{
    flatten, FlattenStats, KnowledgeRow, RowSink, RuleBaseRecord, RuleRecord, RuleRow,
    SystemRecord, TermRecord, VariableRecord,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS systems (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        network_address TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS variables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        system_id INTEGER NOT NULL REFERENCES systems(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        domain_left REAL NOT NULL,
        domain_right REAL NOT NULL,
        scale TEXT NOT NULL,
        default_value REAL NOT NULL,
        accumulation TEXT NOT NULL,
        defuzzifier TEXT NOT NULL,
        type TEXT NOT NULL,
        UNIQUE(system_id, name)
    );

    CREATE TABLE IF NOT EXISTS terms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        variable_id INTEGER NOT NULL REFERENCES variables(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        complement INTEGER NOT NULL,
        param1 REAL,
        param2 REAL,
        param3 REAL,
        param4 REAL,
        shape TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS rule_bases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        system_id INTEGER NOT NULL REFERENCES systems(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        and_method TEXT NOT NULL,
        or_method TEXT NOT NULL,
        activation_method TEXT NOT NULL
    );

    -- clause columns hold JSON arrays, index-aligned per rule
    CREATE TABLE IF NOT EXISTS rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rule_base_id INTEGER NOT NULL REFERENCES rule_bases(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        connector TEXT NOT NULL,
        or_method TEXT NOT NULL,
        weight REAL NOT NULL,
        and_method TEXT,
        antecedent_variables TEXT NOT NULL,
        antecedent_terms TEXT NOT NULL,
        antecedent_modifiers TEXT NOT NULL,
        consequent_variables TEXT NOT NULL,
        consequent_terms TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_variables_system ON variables(system_id);
    CREATE INDEX IF NOT EXISTS idx_terms_variable ON terms(variable_id);
    CREATE INDEX IF NOT EXISTS idx_rule_bases_system ON rule_bases(system_id);
    CREATE INDEX IF NOT EXISTS idx_rules_rule_base ON rules(rule_base_id);
"#;

const KNOWLEDGE_QUERY: &str = r#"
    SELECT s.name, s.network_address,
           v.name, v.domain_left, v.domain_right, v.scale, v.default_value,
           v.accumulation, v.defuzzifier, v.type,
           t.name, t.complement, t.param1, t.param2, t.param3, t.param4, t.shape
    FROM systems s
    LEFT JOIN variables v ON v.system_id = s.id
    LEFT JOIN terms t ON t.variable_id = v.id
    WHERE s.name = ?1
    ORDER BY v.id, t.id
"#;

const RULE_QUERY: &str = r#"
    SELECT s.name, s.network_address,
           rb.name, rb.and_method, rb.or_method, rb.activation_method,
           r.name, r.connector, r.or_method, r.weight, r.and_method,
           r.antecedent_variables, r.antecedent_terms, r.antecedent_modifiers,
           r.consequent_variables, r.consequent_terms
    FROM systems s
    LEFT JOIN rule_bases rb ON rb.system_id = s.id
    LEFT JOIN rules r ON r.rule_base_id = rb.id
    WHERE s.name = ?1
    ORDER BY rb.id, r.id
"#;

/// Knowledge store in a SQLite database
#[derive(Debug)]
pub struct SqliteStore {
    /// Database connection (wrapped in Mutex for Sync)
    conn: Mutex<Connection>,
    /// File backing the store; `None` when in memory
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open a SQLite store at the given path
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> FmlResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let mut store = Self::from_connection(conn)?;
        store.path = Some(path.as_ref().to_path_buf());
        Ok(store)
    }

    /// Create an in-memory SQLite store
    ///
    /// Data is lost when the store is dropped.
    pub fn in_memory() -> FmlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> FmlResult<Self> {
        // foreign keys are off by default and per connection
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> FmlResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FmlError::store("sqlite connection lock poisoned"))
    }
}

/// Decode a nullable JSON text column
fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(index)?;
    text.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn knowledge_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeRow> {
    Ok(KnowledgeRow {
        system_name: row.get(0)?,
        network_address: row.get(1)?,
        variable_name: row.get(2)?,
        domain_left: row.get(3)?,
        domain_right: row.get(4)?,
        scale: row.get(5)?,
        default_value: row.get(6)?,
        accumulation: row.get(7)?,
        defuzzifier: row.get(8)?,
        variable_type: row.get(9)?,
        term_name: row.get(10)?,
        complement: row.get(11)?,
        params: [row.get(12)?, row.get(13)?, row.get(14)?, row.get(15)?],
        shape: row.get(16)?,
    })
}

fn rule_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        system_name: row.get(0)?,
        network_address: row.get(1)?,
        rule_base_name: row.get(2)?,
        and_method: row.get(3)?,
        or_method: row.get(4)?,
        activation_method: row.get(5)?,
        rule_name: row.get(6)?,
        connector: row.get(7)?,
        rule_or_method: row.get(8)?,
        weight: row.get(9)?,
        rule_and_method: row.get(10)?,
        antecedent_variables: json_column(row, 11)?,
        antecedent_terms: json_column(row, 12)?,
        antecedent_modifiers: json_column(row, 13)?,
        consequent_variables: json_column(row, 14)?,
        consequent_terms: json_column(row, 15)?,
    })
}

// ============================================================================
// Write path
// ============================================================================

/// Row sink writing into an open transaction
struct SqliteSink<'c> {
    tx: Transaction<'c>,
}

impl RowSink for SqliteSink<'_> {
    type Key = i64;

    fn insert_system(&mut self, record: SystemRecord) -> FmlResult<i64> {
        self.tx.execute(
            "INSERT INTO systems (name, network_address) VALUES (?1, ?2)",
            params![record.name, record.network_address],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn insert_variable(&mut self, record: VariableRecord, system: &i64) -> FmlResult<i64> {
        self.tx.execute(
            "INSERT INTO variables (system_id, name, domain_left, domain_right, scale, default_value, \
             accumulation, defuzzifier, type) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                system,
                record.name,
                record.domain_left,
                record.domain_right,
                record.scale,
                record.default_value,
                record.accumulation,
                record.defuzzifier,
                record.var_type,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn insert_term(&mut self, record: TermRecord, variable: &i64) -> FmlResult<()> {
        let [p1, p2, p3, p4] = record.params;
        self.tx.execute(
            "INSERT INTO terms (variable_id, name, complement, param1, param2, param3, param4, shape) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![variable, record.name, record.complement, p1, p2, p3, p4, record.shape],
        )?;
        Ok(())
    }

    fn insert_rule_base(&mut self, record: RuleBaseRecord, system: &i64) -> FmlResult<i64> {
        self.tx.execute(
            "INSERT INTO rule_bases (system_id, name, and_method, or_method, activation_method) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                system,
                record.name,
                record.and_method,
                record.or_method,
                record.activation_method,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn insert_rule(&mut self, record: RuleRecord, rule_base: &i64) -> FmlResult<()> {
        let clauses = &record.clauses;
        self.tx.execute(
            "INSERT INTO rules (rule_base_id, name, connector, or_method, weight, and_method, \
             antecedent_variables, antecedent_terms, antecedent_modifiers, consequent_variables, \
             consequent_terms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                rule_base,
                record.name,
                record.connector,
                record.or_method,
                record.weight,
                record.and_method,
                serde_json::to_string(&clauses.antecedent_variables)?,
                serde_json::to_string(&clauses.antecedent_terms)?,
                serde_json::to_string(&clauses.antecedent_modifiers)?,
                serde_json::to_string(&clauses.consequent_variables)?,
                serde_json::to_string(&clauses.consequent_terms)?,
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// KnowledgeStore
// ============================================================================

impl KnowledgeStore for SqliteStore {
    fn knowledge_rows(&self, system: &str) -> FmlResult<Vec<KnowledgeRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(KNOWLEDGE_QUERY)?;
        let rows = stmt
            .query_map(params![system], knowledge_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn rule_rows(&self, system: &str) -> FmlResult<Vec<RuleRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(RULE_QUERY)?;
        let rows = stmt
            .query_map(params![system], rule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn system_names(&self) -> FmlResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT name FROM systems ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn contains_system(&self, name: &str) -> FmlResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row("SELECT id FROM systems WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn store_system(&mut self, system: &FuzzySystem) -> FmlResult<FlattenStats> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM systems WHERE name = ?1", params![system.name], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(FmlError::duplicate_system(&system.name));
        }

        let mut sink = SqliteSink { tx };
        // dropping the transaction on error rolls it back
        let stats = flatten(system, &mut sink)?;
        sink.tx.commit()?;

        info!(system = %system.name, variables = stats.variables, terms = stats.terms, rules = stats.rules, "stored system");
        Ok(stats)
    }

    fn delete_system(&mut self, name: &str) -> FmlResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM systems WHERE name = ?1", params![name])?;
        debug!(system = name, deleted, "delete system");
        Ok(deleted > 0)
    }

    fn delete_all(&mut self) -> FmlResult<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM systems", [])?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::tests::tipper;
    use crate::store::contract;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    #[test]
    fn test_round_trip() {
        contract::round_trip(&mut store());
    }

    #[test]
    fn test_missing_is_sentinel() {
        contract::missing_is_sentinel(&mut store());
    }

    #[test]
    fn test_outer_join_shapes() {
        contract::outer_join_shapes(&mut store());
    }

    #[test]
    fn test_duplicate_rejected() {
        contract::duplicate_rejected(&mut store());
    }

    #[test]
    fn test_invalid_not_stored() {
        contract::invalid_not_stored(&mut store());
    }

    #[test]
    fn test_deletes() {
        contract::deletes(&mut store());
    }

    #[test]
    fn test_delete_cascades() {
        let mut store = store();
        store.store_system(&tipper()).unwrap();
        store.delete_system("tipper").unwrap();

        let conn = store.conn.lock().unwrap();
        for table in ["variables", "terms", "rule_bases", "rules"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{} not emptied", table);
        }
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let mut store = store();
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER no_rules BEFORE INSERT ON rules \
                 BEGIN SELECT RAISE(ABORT, 'rules are read only'); END;",
            )
            .unwrap();

        let err = store.store_system(&tipper()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PersistenceFailed);
        assert_eq!(err.context_field("rule"), Some("reg1"));

        assert!(store.system_names().unwrap().is_empty());
        assert!(store.knowledge_rows("tipper").unwrap().is_empty());
    }

    #[test]
    fn test_clause_arrays_stored_as_json() {
        let mut store = store();
        store.store_system(&tipper()).unwrap();

        let conn = store.conn.lock().unwrap();
        let modifiers: String = conn
            .query_row(
                "SELECT antecedent_modifiers FROM rules WHERE name = 'reg1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(modifiers, r#"[null,"very"]"#);
    }

    #[test]
    fn test_reopen_file() {
        let path = std::env::temp_dir().join(format!("fmlkb-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.store_system(&tipper()).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
        }
        {
            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.load_system("tipper").unwrap(), tipper());
        }

        let _ = std::fs::remove_file(&path);
    }
}
