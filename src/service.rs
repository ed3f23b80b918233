//! Knowledge-base service
//!
//! Glues the XML codec to a [`KnowledgeStore`]: uploads are parsed then
//! flattened into the store, downloads are grouped back out of it and
//! serialized. Both the HTTP server and the CLI drive this type.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::codec::{self, CodecOptions};
use crate::config::FmlConfig;
use crate::error::{FmlError, FmlResult};
use crate::model::FuzzySystem;
use crate::rows::FlattenStats;
use crate::store::{open_store, KnowledgeStore};

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Upload {
    pub system: String,
    #[serde(flatten)]
    pub stats: FlattenStats,
}

pub struct KnowledgeBaseService {
    store: Box<dyn KnowledgeStore>,
    options: CodecOptions,
}

impl KnowledgeBaseService {
    pub fn new(store: Box<dyn KnowledgeStore>, options: CodecOptions) -> Self {
        Self { store, options }
    }

    /// Open the configured store backend with the configured codec options
    pub fn from_config(config: &FmlConfig) -> FmlResult<Self> {
        let store = open_store(&config.store)?;
        Ok(Self::new(store, config.codec.clone()))
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn list_systems(&self) -> FmlResult<Vec<String>> {
        self.store.system_names()
    }

    /// Rebuild a stored system, `None` when nothing is stored under `name`
    pub fn fetch_system(&self, name: &str) -> FmlResult<Option<FuzzySystem>> {
        let system = self.store.load_system(name)?;
        if system.is_sentinel() {
            debug!(system = name, "no stored system");
            return Ok(None);
        }
        Ok(Some(system))
    }

    /// Stored system rendered as an FML document
    pub fn fetch_fml(&self, name: &str) -> FmlResult<Option<String>> {
        match self.fetch_system(name)? {
            Some(system) => codec::serialize(&system, &self.options).map(Some),
            None => Ok(None),
        }
    }

    /// Parse an FML document and store the system it describes
    pub fn put_fml(&mut self, text: &str) -> FmlResult<Upload> {
        let system = codec::parse(text, &self.options)?;
        self.put_system(&system)
    }

    /// Same as [`put_fml`](Self::put_fml), reading the document from disk
    pub fn put_fml_file(&mut self, path: &Path) -> FmlResult<Upload> {
        if !path.is_file() {
            warn!(path = %path.display(), "upload of missing file");
            return Err(FmlError::file_not_found(path));
        }
        let text = fs::read_to_string(path)?;
        self.put_fml(&text)
            .map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn put_system(&mut self, system: &FuzzySystem) -> FmlResult<Upload> {
        let stats = self.store.store_system(system)?;
        Ok(Upload { system: system.name.clone(), stats })
    }

    pub fn delete_system(&mut self, name: &str) -> FmlResult<bool> {
        let deleted = self.store.delete_system(name)?;
        if deleted {
            info!(system = name, "deleted system");
        }
        Ok(deleted)
    }

    pub fn delete_all(&mut self) -> FmlResult<usize> {
        let count = self.store.delete_all()?;
        info!(count, "deleted every system");
        Ok(count)
    }
}
