//! JSON-file module bookkeeping.
//!
//! All metadata lives in one JSON document keyed by module id. Every write
//! replaces the document atomically: the new content goes to a sibling temp
//! file which is then renamed over the original, so a crash mid-write leaves
//! the previous document intact.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{ModuleMetadata, RepositoryError};
use crate::ports::ModuleMetadataRepository;

/// Metadata repository persisted to a JSON file.
#[derive(Debug)]
pub struct JsonFileMetadataRepository {
    path: PathBuf,
    // Cached document; the file is only read at open.
    entries: Mutex<BTreeMap<String, ModuleMetadata>>,
}

impl JsonFileMetadataRepository {
    /// Open the repository at `path`, creating it lazily on first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        debug!(
            "[Repository] Opened {} with {} module(s)",
            path.display(),
            entries.len()
        );
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, ModuleMetadata>) -> Result<(), RepositoryError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ModuleMetadataRepository for JsonFileMetadataRepository {
    fn module_ids(&self) -> Result<BTreeSet<String>, RepositoryError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn get(&self, module_id: &str) -> Result<Option<ModuleMetadata>, RepositoryError> {
        Ok(self.entries.lock().get(module_id).cloned())
    }

    fn persist(&self, module_id: &str, metadata: &ModuleMetadata) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock();
        let mut updated = entries.clone();
        updated.insert(module_id.to_string(), metadata.clone());
        self.write(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, module_id: &str) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(module_id) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(module_id);
        self.write(&updated)?;
        *entries = updated;
        Ok(())
    }
}
