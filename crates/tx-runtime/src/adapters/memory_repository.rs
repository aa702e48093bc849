//! In-memory module bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::domain::{ModuleMetadata, RepositoryError};
use crate::ports::ModuleMetadataRepository;

/// Metadata repository that lives as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryMetadataRepository {
    entries: RwLock<BTreeMap<String, ModuleMetadata>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with metadata, as left by a previous run.
    pub fn with_entries(entries: impl IntoIterator<Item = (String, ModuleMetadata)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ModuleMetadataRepository for InMemoryMetadataRepository {
    fn module_ids(&self) -> Result<BTreeSet<String>, RepositoryError> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn get(&self, module_id: &str) -> Result<Option<ModuleMetadata>, RepositoryError> {
        Ok(self.entries.read().get(module_id).cloned())
    }

    fn persist(&self, module_id: &str, metadata: &ModuleMetadata) -> Result<(), RepositoryError> {
        self.entries
            .write()
            .insert(module_id.to_string(), metadata.clone());
        Ok(())
    }

    fn remove(&self, module_id: &str) -> Result<(), RepositoryError> {
        self.entries.write().remove(module_id);
        Ok(())
    }
}
