//! # Module Registry
//!
//! Ordered collection of registered modules keyed by their stable id.
//!
//! ## Invariants
//!
//! - Keys are unique; a second registration under the same key is rejected
//!   and the first module is retained.
//! - Every entry gets a monotonically increasing order index at
//!   registration. Indices are never reused and iteration always follows
//!   them, which makes registration order the dispatch order.

use std::sync::Arc;

use tracing::info;

use crate::domain::errors::RuntimeError;
use crate::ports::RuntimeModule;

/// A module held by the registry.
pub struct RegisteredModule {
    key: String,
    module: Arc<dyn RuntimeModule>,
    order: u64,
    initialized: bool,
}

impl RegisteredModule {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn module(&self) -> &Arc<dyn RuntimeModule> {
        &self.module
    }

    /// Registration order index.
    pub fn order(&self) -> u64 {
        self.order
    }

    /// Whether the module was initialized in the current run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl std::fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("key", &self.key)
            .field("order", &self.order)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Registry of modules in registration order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    entries: Vec<RegisteredModule>,
    next_order: u64,
}

impl ModuleRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, returning its order index.
    pub fn register(&mut self, module: Arc<dyn RuntimeModule>) -> Result<u64, RuntimeError> {
        let key = module.id().to_string();

        if self.contains(&key) {
            return Err(RuntimeError::DuplicateModule { key });
        }

        let order = self.next_order;
        self.next_order += 1;

        info!("[Registry] Registering module {} at position {}", key, order);
        self.entries.push(RegisteredModule {
            key,
            module,
            order,
            initialized: false,
        });

        Ok(order)
    }

    /// Check if a module is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Look up a registered module.
    pub fn get(&self, key: &str) -> Option<&RegisteredModule> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.entries.iter()
    }

    /// Module keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    /// Ordered snapshot of the module handles, for dispatch without holding
    /// a lock. Only `Arc`s are cloned; keys are read back through `id()`.
    pub fn snapshot(&self) -> Vec<Arc<dyn RuntimeModule>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.module))
            .collect()
    }

    /// Modules not yet initialized in this run, in registration order.
    pub fn pending_initialization(&self) -> Vec<(String, Arc<dyn RuntimeModule>)> {
        self.entries
            .iter()
            .filter(|entry| !entry.initialized)
            .map(|entry| (entry.key.clone(), Arc::clone(&entry.module)))
            .collect()
    }

    /// Record that a module was initialized in this run.
    pub fn mark_initialized(&mut self, key: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.initialized = true;
                true
            }
            None => false,
        }
    }

    /// Keys initialized in this run, in registration order.
    pub fn initialized_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.initialized)
            .map(|entry| entry.key.clone())
            .collect()
    }
}
