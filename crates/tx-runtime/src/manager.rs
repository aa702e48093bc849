//! # Module Manager
//!
//! Drives registered modules through their lifecycle and dispatches
//! committing transactions to them.
//!
//! ## Dispatch Discipline
//!
//! - Modules run in registration order on the committing thread.
//! - The first failing module aborts dispatch; later modules never see the
//!   transaction.
//! - No lock is held while module code runs: dispatch works on an ordered
//!   snapshot of `Arc` handles taken under a short read lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use runtime_telemetry::{HistogramTimer, MODULES_PURGED, MODULE_FAILURES};
use tracing::{debug, error, info, warn};

use crate::domain::{
    ensure_legal, LazyTransactionData, ModuleError, ModuleFailure, ModuleMetadata, ModuleRegistry,
    ModuleToken, RuntimeConfig, RuntimeError,
};
use crate::ports::{ModuleMetadataRepository, RuntimeModule, TransactionData};

struct RegistryState {
    registry: ModuleRegistry,
    /// Set once startup begins; registration is closed from then on.
    sealed: bool,
}

/// Owns the module registry and the bookkeeping repository.
pub struct ModuleManager {
    config: RuntimeConfig,
    state: RwLock<RegistryState>,
    repository: Arc<dyn ModuleMetadataRepository>,
}

impl ModuleManager {
    pub fn new(config: RuntimeConfig, repository: Arc<dyn ModuleMetadataRepository>) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState {
                registry: ModuleRegistry::new(),
                sealed: false,
            }),
            repository,
        }
    }

    /// Register a module. Registration order is dispatch order.
    pub fn register_module(&self, module: Arc<dyn RuntimeModule>) -> Result<(), RuntimeError> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(RuntimeError::RegistrationClosed {
                key: module.id().to_string(),
            });
        }
        state.registry.register(module)?;
        Ok(())
    }

    /// Registered module keys in dispatch order.
    pub fn module_ids(&self) -> Vec<String> {
        self.state.read().registry.keys()
    }

    pub fn module_count(&self) -> usize {
        self.state.read().registry.len()
    }

    /// Initialize every module not yet initialized in this run.
    ///
    /// Fails fast on the first module that cannot be initialized; modules
    /// initialized before it stay initialized and are skipped on retry.
    /// Returns the keys of all modules initialized in this run.
    pub fn initialize_modules(&self) -> Result<BTreeSet<String>, RuntimeError> {
        let pending = {
            let mut state = self.state.write();
            state.sealed = true;
            state.registry.pending_initialization()
        };

        info!(
            "[Manager] Initializing {} module(s) for {}",
            pending.len(),
            self.config.name
        );

        for (key, module) in pending {
            let fingerprint = module.configuration_fingerprint();
            let metadata_key = self.config.metadata_key(&key);
            let metadata = self.repository.get(&metadata_key)?;
            let previous = metadata
                .as_ref()
                .and_then(|m| m.reusable_token(&fingerprint));

            match (&metadata, previous) {
                (_, Some(token)) => debug!("[Manager] Resuming {} from token {}", key, token),
                (Some(_), None) => info!("[Manager] {} needs full initialization", key),
                (None, None) => info!("[Manager] {} is new, initializing", key),
            }

            let token = module.initialize(previous).map_err(|source| {
                MODULE_FAILURES.with_label_values(&[key.as_str(), "initialize"]).inc();
                error!("[Manager] ✗ {} failed to initialize: {}", key, source);
                RuntimeError::StartupFailure {
                    module: key.clone(),
                    source,
                }
            })?;

            self.repository
                .persist(&metadata_key, &ModuleMetadata::fresh(token, fingerprint))?;
            self.state.write().registry.mark_initialized(&key);
            info!("[Manager] ✓ {} initialized", key);
        }

        Ok(self
            .state
            .read()
            .registry
            .initialized_keys()
            .into_iter()
            .collect())
    }

    /// Reject transactions touching runtime-owned state.
    pub fn ensure_legal(&self, data: &dyn TransactionData) -> Result<(), RuntimeError> {
        ensure_legal(&self.config, data)
    }

    /// Dispatch a committing transaction to every module, in order.
    pub fn before_commit(&self, transaction: &LazyTransactionData<'_>) -> Result<(), RuntimeError> {
        let modules = self.state.read().registry.snapshot();

        for module in modules {
            let key = module.id();
            let outcome = {
                let _timer = HistogramTimer::for_module(key);
                module.before_commit(transaction)
            };

            match outcome {
                Ok(()) => {}
                Err(ModuleError::NeedsInitialization(reason)) => {
                    warn!(
                        "[Manager] {} is out of sync and will be re-initialized on next start: {}",
                        key, reason
                    );
                    self.mark_needing_initialization(module.as_ref());
                }
                Err(ModuleError::DeliberateRollback(reason)) => {
                    debug!(
                        "[Manager] {} rolled back transaction {}: {}",
                        key,
                        transaction.transaction_id(),
                        reason
                    );
                    return Err(RuntimeError::TransactionRolledBack {
                        module: key.to_string(),
                        reason,
                    });
                }
                Err(source) => {
                    MODULE_FAILURES.with_label_values(&[key, "before_commit"]).inc();
                    error!(
                        "[Manager] ✗ {} failed on transaction {}: {}",
                        key,
                        transaction.transaction_id(),
                        source
                    );
                    return Err(RuntimeError::ModuleDispatchFailure {
                        module: key.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    /// Remove bookkeeping of every module of this runtime not in `used`.
    ///
    /// Metadata stored by other runtimes sharing the repository is left alone.
    pub fn remove_unused_modules(&self, used: &BTreeSet<String>) -> Result<Vec<String>, RuntimeError> {
        let mut removed = Vec::new();

        for metadata_key in self.repository.module_ids()? {
            let Some(key) = self.config.module_of(&metadata_key) else {
                continue;
            };
            if used.contains(key) {
                continue;
            }
            let key = key.to_string();
            self.repository.remove(&metadata_key)?;
            info!("[Manager] Removed metadata of unused module {}", key);
            MODULES_PURGED.with_label_values(&[self.config.name.as_str()]).inc();
            removed.push(key);
        }

        Ok(removed)
    }

    /// Ask every module to shut down, in order. Never stops early.
    pub fn shutdown_modules(&self) -> Vec<ModuleFailure> {
        let modules = self.state.read().registry.snapshot();
        let mut failures = Vec::new();

        for module in modules {
            let key = module.id();
            match module.shutdown() {
                Ok(()) => debug!("[Manager] ✓ {} shut down", key),
                Err(error) => {
                    MODULE_FAILURES.with_label_values(&[key, "shutdown"]).inc();
                    warn!("[Manager] ✗ {} failed to shut down: {}", key, error);
                    failures.push(ModuleFailure {
                        module: key.to_string(),
                        error,
                    });
                }
            }
        }

        failures
    }

    fn mark_needing_initialization(&self, module: &dyn RuntimeModule) {
        let key = module.id();
        let metadata_key = self.config.metadata_key(key);
        let marked = match self.repository.get(&metadata_key) {
            Ok(Some(metadata)) => metadata.mark_needing_initialization(),
            Ok(None) => ModuleMetadata::fresh(ModuleToken::empty(), module.configuration_fingerprint())
                .mark_needing_initialization(),
            Err(e) => {
                error!("[Manager] Could not read metadata of {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.repository.persist(&metadata_key, &marked) {
            error!("[Manager] Could not flag {} for re-initialization: {}", key, e);
        }
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ModuleManager")
            .field("runtime", &self.config.name)
            .field("modules", &state.registry)
            .field("sealed", &state.sealed)
            .finish()
    }
}
