//! # Transaction-Driven Runtime
//!
//! Composition root: binds the lifecycle, the module manager and the host's
//! commit hook together.
//!
//! ## Before-Commit Sequence
//!
//! ```text
//! host commit ──→ make_sure_is_started ──false──→ commit proceeds untouched
//!                        │ true
//!                        ↓
//!                  begin_dispatch ──stopped──→ commit proceeds untouched
//!                        ↓
//!                  ensure_legal ──illegal──→ reject
//!                        ↓
//!              wrap in LazyTransactionData
//!                        ↓
//!             dispatch to modules in order ──error──→ reject
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use runtime_telemetry::{log_event, log_module_event, log_tx_event, metric_inc, COMMITS_TOTAL};
use tracing::{debug, field, info, info_span};

use crate::domain::{
    ConfigError, LazyTransactionData, LifecycleHooks, RuntimeConfig, RuntimeError,
    RuntimeLifecycle, RuntimeState,
};
use crate::manager::ModuleManager;
use crate::ports::{ModuleMetadataRepository, RuntimeModule, TransactionData, TransactionEventHandler};

/// Runtime that runs modules inside every committing transaction.
pub struct TxDrivenRuntime {
    config: RuntimeConfig,
    lifecycle: RuntimeLifecycle,
    manager: ModuleManager,
}

impl TxDrivenRuntime {
    /// Create a runtime. Modules are registered next; startup happens on
    /// the first committing transaction or an explicit `start`.
    pub fn new(
        config: RuntimeConfig,
        repository: Arc<dyn ModuleMetadataRepository>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        log_event!(
            info,
            config.name.as_str(),
            "[Runtime] Created",
            prefix = %config.internal_prefix,
            capability = %config.supported_capability
        );
        Ok(Self {
            lifecycle: RuntimeLifecycle::new(config.name.clone()),
            manager: ModuleManager::new(config.clone(), repository),
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Register a module.
    ///
    /// Returns `Ok(false)` when the module's capability does not match the
    /// capability this runtime supports; such modules are ignored.
    pub fn register_module(&self, module: Arc<dyn RuntimeModule>) -> Result<bool, RuntimeError> {
        let capability = module.capability();
        if capability != self.config.supported_capability {
            log_module_event!(
                debug,
                self.config.name.as_str(),
                "Ignoring module with unsupported capability",
                module.id(),
                capability = %capability
            );
            return Ok(false);
        }

        self.manager.register_module(module)?;
        Ok(true)
    }

    /// Registered module keys in dispatch order.
    pub fn module_ids(&self) -> Vec<String> {
        self.manager.module_ids()
    }

    pub fn state(&self) -> RuntimeState {
        self.lifecycle.state()
    }

    /// Start eagerly instead of on the first transaction.
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.lifecycle.start(self)
    }

    /// Start on demand. See `RuntimeLifecycle::make_sure_is_started`.
    pub fn make_sure_is_started(&self) -> Result<bool, RuntimeError> {
        self.lifecycle.make_sure_is_started(self)
    }

    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until_started(timeout)
    }

    /// Stop the runtime and shut every module down once in-flight
    /// transactions have been dispatched.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        self.lifecycle.stop(self)
    }

    fn count_commit(&self, outcome: &str) {
        metric_inc!(COMMITS_TOTAL, &[self.config.name.as_str(), outcome]);
    }
}

impl LifecycleHooks for TxDrivenRuntime {
    fn initialize_modules(&self) -> Result<BTreeSet<String>, RuntimeError> {
        self.manager.initialize_modules()
    }

    fn perform_cleanup(&self, used: &BTreeSet<String>) -> Result<(), RuntimeError> {
        let removed = self.manager.remove_unused_modules(used)?;
        if !removed.is_empty() {
            info!(
                "[Runtime] {} purged metadata of {} unused module(s)",
                self.config.name,
                removed.len()
            );
        }
        Ok(())
    }

    fn shutdown_modules(&self) -> Result<(), RuntimeError> {
        let failures = self.manager.shutdown_modules();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::ShutdownFailure { failures })
        }
    }
}

impl TransactionEventHandler for TxDrivenRuntime {
    fn before_commit(&self, data: &dyn TransactionData) -> Result<(), RuntimeError> {
        let span = info_span!(
            "before_commit",
            runtime = %self.config.name,
            tx_id = field::Empty
        );
        let _entered = span.enter();

        let started = self.make_sure_is_started().map_err(|e| {
            self.count_commit("startup_failed");
            e
        })?;
        // Held until dispatch ends so that stop() drains this transaction
        // before shutting modules down.
        let dispatch = if started { self.lifecycle.begin_dispatch() } else { None };
        let Some(_dispatch) = dispatch else {
            debug!("[Runtime] {} not started, transaction not dispatched", self.config.name);
            self.count_commit("skipped");
            return Ok(());
        };

        if let Err(e) = self.manager.ensure_legal(data) {
            self.count_commit("illegal");
            return Err(e);
        }

        let transaction = LazyTransactionData::new(data);
        span.record("tx_id", field::display(transaction.transaction_id()));

        let outcome = self.manager.before_commit(&transaction);
        match &outcome {
            Ok(()) => self.count_commit("dispatched"),
            Err(RuntimeError::TransactionRolledBack { module, reason }) => {
                log_tx_event!(
                    info,
                    self.config.name.as_str(),
                    "[Runtime] Transaction rolled back",
                    transaction.transaction_id(),
                    module = %module,
                    reason = %reason
                );
                self.count_commit("rolled_back");
            }
            Err(e) => {
                log_tx_event!(
                    warn,
                    self.config.name.as_str(),
                    "[Runtime] Transaction rejected",
                    transaction.transaction_id(),
                    error = %e
                );
                self.count_commit("rejected");
            }
        }
        outcome
    }

    fn after_commit(&self, _data: &dyn TransactionData) {}

    fn after_rollback(&self, _data: &dyn TransactionData) {}
}

impl std::fmt::Debug for TxDrivenRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxDrivenRuntime")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("manager", &self.manager)
            .finish()
    }
}
