//! # Tx-Runtime
//!
//! A module runtime embedded in a graph database kernel. Every committing
//! transaction is wrapped into a lazy, queryable view and handed, in
//! registration order, to each registered module before the transaction
//! becomes durable. A module can veto the commit.
//!
//! ## Lifecycle
//!
//! ```text
//! register modules ──→ first commit (or start()) ──→ initialize modules
//!                                                     purge stale metadata
//!                                                           │
//!              stop() ←── dispatch every commit ←───────────┘
//! ```
//!
//! Startup is lazy: it happens on the first committing transaction, on the
//! committing thread, exactly once.
//!
//! ## Invariants
//!
//! | Invariant | Enforcement | Location |
//! |-----------|-------------|----------|
//! | Dispatch order is registration order | monotonic order index | `domain/registry.rs` |
//! | Single startup under concurrency | mutex + condvar, starter thread id | `domain/lifecycle.rs` |
//! | Failing module rejects the transaction | fail-fast dispatch | `manager.rs` |
//! | Runtime-owned state untouchable | reserved prefix check | `domain/guard.rs` |
//! | No dispatch after stop | `Stopped` is terminal, stop drains in-flight dispatches | `domain/lifecycle.rs` |
//! | Runtimes sharing a repository keep their own metadata | keys scoped by runtime name | `domain/config.rs` |
//! | Facets computed at most once | `OnceCell` per facet | `domain/transaction_view.rs` |
//!
//! ## Hexagonal Architecture
//!
//! - **Domain Layer** (`domain/`): lifecycle, registry, transaction view, no I/O
//! - **Ports Layer** (`ports/`): commit hook (inbound); modules, change-set,
//!   metadata storage (outbound)
//! - **Adapters Layer** (`adapters/`): in-memory change-set, metadata repositories
//! - **Manager / Runtime**: orchestration and the composition root
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tx_runtime::{InMemoryMetadataRepository, RuntimeConfig, TxDrivenRuntime};
//!
//! let runtime = Arc::new(TxDrivenRuntime::new(
//!     RuntimeConfig::from_env(),
//!     Arc::new(InMemoryMetadataRepository::new()),
//! )?);
//! runtime.register_module(Arc::new(AuditModule::new()))?;
//!
//! // Host kernel: call before every commit, roll back on error.
//! runtime.before_commit(&change_set)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod manager;
pub mod ports;
pub mod runtime;

// Re-export main types for convenience
pub use domain::{
    ensure_legal, ChangeSetError, ConfigError, DispatchGuard, LazyTransactionData, LifecycleHooks, ModuleError,
    ModuleFailure, ModuleMetadata, ModuleRegistry, ModuleToken, RepositoryError, RuntimeConfig,
    RuntimeError, RuntimeLifecycle, RuntimeState, DEFAULT_INTERNAL_PREFIX, METADATA_KEY_SEPARATOR,
};

pub use ports::{
    LabelEntry, ModuleCapability, ModuleMetadataRepository, PropertyEntry, RuntimeModule,
    TransactionData, TransactionEventHandler,
};

pub use adapters::{ChangeSet, InMemoryMetadataRepository, JsonFileMetadataRepository};

pub use manager::ModuleManager;
pub use runtime::TxDrivenRuntime;

pub use shared_types::{Change, EntityId, Node, NodeId, PropertyValue, Relationship, RelationshipId};
