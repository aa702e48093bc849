//! # Error Types
//!
//! Runtime, module, repository and change-set errors.
//!
//! ## Propagation
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | `DuplicateModule`, `RegistrationClosed` | registration | fatal to process startup |
//! | `StartupFailure`, `StartupAborted` | start attempt | triggering transaction rejected, next one retries |
//! | `IllegalTransaction` | one transaction | rejected, runtime stays started |
//! | `ModuleDispatchFailure`, `TransactionRolledBack` | one transaction | remaining modules skipped, rejected |
//! | `ShutdownFailure` | stop | reported after every module was asked to stop |

use std::fmt;

use shared_types::{NodeId, RelationshipId};
use thiserror::Error;

/// Errors surfaced by the runtime to the host and the composition root.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A module with the same key is already registered.
    #[error("Module already registered: {key}")]
    DuplicateModule { key: String },

    /// Registration attempted after the runtime began starting.
    #[error("Cannot register module {key}: runtime has already started")]
    RegistrationClosed { key: String },

    /// A module failed to initialize during a start attempt.
    #[error("Startup failed: module {module} could not be initialized: {source}")]
    StartupFailure {
        module: String,
        #[source]
        source: ModuleError,
    },

    /// A start attempt failed for a reason not tied to one module, or failed
    /// on another thread while this caller was waiting for it.
    #[error("Startup aborted: {0}")]
    StartupAborted(String),

    /// The transaction touches state reserved for the runtime.
    #[error("Illegal transaction: {reason}")]
    IllegalTransaction { reason: String },

    /// A module failed while handling the transaction.
    #[error("Module {module} failed before commit: {source}")]
    ModuleDispatchFailure {
        module: String,
        #[source]
        source: ModuleError,
    },

    /// A module asked for the transaction to be rolled back.
    #[error("Transaction rolled back by module {module}: {reason}")]
    TransactionRolledBack { module: String, reason: String },

    /// One or more modules failed to shut down.
    #[error("{} module(s) failed to shut down: {}", .failures.len(), join_failures(.failures))]
    ShutdownFailure { failures: Vec<ModuleFailure> },

    /// The runtime has been stopped.
    #[error("Runtime is stopped")]
    Stopped,

    /// Module bookkeeping could not be read or written.
    #[error("Module metadata repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl RuntimeError {
    /// Whether the error only affects the transaction that triggered it.
    pub fn is_transaction_scoped(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransaction { .. }
                | Self::ModuleDispatchFailure { .. }
                | Self::TransactionRolledBack { .. }
        )
    }

    /// Key of the module the error is attributed to, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::DuplicateModule { key } | Self::RegistrationClosed { key } => Some(key),
            Self::StartupFailure { module, .. }
            | Self::ModuleDispatchFailure { module, .. }
            | Self::TransactionRolledBack { module, .. } => Some(module),
            _ => None,
        }
    }
}

/// Errors a module reports back to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// The module could not do its work.
    #[error("{0}")]
    Failed(String),

    /// The module wants the transaction rolled back. Not logged as an error.
    #[error("deliberate rollback: {0}")]
    DeliberateRollback(String),

    /// The module's own state is out of sync with the graph and it must be
    /// fully re-initialized on the next start. Does not fail the transaction.
    #[error("needs initialization: {0}")]
    NeedsInitialization(String),
}

impl ModuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn rollback(reason: impl Into<String>) -> Self {
        Self::DeliberateRollback(reason.into())
    }

    pub fn needs_initialization(reason: impl Into<String>) -> Self {
        Self::NeedsInitialization(reason.into())
    }
}

/// A module failure collected during a best-effort loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFailure {
    pub module: String,
    pub error: ModuleError,
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.module, self.error)
    }
}

fn join_failures(failures: &[ModuleFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by module metadata repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while recording changes into a `ChangeSet`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeSetError {
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    #[error("Relationship not found: {0}")]
    UnknownRelationship(RelationshipId),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Internal prefix must not be empty")]
    EmptyInternalPrefix,

    #[error("Unknown module capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid runtime name {0:?}: must be non-empty and contain no '/'")]
    InvalidName(String),
}
