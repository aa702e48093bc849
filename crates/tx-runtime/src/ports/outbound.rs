//! Outbound (Driven) ports for the runtime.
//!
//! These traits define what the runtime needs from the outside world:
//! the modules it drives, the host's raw change-set, and a place to keep
//! per-module bookkeeping across restarts.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use shared_types::{Node, NodeId, PropertyValue, Relationship, RelationshipId};

use crate::domain::{
    ConfigError, LazyTransactionData, ModuleError, ModuleMetadata, ModuleToken, RepositoryError,
};

// =============================================================================
// MODULE CONTRACT
// =============================================================================

/// Capability tag a module advertises.
///
/// A runtime only accepts modules whose tag matches the capability it
/// supports; everything else is ignored at registration, so several
/// specialized runtimes can be handed the same module list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleCapability {
    /// Reacts to every committing transaction.
    #[default]
    TxDriven,
    /// Performs scheduled background work and never sees commits.
    TimerDriven,
}

impl ModuleCapability {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TxDriven => "tx-driven",
            Self::TimerDriven => "timer-driven",
        }
    }
}

impl fmt::Display for ModuleCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleCapability {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tx" | "tx-driven" | "tx_driven" => Ok(Self::TxDriven),
            "timer" | "timer-driven" | "timer_driven" => Ok(Self::TimerDriven),
            other => Err(ConfigError::UnknownCapability(other.to_string())),
        }
    }
}

/// The contract every module must implement.
///
/// Modules are called on the committing thread. `before_commit` runs inside
/// the host transaction: returning an error rejects that transaction.
pub trait RuntimeModule: Send + Sync {
    /// Stable key identifying the module across restarts.
    fn id(&self) -> &str;

    /// Capability tag used for registration filtering.
    fn capability(&self) -> ModuleCapability {
        ModuleCapability::TxDriven
    }

    /// Fingerprint of the module's configuration.
    ///
    /// When it differs from the fingerprint persisted by a previous run the
    /// module is fully re-initialized.
    fn configuration_fingerprint(&self) -> String {
        String::new()
    }

    /// Initialize the module for this run.
    ///
    /// `previous` is the token returned by the last successful
    /// initialization, when the module's bookkeeping is still valid. `None`
    /// asks for a full initialization.
    fn initialize(&self, previous: Option<&ModuleToken>) -> Result<ModuleToken, ModuleError>;

    /// Inspect (and react to) a committing transaction.
    fn before_commit(&self, transaction: &LazyTransactionData<'_>) -> Result<(), ModuleError>;

    /// Release resources. Called once when the runtime stops.
    fn shutdown(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

// =============================================================================
// RAW CHANGE-SET
// =============================================================================

/// A property assignment or removal recorded by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry<Id> {
    /// Entity the property belongs to.
    pub entity: Id,
    /// Property key.
    pub key: String,
    /// New value, `None` for a removal.
    pub value: Option<PropertyValue>,
    /// Value before the transaction, `None` if the property did not exist.
    pub previous: Option<PropertyValue>,
}

/// A label assignment or removal recorded by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub node: NodeId,
    pub label: String,
}

/// The host's low-level change-set for one in-flight transaction.
///
/// Host shims translate their native commit event into this interface.
/// Deleted entities must report all of their properties as removed and, for
/// nodes, all of their labels as removed; the transaction view rebuilds the
/// deleted state from those entries.
pub trait TransactionData {
    fn created_nodes(&self) -> Vec<NodeId>;

    fn deleted_nodes(&self) -> Vec<NodeId>;

    fn created_relationships(&self) -> Vec<RelationshipId>;

    /// Deleted relationships with their type and end points.
    fn deleted_relationships(&self) -> Vec<Relationship>;

    fn assigned_node_properties(&self) -> Vec<PropertyEntry<NodeId>>;

    fn removed_node_properties(&self) -> Vec<PropertyEntry<NodeId>>;

    fn assigned_relationship_properties(&self) -> Vec<PropertyEntry<RelationshipId>>;

    fn removed_relationship_properties(&self) -> Vec<PropertyEntry<RelationshipId>>;

    fn assigned_labels(&self) -> Vec<LabelEntry>;

    fn removed_labels(&self) -> Vec<LabelEntry>;

    /// Current state of a node inside the transaction, `None` if it does not
    /// exist (anymore).
    fn node(&self, id: NodeId) -> Option<Node>;

    /// Current state of a relationship inside the transaction.
    fn relationship(&self, id: RelationshipId) -> Option<Relationship>;
}

// =============================================================================
// MODULE BOOKKEEPING
// =============================================================================

/// Persistent per-module bookkeeping, kept across restarts.
pub trait ModuleMetadataRepository: Send + Sync {
    /// Keys of every module with persisted metadata.
    fn module_ids(&self) -> Result<BTreeSet<String>, RepositoryError>;

    fn get(&self, module_id: &str) -> Result<Option<ModuleMetadata>, RepositoryError>;

    fn persist(&self, module_id: &str, metadata: &ModuleMetadata) -> Result<(), RepositoryError>;

    fn remove(&self, module_id: &str) -> Result<(), RepositoryError>;
}
