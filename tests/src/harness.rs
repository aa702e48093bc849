//! # Host Kernel Harness
//!
//! A minimal in-memory graph kernel that drives registered transaction
//! event handlers the way a real database would: `before_commit` on the
//! committing thread, then either apply the changes and call
//! `after_commit`, or discard them and call `after_rollback`.
//!
//! Modules that need to write into the committing transaction reach it
//! through `LiveTransaction::current()`, which is bound to the committing
//! thread for the duration of the commit.

use std::cell::RefCell;
use std::sync::{Arc, Barrier, Once};

use parking_lot::{Mutex, RwLock};
use runtime_telemetry::{init_telemetry, TelemetryConfig};
use shared_types::{Node, NodeId, PropertyValue, Relationship, RelationshipId};
use tx_runtime::{
    ChangeSet, LabelEntry, LazyTransactionData, ModuleCapability, ModuleError, ModuleToken,
    PropertyEntry, RuntimeError, RuntimeModule, TransactionData, TransactionEventHandler,
};

static TELEMETRY: Once = Once::new();

/// Install a debug-level subscriber once per test binary.
pub fn init_test_logging() {
    TELEMETRY.call_once(|| {
        if let Ok(guard) = init_telemetry(TelemetryConfig::for_tests()) {
            // Keep the subscriber for the whole test run.
            std::mem::forget(guard);
        }
    });
}

// =============================================================================
// LIVE TRANSACTION
// =============================================================================

thread_local! {
    static COMMITTING: RefCell<Option<Arc<LiveTransaction>>> = const { RefCell::new(None) };
}

/// An open transaction. Reads and writes go through a short-lived lock so
/// modules can write while the runtime is reading.
#[derive(Debug, Default)]
pub struct LiveTransaction {
    changes: RwLock<ChangeSet>,
}

impl LiveTransaction {
    /// Transaction being committed on this thread, if any.
    pub fn current() -> Option<Arc<LiveTransaction>> {
        COMMITTING.with(|slot| slot.borrow().clone())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut ChangeSet) -> R) -> R {
        f(&mut self.changes.write())
    }

    pub fn read<R>(&self, f: impl FnOnce(&ChangeSet) -> R) -> R {
        f(&self.changes.read())
    }
}

impl TransactionData for LiveTransaction {
    fn created_nodes(&self) -> Vec<NodeId> {
        self.changes.read().created_nodes()
    }

    fn deleted_nodes(&self) -> Vec<NodeId> {
        self.changes.read().deleted_nodes()
    }

    fn created_relationships(&self) -> Vec<RelationshipId> {
        self.changes.read().created_relationships()
    }

    fn deleted_relationships(&self) -> Vec<Relationship> {
        self.changes.read().deleted_relationships()
    }

    fn assigned_node_properties(&self) -> Vec<PropertyEntry<NodeId>> {
        self.changes.read().assigned_node_properties()
    }

    fn removed_node_properties(&self) -> Vec<PropertyEntry<NodeId>> {
        self.changes.read().removed_node_properties()
    }

    fn assigned_relationship_properties(&self) -> Vec<PropertyEntry<RelationshipId>> {
        self.changes.read().assigned_relationship_properties()
    }

    fn removed_relationship_properties(&self) -> Vec<PropertyEntry<RelationshipId>> {
        self.changes.read().removed_relationship_properties()
    }

    fn assigned_labels(&self) -> Vec<LabelEntry> {
        self.changes.read().assigned_labels()
    }

    fn removed_labels(&self) -> Vec<LabelEntry> {
        self.changes.read().removed_labels()
    }

    fn node(&self, id: NodeId) -> Option<Node> {
        TransactionData::node(&*self.changes.read(), id)
    }

    fn relationship(&self, id: RelationshipId) -> Option<Relationship> {
        TransactionData::relationship(&*self.changes.read(), id)
    }
}

/// Binds a transaction to the committing thread until dropped. Nested
/// commits restore the outer transaction on exit.
struct CommitScope {
    outer: Option<Arc<LiveTransaction>>,
}

impl CommitScope {
    fn enter(tx: &Arc<LiveTransaction>) -> Self {
        let outer = COMMITTING.with(|slot| slot.borrow_mut().replace(Arc::clone(tx)));
        CommitScope { outer }
    }
}

impl Drop for CommitScope {
    fn drop(&mut self) {
        let outer = self.outer.take();
        COMMITTING.with(|slot| *slot.borrow_mut() = outer);
    }
}

// =============================================================================
// KERNEL
// =============================================================================

/// In-memory graph kernel with transaction event handlers.
///
/// Commits replace the whole graph with the transaction's view of it; there
/// is no conflict detection between overlapping transactions.
#[derive(Default)]
pub struct GraphKernel {
    nodes: RwLock<Vec<Node>>,
    relationships: RwLock<Vec<Relationship>>,
    handlers: RwLock<Vec<Arc<dyn TransactionEventHandler>>>,
}

impl GraphKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_handler(&self, handler: Arc<dyn TransactionEventHandler>) {
        self.handlers.write().push(handler);
    }

    /// Open a transaction over the committed graph.
    pub fn begin(&self) -> KernelTransaction<'_> {
        let changes = ChangeSet::with_graph(
            self.nodes.read().iter().cloned(),
            self.relationships.read().iter().cloned(),
        );
        KernelTransaction {
            kernel: self,
            live: Arc::new(LiveTransaction {
                changes: RwLock::new(changes),
            }),
        }
    }

    /// Run `f` in a transaction and commit it.
    pub fn execute<R>(&self, f: impl FnOnce(&mut ChangeSet) -> R) -> Result<R, RuntimeError> {
        let tx = self.begin();
        let result = tx.write(f);
        tx.commit()?;
        Ok(result)
    }

    /// Committed state of a node.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.read().iter().find(|n| n.id == id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.read().len()
    }
}

/// A transaction opened on a `GraphKernel`.
pub struct KernelTransaction<'k> {
    kernel: &'k GraphKernel,
    live: Arc<LiveTransaction>,
}

impl KernelTransaction<'_> {
    pub fn write<R>(&self, f: impl FnOnce(&mut ChangeSet) -> R) -> R {
        self.live.write(f)
    }

    /// Run the before-commit hooks, then apply or discard the changes.
    pub fn commit(self) -> Result<(), RuntimeError> {
        let handlers = self.kernel.handlers.read().clone();
        let data: &dyn TransactionData = self.live.as_ref();

        let outcome = {
            let _scope = CommitScope::enter(&self.live);
            handlers.iter().try_for_each(|h| h.before_commit(data))
        };

        if let Err(e) = outcome {
            for handler in &handlers {
                handler.after_rollback(data);
            }
            return Err(e);
        }

        let (nodes, relationships) = self.live.read(|changes| changes.clone().into_graph());
        *self.kernel.nodes.write() = nodes;
        *self.kernel.relationships.write() = relationships;

        for handler in &handlers {
            handler.after_commit(data);
        }
        Ok(())
    }
}

// =============================================================================
// MODULES
// =============================================================================

/// Shared, ordered record of module activity.
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn new_trace() -> Trace {
    Arc::default()
}

/// What a `RecordingModule` does when it sees a transaction.
#[derive(Debug, Clone, Default)]
pub enum Reaction {
    #[default]
    Accept,
    Fail(String),
    Rollback(String),
    NeedsInitialization(String),
}

/// Module that records every call and the nodes it observed.
pub struct RecordingModule {
    id: String,
    trace: Trace,
    reaction: Mutex<Reaction>,
    failing_initializations: Mutex<usize>,
    fingerprint: String,
    capability: ModuleCapability,
    /// Tokens handed to `initialize`, in call order.
    pub received_tokens: Mutex<Vec<Option<ModuleToken>>>,
    /// Created nodes seen on each dispatched transaction.
    pub observed: Mutex<Vec<Vec<Node>>>,
}

impl RecordingModule {
    pub fn new(id: &str, trace: &Trace) -> Self {
        Self {
            id: id.to_string(),
            trace: Arc::clone(trace),
            reaction: Mutex::new(Reaction::Accept),
            failing_initializations: Mutex::new(0),
            fingerprint: String::new(),
            capability: ModuleCapability::TxDriven,
            received_tokens: Mutex::new(Vec::new()),
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capability(mut self, capability: ModuleCapability) -> Self {
        self.capability = capability;
        self
    }

    pub fn reacting(self, reaction: Reaction) -> Self {
        *self.reaction.lock() = reaction;
        self
    }

    /// Fail the next `count` initializations.
    pub fn failing_initializations(self, count: usize) -> Self {
        *self.failing_initializations.lock() = count;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = fingerprint.to_string();
        self
    }

    pub fn set_reaction(&self, reaction: Reaction) {
        *self.reaction.lock() = reaction;
    }

    pub fn dispatch_count(&self) -> usize {
        self.observed.lock().len()
    }
}

impl RuntimeModule for RecordingModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> ModuleCapability {
        self.capability
    }

    fn configuration_fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn initialize(&self, previous: Option<&ModuleToken>) -> Result<ModuleToken, ModuleError> {
        self.received_tokens.lock().push(previous.cloned());
        {
            let mut failing = self.failing_initializations.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(ModuleError::failed("initialization failed"));
            }
        }
        self.trace.lock().push(format!("init:{}", self.id));
        let generation = self.received_tokens.lock().len();
        Ok(ModuleToken::new(format!("{}@{}", self.id, generation)))
    }

    fn before_commit(&self, tx: &LazyTransactionData<'_>) -> Result<(), ModuleError> {
        self.trace.lock().push(self.id.clone());
        self.observed
            .lock()
            .push(tx.created_nodes().into_iter().cloned().collect());

        match self.reaction.lock().clone() {
            Reaction::Accept => Ok(()),
            Reaction::Fail(message) => Err(ModuleError::failed(message)),
            Reaction::Rollback(reason) => Err(ModuleError::rollback(reason)),
            Reaction::NeedsInitialization(reason) => Err(ModuleError::needs_initialization(reason)),
        }
    }

    fn shutdown(&self) -> Result<(), ModuleError> {
        self.trace.lock().push(format!("shutdown:{}", self.id));
        Ok(())
    }
}

/// Module that stamps every created node with a property, writing into the
/// committing transaction.
pub struct EnricherModule {
    id: String,
    trace: Trace,
    key: String,
    value: PropertyValue,
    /// Created node as read back through the view after writing.
    pub observed: Mutex<Vec<Node>>,
}

impl EnricherModule {
    pub fn new(id: &str, trace: &Trace, key: &str, value: impl Into<PropertyValue>) -> Self {
        Self {
            id: id.to_string(),
            trace: Arc::clone(trace),
            key: key.to_string(),
            value: value.into(),
            observed: Mutex::new(Vec::new()),
        }
    }
}

impl RuntimeModule for EnricherModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&self, _previous: Option<&ModuleToken>) -> Result<ModuleToken, ModuleError> {
        Ok(ModuleToken::empty())
    }

    fn before_commit(&self, tx: &LazyTransactionData<'_>) -> Result<(), ModuleError> {
        self.trace.lock().push(self.id.clone());
        let live = LiveTransaction::current()
            .ok_or_else(|| ModuleError::failed("no committing transaction"))?;

        for node in tx.created_nodes() {
            live.write(|changes| changes.set_node_property(node.id, self.key.clone(), self.value.clone()))
                .map_err(|e| ModuleError::failed(e.to_string()))?;
            if let Some(current) = tx.current_node(node.id) {
                self.observed.lock().push(current);
            }
        }
        Ok(())
    }
}

/// Module that parks inside `before_commit` until released.
///
/// `entered` is reached once the commit is being dispatched; the module then
/// blocks on `release` before returning.
pub struct GatedModule {
    id: String,
    trace: Trace,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl GatedModule {
    pub fn new(id: &str, trace: &Trace, entered: &Arc<Barrier>, release: &Arc<Barrier>) -> Self {
        Self {
            id: id.to_string(),
            trace: Arc::clone(trace),
            entered: Arc::clone(entered),
            release: Arc::clone(release),
        }
    }
}

impl RuntimeModule for GatedModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&self, _previous: Option<&ModuleToken>) -> Result<ModuleToken, ModuleError> {
        Ok(ModuleToken::empty())
    }

    fn before_commit(&self, _tx: &LazyTransactionData<'_>) -> Result<(), ModuleError> {
        self.entered.wait();
        self.release.wait();
        self.trace.lock().push(self.id.clone());
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ModuleError> {
        self.trace.lock().push(format!("shutdown:{}", self.id));
        Ok(())
    }
}

/// Module whose initialization commits a bookkeeping transaction through
/// the kernel, re-entering the runtime from the starting thread.
pub struct BookkeepingModule {
    id: String,
    kernel: Arc<GraphKernel>,
    /// Outcome of the nested commit.
    pub nested_commit: Mutex<Option<Result<(), String>>>,
    pub dispatched: Mutex<usize>,
}

impl BookkeepingModule {
    pub fn new(id: &str, kernel: &Arc<GraphKernel>) -> Self {
        Self {
            id: id.to_string(),
            kernel: Arc::clone(kernel),
            nested_commit: Mutex::new(None),
            dispatched: Mutex::new(0),
        }
    }
}

impl RuntimeModule for BookkeepingModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&self, _previous: Option<&ModuleToken>) -> Result<ModuleToken, ModuleError> {
        let outcome = self
            .kernel
            .execute(|changes| {
                changes.create_node(["Bookkeeping"]);
            })
            .map_err(|e| e.to_string());
        *self.nested_commit.lock() = Some(outcome);
        Ok(ModuleToken::empty())
    }

    fn before_commit(&self, _tx: &LazyTransactionData<'_>) -> Result<(), ModuleError> {
        *self.dispatched.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler {
        commits: Mutex<usize>,
        rollbacks: Mutex<usize>,
        reject: bool,
    }

    impl TransactionEventHandler for CountingHandler {
        fn before_commit(&self, _data: &dyn TransactionData) -> Result<(), RuntimeError> {
            if self.reject {
                return Err(RuntimeError::IllegalTransaction {
                    reason: "rejected".to_string(),
                });
            }
            Ok(())
        }

        fn after_commit(&self, _data: &dyn TransactionData) {
            *self.commits.lock() += 1;
        }

        fn after_rollback(&self, _data: &dyn TransactionData) {
            *self.rollbacks.lock() += 1;
        }
    }

    #[test]
    fn test_commit_applies_changes() {
        let kernel = GraphKernel::new();
        let handler = Arc::new(CountingHandler {
            commits: Mutex::new(0),
            rollbacks: Mutex::new(0),
            reject: false,
        });
        kernel.register_handler(handler.clone());

        let id = kernel.execute(|cs| cs.create_node(["Person"])).unwrap();

        assert_eq!(kernel.node(id).unwrap().labels.len(), 1);
        assert_eq!(*handler.commits.lock(), 1);
        assert!(LiveTransaction::current().is_none());
    }

    #[test]
    fn test_rejected_commit_discards_changes() {
        let kernel = GraphKernel::new();
        let handler = Arc::new(CountingHandler {
            commits: Mutex::new(0),
            rollbacks: Mutex::new(0),
            reject: true,
        });
        kernel.register_handler(handler.clone());

        assert!(kernel.execute(|cs| cs.create_node(["Person"])).is_err());

        assert_eq!(kernel.node_count(), 0);
        assert_eq!(*handler.rollbacks.lock(), 1);
    }
}
