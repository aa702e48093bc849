//! # Lazy Transaction View
//!
//! Read-only, queryable view of one committing transaction, handed to every
//! module. Built on the host's raw change-set.
//!
//! ## Facets
//!
//! | Facet | Rebuilt from |
//! |-------|--------------|
//! | created | created ids + current state |
//! | deleted | removed property and label entries |
//! | changed | current state with assigned/removed deltas reverted |
//!
//! Each facet is computed on first access and memoized for the life of the
//! view. Modules that never look at relationships never pay for them.
//!
//! An entity created and changed in the same transaction is reported as
//! created only. An entity created and deleted in the same transaction is
//! not reported at all.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};

use shared_types::{Change, Node, NodeId, Relationship, RelationshipId};
use uuid::Uuid;

use crate::ports::{PropertyEntry, TransactionData};

/// Lazily evaluated view of a committing transaction.
pub struct LazyTransactionData<'a> {
    data: &'a dyn TransactionData,
    transaction_id: Uuid,
    created_nodes: OnceCell<BTreeMap<NodeId, Node>>,
    deleted_nodes: OnceCell<BTreeMap<NodeId, Node>>,
    changed_nodes: OnceCell<BTreeMap<NodeId, Change<Node>>>,
    created_relationships: OnceCell<BTreeMap<RelationshipId, Relationship>>,
    deleted_relationships: OnceCell<BTreeMap<RelationshipId, Relationship>>,
    changed_relationships: OnceCell<BTreeMap<RelationshipId, Change<Relationship>>>,
}

impl<'a> LazyTransactionData<'a> {
    /// Wrap the host's change-set.
    pub fn new(data: &'a dyn TransactionData) -> Self {
        Self {
            data,
            transaction_id: Uuid::new_v4(),
            created_nodes: OnceCell::new(),
            deleted_nodes: OnceCell::new(),
            changed_nodes: OnceCell::new(),
            created_relationships: OnceCell::new(),
            deleted_relationships: OnceCell::new(),
            changed_relationships: OnceCell::new(),
        }
    }

    /// Correlation id of this transaction, for logs.
    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    /// Nodes created by the transaction, in their current state.
    pub fn created_nodes(&self) -> Vec<&Node> {
        self.created_node_map().values().collect()
    }

    pub fn has_been_created(&self, node: NodeId) -> bool {
        self.created_node_map().contains_key(&node)
    }

    /// Nodes deleted by the transaction, as they were before deletion.
    pub fn deleted_nodes(&self) -> Vec<&Node> {
        self.deleted_node_map().values().collect()
    }

    pub fn has_been_deleted(&self, node: NodeId) -> bool {
        self.deleted_node_map().contains_key(&node)
    }

    /// State of a deleted node before deletion.
    pub fn deleted(&self, node: NodeId) -> Option<&Node> {
        self.deleted_node_map().get(&node)
    }

    /// Pre-existing nodes whose properties or labels changed.
    pub fn changed_nodes(&self) -> Vec<&Change<Node>> {
        self.changed_node_map().values().collect()
    }

    pub fn has_changed(&self, node: NodeId) -> bool {
        self.changed_node_map().contains_key(&node)
    }

    pub fn changed(&self, node: NodeId) -> Option<&Change<Node>> {
        self.changed_node_map().get(&node)
    }

    /// Current state of a node, read through the host.
    ///
    /// Not memoized: writes made by modules that ran earlier in the same
    /// commit are visible.
    pub fn current_node(&self, node: NodeId) -> Option<Node> {
        self.data.node(node)
    }

    // -------------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------------

    pub fn created_relationships(&self) -> Vec<&Relationship> {
        self.created_relationship_map().values().collect()
    }

    pub fn has_relationship_been_created(&self, rel: RelationshipId) -> bool {
        self.created_relationship_map().contains_key(&rel)
    }

    pub fn deleted_relationships(&self) -> Vec<&Relationship> {
        self.deleted_relationship_map().values().collect()
    }

    pub fn has_relationship_been_deleted(&self, rel: RelationshipId) -> bool {
        self.deleted_relationship_map().contains_key(&rel)
    }

    pub fn deleted_relationship(&self, rel: RelationshipId) -> Option<&Relationship> {
        self.deleted_relationship_map().get(&rel)
    }

    pub fn changed_relationships(&self) -> Vec<&Change<Relationship>> {
        self.changed_relationship_map().values().collect()
    }

    pub fn has_relationship_changed(&self, rel: RelationshipId) -> bool {
        self.changed_relationship_map().contains_key(&rel)
    }

    pub fn changed_relationship(&self, rel: RelationshipId) -> Option<&Change<Relationship>> {
        self.changed_relationship_map().get(&rel)
    }

    /// Current state of a relationship, read through the host.
    pub fn current_relationship(&self, rel: RelationshipId) -> Option<Relationship> {
        self.data.relationship(rel)
    }

    // -------------------------------------------------------------------------
    // Summary
    // -------------------------------------------------------------------------

    /// Whether the transaction changed anything visible.
    pub fn mutations_occurred(&self) -> bool {
        !(self.created_node_map().is_empty()
            && self.deleted_node_map().is_empty()
            && self.changed_node_map().is_empty()
            && self.created_relationship_map().is_empty()
            && self.deleted_relationship_map().is_empty()
            && self.changed_relationship_map().is_empty())
    }

    /// Human-readable summary, one line per mutation.
    pub fn mutations_to_strings(&self) -> Vec<String> {
        let mut lines = Vec::new();

        lines.extend(self.created_nodes().into_iter().map(|n| format!("Created node {}", n)));
        lines.extend(self.deleted_nodes().into_iter().map(|n| format!("Deleted node {}", n)));
        lines.extend(
            self.changed_nodes()
                .into_iter()
                .map(|c| format!("Changed node {} to {}", c.previous, c.current)),
        );
        lines.extend(
            self.created_relationships()
                .into_iter()
                .map(|r| format!("Created relationship {}", r)),
        );
        lines.extend(
            self.deleted_relationships()
                .into_iter()
                .map(|r| format!("Deleted relationship {}", r)),
        );
        lines.extend(
            self.changed_relationships()
                .into_iter()
                .map(|c| format!("Changed relationship {} to {}", c.previous, c.current)),
        );

        lines
    }

    // -------------------------------------------------------------------------
    // Facets
    // -------------------------------------------------------------------------

    fn created_node_map(&self) -> &BTreeMap<NodeId, Node> {
        self.created_nodes.get_or_init(|| {
            self.data
                .created_nodes()
                .into_iter()
                .filter_map(|id| self.data.node(id).map(|node| (id, node)))
                .collect()
        })
    }

    fn deleted_node_map(&self) -> &BTreeMap<NodeId, Node> {
        self.deleted_nodes.get_or_init(|| {
            let mut deleted: BTreeMap<NodeId, Node> = self
                .data
                .deleted_nodes()
                .into_iter()
                .map(|id| (id, Node::new(id)))
                .collect();

            for entry in self.data.removed_node_properties() {
                if let (Some(node), Some(previous)) = (deleted.get_mut(&entry.entity), entry.previous) {
                    node.properties.insert(entry.key, previous);
                }
            }
            for entry in self.data.removed_labels() {
                if let Some(node) = deleted.get_mut(&entry.node) {
                    node.labels.insert(entry.label);
                }
            }

            deleted
        })
    }

    fn changed_node_map(&self) -> &BTreeMap<NodeId, Change<Node>> {
        self.changed_nodes.get_or_init(|| {
            let assigned = self.data.assigned_node_properties();
            let removed = self.data.removed_node_properties();
            let assigned_labels = self.data.assigned_labels();
            let removed_labels = self.data.removed_labels();

            let candidates: BTreeSet<NodeId> = assigned
                .iter()
                .chain(removed.iter())
                .map(|entry| entry.entity)
                .chain(assigned_labels.iter().map(|entry| entry.node))
                .chain(removed_labels.iter().map(|entry| entry.node))
                .filter(|id| !self.has_been_created(*id) && !self.has_been_deleted(*id))
                .collect();

            let mut changed = BTreeMap::new();
            for id in candidates {
                let Some(current) = self.data.node(id) else {
                    continue;
                };

                let mut previous = current.clone();
                revert_properties(&mut previous.properties, id, &assigned, &removed);
                for entry in assigned_labels.iter().filter(|e| e.node == id) {
                    previous.labels.remove(&entry.label);
                }
                for entry in removed_labels.iter().filter(|e| e.node == id) {
                    previous.labels.insert(entry.label.clone());
                }

                changed.insert(id, Change::new(previous, current));
            }
            changed
        })
    }

    fn created_relationship_map(&self) -> &BTreeMap<RelationshipId, Relationship> {
        self.created_relationships.get_or_init(|| {
            self.data
                .created_relationships()
                .into_iter()
                .filter_map(|id| self.data.relationship(id).map(|rel| (id, rel)))
                .collect()
        })
    }

    fn deleted_relationship_map(&self) -> &BTreeMap<RelationshipId, Relationship> {
        self.deleted_relationships.get_or_init(|| {
            let mut deleted: BTreeMap<RelationshipId, Relationship> = self
                .data
                .deleted_relationships()
                .into_iter()
                .map(|rel| (rel.id, rel))
                .collect();

            for entry in self.data.removed_relationship_properties() {
                if let (Some(rel), Some(previous)) = (deleted.get_mut(&entry.entity), entry.previous) {
                    rel.properties.insert(entry.key, previous);
                }
            }

            deleted
        })
    }

    fn changed_relationship_map(&self) -> &BTreeMap<RelationshipId, Change<Relationship>> {
        self.changed_relationships.get_or_init(|| {
            let assigned = self.data.assigned_relationship_properties();
            let removed = self.data.removed_relationship_properties();

            let candidates: BTreeSet<RelationshipId> = assigned
                .iter()
                .chain(removed.iter())
                .map(|entry| entry.entity)
                .filter(|id| {
                    !self.has_relationship_been_created(*id) && !self.has_relationship_been_deleted(*id)
                })
                .collect();

            let mut changed = BTreeMap::new();
            for id in candidates {
                let Some(current) = self.data.relationship(id) else {
                    continue;
                };

                let mut previous = current.clone();
                revert_properties(&mut previous.properties, id, &assigned, &removed);
                changed.insert(id, Change::new(previous, current));
            }
            changed
        })
    }
}

/// Undo the recorded deltas of `entity` on `properties`.
fn revert_properties<Id: PartialEq>(
    properties: &mut shared_types::Properties,
    entity: Id,
    assigned: &[PropertyEntry<Id>],
    removed: &[PropertyEntry<Id>],
) {
    for entry in assigned.iter().filter(|e| e.entity == entity) {
        match &entry.previous {
            Some(value) => properties.insert(entry.key.clone(), value.clone()),
            None => properties.remove(&entry.key),
        };
    }
    for entry in removed.iter().filter(|e| e.entity == entity) {
        if let Some(value) = &entry.previous {
            properties.insert(entry.key.clone(), value.clone());
        }
    }
}

impl std::fmt::Debug for LazyTransactionData<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTransactionData")
            .field("transaction_id", &self.transaction_id)
            .finish_non_exhaustive()
    }
}
