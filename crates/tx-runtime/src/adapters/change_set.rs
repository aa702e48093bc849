//! In-memory change-set for one transaction.
//!
//! Holds the current graph state and, for every entity touched by the
//! transaction, a snapshot taken on first touch (`None` when the entity was
//! created by the transaction). The raw delta lists reported through
//! `TransactionData` are computed by diffing those snapshots against the
//! current state, so an entity created and deleted within the transaction
//! leaves no trace, and a property set and then reset to its original value
//! is not reported.

use std::collections::{BTreeMap, BTreeSet};

use shared_types::{Node, NodeId, PropertyValue, Relationship, RelationshipId};

use crate::domain::ChangeSetError;
use crate::ports::{LabelEntry, PropertyEntry, TransactionData};

/// Graph state plus the changes of one in-flight transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    nodes: BTreeMap<NodeId, Node>,
    relationships: BTreeMap<RelationshipId, Relationship>,
    /// First-touch snapshots. `None` means created in this transaction.
    node_originals: BTreeMap<NodeId, Option<Node>>,
    relationship_originals: BTreeMap<RelationshipId, Option<Relationship>>,
    next_node_id: u64,
    next_relationship_id: u64,
}

impl ChangeSet {
    /// Create an empty change-set over an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty change-set over an existing graph.
    pub fn with_graph(
        nodes: impl IntoIterator<Item = Node>,
        relationships: impl IntoIterator<Item = Relationship>,
    ) -> Self {
        let nodes: BTreeMap<NodeId, Node> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let relationships: BTreeMap<RelationshipId, Relationship> =
            relationships.into_iter().map(|r| (r.id, r)).collect();

        let next_node_id = nodes.keys().next_back().map_or(0, |id| id.raw() + 1);
        let next_relationship_id = relationships.keys().next_back().map_or(0, |id| id.raw() + 1);

        Self {
            nodes,
            relationships,
            node_originals: BTreeMap::new(),
            relationship_originals: BTreeMap::new(),
            next_node_id,
            next_relationship_id,
        }
    }

    /// Whether the transaction touched anything.
    pub fn is_empty(&self) -> bool {
        self.node_originals.is_empty() && self.relationship_originals.is_empty()
    }

    /// Current graph state, consuming the change-set.
    pub fn into_graph(self) -> (Vec<Node>, Vec<Relationship>) {
        (
            self.nodes.into_values().collect(),
            self.relationships.into_values().collect(),
        )
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    /// Create a node with the given labels.
    pub fn create_node<I, S>(&mut self, labels: I) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;

        let mut node = Node::new(id);
        node.labels = labels.into_iter().map(Into::into).collect();
        self.nodes.insert(id, node);
        self.node_originals.insert(id, None);
        id
    }

    /// Set a node property, returning the value it replaced.
    pub fn set_node_property(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, ChangeSetError> {
        let node = self.touch_node(id)?;
        Ok(node.properties.insert(key.into(), value.into()))
    }

    /// Remove a node property, returning the removed value.
    pub fn remove_node_property(
        &mut self,
        id: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>, ChangeSetError> {
        let node = self.touch_node(id)?;
        Ok(node.properties.remove(key))
    }

    /// Add a label. Returns `false` if the node already had it.
    pub fn add_label(&mut self, id: NodeId, label: impl Into<String>) -> Result<bool, ChangeSetError> {
        let node = self.touch_node(id)?;
        Ok(node.labels.insert(label.into()))
    }

    /// Remove a label. Returns `false` if the node did not have it.
    pub fn remove_label(&mut self, id: NodeId, label: &str) -> Result<bool, ChangeSetError> {
        let node = self.touch_node(id)?;
        Ok(node.labels.remove(label))
    }

    /// Delete a node together with every relationship attached to it.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Node, ChangeSetError> {
        self.touch_node(id)?;

        let attached: Vec<RelationshipId> = self
            .relationships
            .values()
            .filter(|r| r.touches(id))
            .map(|r| r.id)
            .collect();
        for rel in attached {
            self.delete_relationship(rel)?;
        }

        self.nodes.remove(&id).ok_or(ChangeSetError::UnknownNode(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn touch_node(&mut self, id: NodeId) -> Result<&mut Node, ChangeSetError> {
        let node = self.nodes.get_mut(&id).ok_or(ChangeSetError::UnknownNode(id))?;
        self.node_originals
            .entry(id)
            .or_insert_with(|| Some(node.clone()));
        Ok(node)
    }

    // -------------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------------

    /// Create a relationship between two existing nodes.
    pub fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: impl Into<String>,
    ) -> Result<RelationshipId, ChangeSetError> {
        for node in [start, end] {
            if !self.nodes.contains_key(&node) {
                return Err(ChangeSetError::UnknownNode(node));
            }
        }

        let id = RelationshipId::new(self.next_relationship_id);
        self.next_relationship_id += 1;

        self.relationships
            .insert(id, Relationship::new(id, rel_type, start, end));
        self.relationship_originals.insert(id, None);
        Ok(id)
    }

    /// Set a relationship property, returning the value it replaced.
    pub fn set_relationship_property(
        &mut self,
        id: RelationshipId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, ChangeSetError> {
        let rel = self.touch_relationship(id)?;
        Ok(rel.properties.insert(key.into(), value.into()))
    }

    /// Remove a relationship property, returning the removed value.
    pub fn remove_relationship_property(
        &mut self,
        id: RelationshipId,
        key: &str,
    ) -> Result<Option<PropertyValue>, ChangeSetError> {
        let rel = self.touch_relationship(id)?;
        Ok(rel.properties.remove(key))
    }

    pub fn delete_relationship(&mut self, id: RelationshipId) -> Result<Relationship, ChangeSetError> {
        self.touch_relationship(id)?;
        self.relationships
            .remove(&id)
            .ok_or(ChangeSetError::UnknownRelationship(id))
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    fn touch_relationship(&mut self, id: RelationshipId) -> Result<&mut Relationship, ChangeSetError> {
        let rel = self
            .relationships
            .get_mut(&id)
            .ok_or(ChangeSetError::UnknownRelationship(id))?;
        self.relationship_originals
            .entry(id)
            .or_insert_with(|| Some(rel.clone()));
        Ok(rel)
    }

    // -------------------------------------------------------------------------
    // Diffing
    // -------------------------------------------------------------------------

    /// `(original, current)` of every touched node that existed at some point.
    fn touched_nodes(&self) -> impl Iterator<Item = (Option<&Node>, Option<&Node>)> {
        self.node_originals
            .iter()
            .map(|(id, original)| (original.as_ref(), self.nodes.get(id)))
            .filter(|(original, current)| original.is_some() || current.is_some())
    }

    fn touched_relationships(
        &self,
    ) -> impl Iterator<Item = (Option<&Relationship>, Option<&Relationship>)> {
        self.relationship_originals
            .iter()
            .map(|(id, original)| (original.as_ref(), self.relationships.get(id)))
            .filter(|(original, current)| original.is_some() || current.is_some())
    }
}

fn assigned_entries<Id: Copy>(
    entity: Id,
    original: Option<&BTreeMap<String, PropertyValue>>,
    current: &BTreeMap<String, PropertyValue>,
) -> Vec<PropertyEntry<Id>> {
    current
        .iter()
        .filter_map(|(key, value)| {
            let previous = original.and_then(|props| props.get(key));
            (previous != Some(value)).then(|| PropertyEntry {
                entity,
                key: key.clone(),
                value: Some(value.clone()),
                previous: previous.cloned(),
            })
        })
        .collect()
}

fn removed_entries<Id: Copy>(
    entity: Id,
    original: &BTreeMap<String, PropertyValue>,
    current: Option<&BTreeMap<String, PropertyValue>>,
) -> Vec<PropertyEntry<Id>> {
    original
        .iter()
        .filter(|(key, _)| current.map_or(true, |props| !props.contains_key(*key)))
        .map(|(key, value)| PropertyEntry {
            entity,
            key: key.clone(),
            value: None,
            previous: Some(value.clone()),
        })
        .collect()
}

fn label_difference(node: NodeId, from: &BTreeSet<String>, without: Option<&BTreeSet<String>>) -> Vec<LabelEntry> {
    from.iter()
        .filter(|label| without.map_or(true, |labels| !labels.contains(*label)))
        .map(|label| LabelEntry {
            node,
            label: label.clone(),
        })
        .collect()
}

impl TransactionData for ChangeSet {
    fn created_nodes(&self) -> Vec<NodeId> {
        self.touched_nodes()
            .filter_map(|(original, current)| match (original, current) {
                (None, Some(node)) => Some(node.id),
                _ => None,
            })
            .collect()
    }

    fn deleted_nodes(&self) -> Vec<NodeId> {
        self.touched_nodes()
            .filter_map(|(original, current)| match (original, current) {
                (Some(node), None) => Some(node.id),
                _ => None,
            })
            .collect()
    }

    fn created_relationships(&self) -> Vec<RelationshipId> {
        self.touched_relationships()
            .filter_map(|(original, current)| match (original, current) {
                (None, Some(rel)) => Some(rel.id),
                _ => None,
            })
            .collect()
    }

    fn deleted_relationships(&self) -> Vec<Relationship> {
        self.touched_relationships()
            .filter_map(|(original, current)| match (original, current) {
                (Some(rel), None) => Some(rel.without_properties()),
                _ => None,
            })
            .collect()
    }

    fn assigned_node_properties(&self) -> Vec<PropertyEntry<NodeId>> {
        self.touched_nodes()
            .filter_map(|(original, current)| {
                current.map(|node| assigned_entries(node.id, original.map(|o| &o.properties), &node.properties))
            })
            .flatten()
            .collect()
    }

    fn removed_node_properties(&self) -> Vec<PropertyEntry<NodeId>> {
        self.touched_nodes()
            .filter_map(|(original, current)| {
                original.map(|node| removed_entries(node.id, &node.properties, current.map(|c| &c.properties)))
            })
            .flatten()
            .collect()
    }

    fn assigned_relationship_properties(&self) -> Vec<PropertyEntry<RelationshipId>> {
        self.touched_relationships()
            .filter_map(|(original, current)| {
                current.map(|rel| assigned_entries(rel.id, original.map(|o| &o.properties), &rel.properties))
            })
            .flatten()
            .collect()
    }

    fn removed_relationship_properties(&self) -> Vec<PropertyEntry<RelationshipId>> {
        self.touched_relationships()
            .filter_map(|(original, current)| {
                original.map(|rel| removed_entries(rel.id, &rel.properties, current.map(|c| &c.properties)))
            })
            .flatten()
            .collect()
    }

    fn assigned_labels(&self) -> Vec<LabelEntry> {
        self.touched_nodes()
            .filter_map(|(original, current)| {
                current.map(|node| label_difference(node.id, &node.labels, original.map(|o| &o.labels)))
            })
            .flatten()
            .collect()
    }

    fn removed_labels(&self) -> Vec<LabelEntry> {
        self.touched_nodes()
            .filter_map(|(original, current)| {
                original.map(|node| label_difference(node.id, &node.labels, current.map(|c| &c.labels)))
            })
            .flatten()
            .collect()
    }

    fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.get(&id).cloned()
    }

    fn relationship(&self, id: RelationshipId) -> Option<Relationship> {
        self.relationships.get(&id).cloned()
    }
}
