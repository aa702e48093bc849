//! # Graph Entities
//!
//! Identifiers, property values and entity snapshots.
//!
//! ## Clusters
//!
//! - **Identity**: `NodeId`, `RelationshipId`, `EntityId`
//! - **Values**: `PropertyValue`, `Properties`
//! - **Snapshots**: `Node`, `Relationship`

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// IDENTITY
// =============================================================================

/// Unique identifier for a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new `NodeId` from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Unique identifier for a relationship.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct RelationshipId(pub u64);

impl RelationshipId {
    /// Create a new `RelationshipId` from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier that refers to either a node or a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Node(NodeId),
    Relationship(RelationshipId),
}

impl EntityId {
    /// Returns true if this is a node ID.
    pub fn is_node(&self) -> bool {
        matches!(self, EntityId::Node(_))
    }

    /// Get as a `NodeId` if this is a node reference.
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            EntityId::Node(id) => Some(*id),
            EntityId::Relationship(_) => None,
        }
    }

    /// Get as a `RelationshipId` if this is a relationship reference.
    pub fn as_relationship(&self) -> Option<RelationshipId> {
        match self {
            EntityId::Node(_) => None,
            EntityId::Relationship(id) => Some(*id),
        }
    }
}

impl From<NodeId> for EntityId {
    fn from(id: NodeId) -> Self {
        EntityId::Node(id)
    }
}

impl From<RelationshipId> for EntityId {
    fn from(id: RelationshipId) -> Self {
        EntityId::Relationship(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Node(id) => write!(f, "{}", id),
            EntityId::Relationship(id) => write!(f, "{}", id),
        }
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// A property value stored on a node or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "Bool",
            PropertyValue::Int(_) => "Int",
            PropertyValue::Float(_) => "Float",
            PropertyValue::String(_) => "String",
            PropertyValue::List(_) => "List",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::String(s) => write!(f, "\"{}\"", s),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

/// Property map of an entity, ordered by key.
pub type Properties = BTreeMap<String, PropertyValue>;

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Read access shared by nodes and relationships.
pub trait PropertyContainer {
    /// Identifier of the entity.
    fn entity_id(&self) -> EntityId;

    /// All properties of the entity.
    fn properties(&self) -> &Properties;

    /// A single property, if present.
    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties().get(key)
    }

    /// Whether the property is present.
    fn has_property(&self, key: &str) -> bool {
        self.properties().contains_key(key)
    }
}

/// Snapshot of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Labels attached to the node.
    pub labels: BTreeSet<String>,
    /// Node properties.
    pub properties: Properties,
}

impl Node {
    /// Create a node without labels or properties.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            labels: BTreeSet::new(),
            properties: Properties::new(),
        }
    }

    /// Add a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Whether the node carries the label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

impl PropertyContainer for Node {
    fn entity_id(&self) -> EntityId {
        EntityId::Node(self.id)
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.id)?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        write_properties(f, &self.properties)?;
        write!(f, ")")
    }
}

/// Snapshot of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship identifier.
    pub id: RelationshipId,
    /// Relationship type, e.g. `FRIEND_OF`.
    pub rel_type: String,
    /// Start node.
    pub start: NodeId,
    /// End node.
    pub end: NodeId,
    /// Relationship properties.
    pub properties: Properties,
}

impl Relationship {
    /// Create a relationship without properties.
    pub fn new(id: RelationshipId, rel_type: impl Into<String>, start: NodeId, end: NodeId) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            start,
            end,
            properties: Properties::new(),
        }
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Whether the relationship touches the node at either end.
    pub fn touches(&self, node: NodeId) -> bool {
        self.start == node || self.end == node
    }

    /// Same relationship with properties stripped.
    pub fn without_properties(&self) -> Self {
        Self {
            properties: Properties::new(),
            ..self.clone()
        }
    }
}

impl PropertyContainer for Relationship {
    fn entity_id(&self) -> EntityId {
        EntityId::Relationship(self.id)
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}:{}", self.start, self.id, self.rel_type)?;
        write_properties(f, &self.properties)?;
        write!(f, "]->({})", self.end)
    }
}

fn write_properties(f: &mut fmt::Formatter<'_>, properties: &Properties) -> fmt::Result {
    if properties.is_empty() {
        return Ok(());
    }
    write!(f, " {{")?;
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", key, value)?;
    }
    write!(f, "}}")
}
