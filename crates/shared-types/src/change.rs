//! Before/after pair of an entity changed by a transaction.

use serde::{Deserialize, Serialize};

use crate::entities::{Node, PropertyContainer};

/// An entity as it was before the transaction and as it is now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub previous: T,
    pub current: T,
}

impl<T> Change<T> {
    pub fn new(previous: T, current: T) -> Self {
        Self { previous, current }
    }
}

impl<T: PropertyContainer> Change<T> {
    /// Keys present now but absent before.
    pub fn assigned_keys(&self) -> Vec<&str> {
        self.current
            .properties()
            .keys()
            .filter(|key| !self.previous.has_property(key))
            .map(String::as_str)
            .collect()
    }

    /// Keys present before but absent now.
    pub fn removed_keys(&self) -> Vec<&str> {
        self.previous
            .properties()
            .keys()
            .filter(|key| !self.current.has_property(key))
            .map(String::as_str)
            .collect()
    }

    /// Keys present on both sides with different values.
    pub fn updated_keys(&self) -> Vec<&str> {
        self.current
            .properties()
            .iter()
            .filter(|(key, value)| {
                self.previous
                    .property(key)
                    .is_some_and(|previous| previous != *value)
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Whether any property differs between the two sides.
    pub fn properties_changed(&self) -> bool {
        self.previous.properties() != self.current.properties()
    }
}

impl Change<Node> {
    /// Labels present now but absent before.
    pub fn assigned_labels(&self) -> Vec<&str> {
        self.current
            .labels
            .difference(&self.previous.labels)
            .map(String::as_str)
            .collect()
    }

    /// Labels present before but absent now.
    pub fn removed_labels(&self) -> Vec<&str> {
        self.previous
            .labels
            .difference(&self.current.labels)
            .map(String::as_str)
            .collect()
    }
}
