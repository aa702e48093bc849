//! Rejection of transactions that touch runtime-owned graph state.
//!
//! Property keys, labels and relationship types starting with the configured
//! internal prefix belong to the runtime. A user transaction that assigns or
//! removes any of them is rejected before a single module sees it.

use crate::domain::config::RuntimeConfig;
use crate::domain::errors::RuntimeError;
use crate::ports::TransactionData;

/// Fail with `IllegalTransaction` if `data` modifies internal state.
pub fn ensure_legal(config: &RuntimeConfig, data: &dyn TransactionData) -> Result<(), RuntimeError> {
    let illegal = |what: &str, name: &str, action: &str| RuntimeError::IllegalTransaction {
        reason: format!(
            "{} {} {} starts with the internal prefix {}",
            action, what, name, config.internal_prefix
        ),
    };

    for entry in data.assigned_node_properties() {
        if config.is_internal(&entry.key) {
            return Err(illegal("node property", &entry.key, "assigning"));
        }
    }
    for entry in data.removed_node_properties() {
        if config.is_internal(&entry.key) {
            return Err(illegal("node property", &entry.key, "removing"));
        }
    }
    for entry in data.assigned_relationship_properties() {
        if config.is_internal(&entry.key) {
            return Err(illegal("relationship property", &entry.key, "assigning"));
        }
    }
    for entry in data.removed_relationship_properties() {
        if config.is_internal(&entry.key) {
            return Err(illegal("relationship property", &entry.key, "removing"));
        }
    }
    for entry in data.assigned_labels() {
        if config.is_internal(&entry.label) {
            return Err(illegal("label", &entry.label, "assigning"));
        }
    }
    for entry in data.removed_labels() {
        if config.is_internal(&entry.label) {
            return Err(illegal("label", &entry.label, "removing"));
        }
    }

    for id in data.created_relationships() {
        if let Some(rel) = data.relationship(id) {
            if config.is_internal(&rel.rel_type) {
                return Err(illegal("relationship type", &rel.rel_type, "creating"));
            }
        }
    }
    for rel in data.deleted_relationships() {
        if config.is_internal(&rel.rel_type) {
            return Err(illegal("relationship type", &rel.rel_type, "deleting"));
        }
    }

    Ok(())
}
