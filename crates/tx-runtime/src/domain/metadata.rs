//! Persisted per-module bookkeeping.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Opaque state token returned by a module's `initialize`.
///
/// The runtime stores it and hands it back on the next start, so a module
/// can resume instead of rebuilding its state from the whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleToken(String);

impl ModuleToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bookkeeping persisted for one module key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Token returned by the last successful initialization.
    pub token: ModuleToken,
    /// Configuration fingerprint the module was initialized with.
    pub config_fingerprint: String,
    /// Set when the module reported that its state went out of sync.
    pub needs_initialization: bool,
    /// When the module last reported a problem (ms since epoch).
    pub problem_timestamp: Option<i64>,
    /// When the module was last initialized (ms since epoch).
    pub initialized_at: i64,
}

impl ModuleMetadata {
    /// Metadata for a module that has just been initialized.
    pub fn fresh(token: ModuleToken, config_fingerprint: impl Into<String>) -> Self {
        Self {
            token,
            config_fingerprint: config_fingerprint.into(),
            needs_initialization: false,
            problem_timestamp: None,
            initialized_at: Utc::now().timestamp_millis(),
        }
    }

    /// Copy flagged for full re-initialization on the next start.
    pub fn mark_needing_initialization(&self) -> Self {
        Self {
            needs_initialization: true,
            problem_timestamp: Some(Utc::now().timestamp_millis()),
            ..self.clone()
        }
    }

    /// The persisted token, if it can be handed back to a module configured
    /// with `config_fingerprint`.
    pub fn reusable_token(&self, config_fingerprint: &str) -> Option<&ModuleToken> {
        if self.needs_initialization || self.config_fingerprint != config_fingerprint {
            return None;
        }
        Some(&self.token)
    }
}
