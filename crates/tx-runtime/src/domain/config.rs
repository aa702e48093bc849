//! # Runtime Configuration
//!
//! Tunables supplied by the embedding host.
//!
//! ## Environment
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TXR_RUNTIME_NAME` | `txr` | Name used in logs and metrics |
//! | `TXR_INTERNAL_PREFIX` | `_TXR_` | Prefix of keys, labels and types reserved for the runtime |
//! | `TXR_SUPPORTED_CAPABILITY` | `tx-driven` | Module capability this runtime accepts |

use std::env;

use tracing::warn;

use crate::domain::errors::ConfigError;
use crate::ports::ModuleCapability;

/// Default prefix of runtime-owned property keys, labels and relationship types.
pub const DEFAULT_INTERNAL_PREFIX: &str = "_TXR_";

/// Separates the runtime name from the module key in metadata keys.
pub const METADATA_KEY_SEPARATOR: char = '/';

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Runtime name, used in logs and metric labels.
    pub name: String,
    /// Anything starting with this prefix belongs to the runtime's own
    /// bookkeeping and must not be touched by user transactions.
    pub internal_prefix: String,
    /// Modules with any other capability are ignored at registration.
    pub supported_capability: ModuleCapability,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "txr".to_string(),
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
            supported_capability: ModuleCapability::TxDriven,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with the given runtime name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the reserved prefix.
    pub fn with_internal_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.internal_prefix = prefix.into();
        self
    }

    /// Set the accepted module capability.
    pub fn supporting(mut self, capability: ModuleCapability) -> Self {
        self.supported_capability = capability;
        self
    }

    /// Whether a property key, label or relationship type is reserved.
    #[must_use]
    pub fn is_internal(&self, name: &str) -> bool {
        name.starts_with(&self.internal_prefix)
    }

    /// Key under which a module's metadata is stored.
    ///
    /// Scoped by runtime name, so runtimes sharing one repository never see
    /// (or purge) each other's modules.
    pub fn metadata_key(&self, module: &str) -> String {
        format!("{}{}{}", self.name, METADATA_KEY_SEPARATOR, module)
    }

    /// Module key of a stored metadata key, if it belongs to this runtime.
    pub fn module_of<'k>(&self, metadata_key: &'k str) -> Option<&'k str> {
        metadata_key
            .strip_prefix(self.name.as_str())?
            .strip_prefix(METADATA_KEY_SEPARATOR)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_prefix.is_empty() {
            return Err(ConfigError::EmptyInternalPrefix);
        }
        if self.name.is_empty() || self.name.contains(METADATA_KEY_SEPARATOR) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        Ok(())
    }

    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = env::var("TXR_RUNTIME_NAME") {
            config.name = name;
        }
        if let Ok(prefix) = env::var("TXR_INTERNAL_PREFIX") {
            config.internal_prefix = prefix;
        }
        if let Ok(value) = env::var("TXR_SUPPORTED_CAPABILITY") {
            match value.parse() {
                Ok(capability) => config.supported_capability = capability,
                Err(e) => warn!("[Config] Ignoring TXR_SUPPORTED_CAPABILITY: {}", e),
            }
        }

        config
    }
}
