//! # Domain Layer
//!
//! Lifecycle, registry and transaction view of the module runtime.
//!
//! ## Hexagonal Architecture
//!
//! This module contains NO I/O. Module bookkeeping storage and the host's
//! change-set are reached through the traits in `ports`.

pub mod config;
pub mod errors;
pub mod guard;
pub mod lifecycle;
pub mod metadata;
pub mod registry;
pub mod transaction_view;

pub use config::{RuntimeConfig, DEFAULT_INTERNAL_PREFIX, METADATA_KEY_SEPARATOR};
pub use errors::*;
pub use guard::ensure_legal;
pub use lifecycle::{DispatchGuard, LifecycleHooks, RuntimeLifecycle, RuntimeState};
pub use metadata::{ModuleMetadata, ModuleToken};
pub use registry::{ModuleRegistry, RegisteredModule};
pub use transaction_view::LazyTransactionData;
