//! # Shared Types Crate
//!
//! Graph primitives used across the runtime, its modules and host shims.
//!
//! ## Design Principles
//!
//! - **Snapshots, not handles**: `Node` and `Relationship` are plain values
//!   describing an entity at one point of a transaction. Nothing here can
//!   write back to the store.
//! - **Deterministic ordering**: labels and properties use ordered
//!   collections so that two snapshots of the same state compare and print
//!   identically.

pub mod change;
pub mod entities;

pub use change::Change;
pub use entities::*;
