//! Ports layer for the runtime.
//!
//! Defines the hexagonal architecture port traits:
//! - Inbound (Driving) ports: the commit hook the host calls
//! - Outbound (Driven) ports: modules, raw change-sets, bookkeeping storage

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
