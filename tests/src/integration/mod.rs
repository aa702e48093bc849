//! # Integration Tests
//!
//! End-to-end flows: a host kernel commits transactions through one or more
//! runtimes.

pub mod dispatch_flows;
