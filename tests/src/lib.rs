//! # Tx-Runtime Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── dispatch_benchmarks.rs  # criterion: commit path, view, guard
//! └── src/
//!     ├── harness.rs              # in-memory host kernel + sample modules
//!     └── integration/            # end-to-end flows through the kernel
//!         ├── lifecycle_flows.rs
//!         └── dispatch_flows.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p tx-runtime-tests
//!
//! # By category
//! cargo test -p tx-runtime-tests integration::lifecycle_flows
//! cargo test -p tx-runtime-tests integration::dispatch_flows
//!
//! # Benchmarks
//! cargo bench -p tx-runtime-tests
//! ```

pub mod harness;
pub mod integration;
