//! # Adapters Layer
//!
//! Implementations of the outbound ports: an in-memory change-set for hosts
//! and tests, and two module bookkeeping repositories.

pub mod change_set;
pub mod file_repository;
pub mod memory_repository;

pub use change_set::ChangeSet;
pub use file_repository::JsonFileMetadataRepository;
pub use memory_repository::InMemoryMetadataRepository;
