//! `repository` crate: versioned workflow storage.
//!
//! Workflows live here as immutable versioned records with a
//! draft/published lifecycle: drafts are edited freely, publishing
//! freezes a version, and the engine only ever resolves the latest
//! published one.

pub mod error;
pub mod memory;
pub mod models;

pub use error::RepositoryError;
pub use memory::InMemoryRepository;
pub use models::WorkflowRecord;
