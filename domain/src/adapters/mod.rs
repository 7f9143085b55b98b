//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory repository backs unit tests and local runs. The DynamoDB
//! adapter lives in its own crate.

pub mod memory_repo;
