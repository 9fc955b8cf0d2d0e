//! Sample Store abstractions and implementations.
//!
//! # Responsibility
//! - Define the data access contract consumed by the lineage engine.
//! - Keep storage details (maps, indexes, counters) out of the service layer.
//!
//! # Invariants
//! - Repository writes enforce `Sample::validate()` before mutation.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateId`).

pub mod sample_repo;
