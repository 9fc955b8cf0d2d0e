//! Sample domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by the lineage/containment core.
//! - Own identifier and human-code generation primitives.
//!
//! # Invariants
//! - Every sample is identified by a stable `SampleId`.
//! - Human codes are generated by a per-store counter, never global state.

pub mod human_code;
pub mod ids;
pub mod sample;
