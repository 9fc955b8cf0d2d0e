//! Lineage & containment engine.
//!
//! # Responsibility
//! - Orchestrate Sample Store calls into use-case level APIs.
//! - Keep presentation layers decoupled from storage details.

pub mod containment;
pub mod integrity;
pub mod sample_service;
mod writes;
