//! Core domain logic for BLIMS sample tracking.
//! This crate is the single source of truth for lineage and containment invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, load_config_from_env, ConfigError, LimsConfig};
pub use logging::init_logging;
pub use model::human_code::{parse_human_code, HumanCodeCounter};
pub use model::ids::{RandomSampleIds, SampleIdSupplier, SequentialSampleIds};
pub use model::sample::{Metadata, MetadataValue, Sample, SampleId, SampleValidationError};
pub use repo::sample_repo::{
    InMemorySampleRepository, RepoError, RepoResult, SampleListQuery, SampleRepository,
    TraversalMode,
};
pub use service::containment::ContainerNode;
pub use service::integrity::{check_integrity, IntegrityViolation};
pub use service::sample_service::{
    Lineage, NewSample, SampleDetails, SampleService, SampleServiceError, ServiceResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
