//! Sample domain model.
//!
//! # Responsibility
//! - Define the canonical record for specimens and containers.
//! - Provide idempotent helpers for metadata, files and relationship sets.
//! - Validate per-entity rules before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another sample.
//! - `is_container`, `created_by`, `created_at` and `human_code` are fixed
//!   once the sample has been stored.
//! - A non-container never lists contained samples.
//! - Cross-entity invariants (bidirectional lineage/containment links) are
//!   owned by `SampleService`, not by this type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a sample.
pub type SampleId = Uuid;

/// Metadata map keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar metadata value.
///
/// Equality is exact: `Text("5")`, `Int(5)` and `Float(5.0)` are three
/// different values and never match each other in searches.
///
/// JSON has no NaN or infinity, so stored samples only carry finite floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Per-entity validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleValidationError {
    /// `id` is the nil UUID.
    NilId,
    /// Required text field is blank after trim.
    BlankField(&'static str),
    /// Sample references itself through the named relationship field.
    SelfReference(&'static str),
    /// Sample is not a container but lists contained samples.
    NotAContainer(SampleId),
    /// Metadata float under this key is NaN or infinite.
    NonFiniteMetadata(String),
}

impl Display for SampleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "sample id must not be nil"),
            Self::BlankField(field) => write!(f, "sample field `{field}` must not be blank"),
            Self::SelfReference(field) => {
                write!(f, "sample must not reference itself in `{field}`")
            }
            Self::NotAContainer(id) => {
                write!(f, "sample {id} is not a container and cannot hold samples")
            }
            Self::NonFiniteMetadata(key) => {
                write!(f, "metadata `{key}` must be a finite number")
            }
        }
    }
}

impl Error for SampleValidationError {}

/// Canonical record for one specimen or container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Stable global ID.
    pub id: SampleId,
    /// Short display code. Empty means "assign at insert".
    ///
    /// Serialized as `sample_id`, the name used by the BLIMS API payloads.
    #[serde(rename = "sample_id")]
    pub human_code: String,
    pub name: String,
    pub sample_type: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub file_paths: BTreeSet<String>,
    /// Samples this one was derived from.
    #[serde(default)]
    pub parent_ids: BTreeSet<SampleId>,
    /// Samples derived from this one. Transpose of other samples' `parent_ids`.
    #[serde(default)]
    pub child_ids: BTreeSet<SampleId>,
    #[serde(default)]
    pub is_container: bool,
    /// Meaningful only when `is_container` is set.
    #[serde(default)]
    pub contained_sample_ids: BTreeSet<SampleId>,
    /// Container currently holding this sample.
    #[serde(default)]
    pub container_id: Option<SampleId>,
    #[serde(default)]
    pub barcode: Option<String>,
}

impl Sample {
    /// Creates a sample with a generated stable ID.
    ///
    /// # Invariants
    /// - Relationship sets start empty and `container_id` is `None`.
    /// - `human_code` starts empty; the store assigns one on insert.
    pub fn new(
        name: impl Into<String>,
        sample_type: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), name, sample_type, created_by)
    }

    /// Creates a sample with a caller-provided stable ID.
    ///
    /// Used by import paths and by deterministic ID suppliers.
    pub fn with_id(
        id: SampleId,
        name: impl Into<String>,
        sample_type: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id,
            human_code: String::new(),
            name: name.into(),
            sample_type: sample_type.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            metadata: Metadata::new(),
            file_paths: BTreeSet::new(),
            parent_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
            is_container: false,
            contained_sample_ids: BTreeSet::new(),
            container_id: None,
            barcode: None,
        }
    }

    /// Same as `new`, flagged as a container.
    pub fn container(
        name: impl Into<String>,
        sample_type: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let mut sample = Self::new(name, sample_type, created_by);
        sample.is_container = true;
        sample
    }

    /// Inserts or replaces one metadata entry.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Adds a file path. Returns `false` when the path was already present.
    pub fn add_file(&mut self, path: impl Into<String>) -> bool {
        self.file_paths.insert(path.into())
    }

    /// Adds a lineage parent. Returns `false` when already present.
    pub fn add_parent(&mut self, parent_id: SampleId) -> bool {
        self.parent_ids.insert(parent_id)
    }

    /// Adds a lineage child. Returns `false` when already present.
    pub fn add_child(&mut self, child_id: SampleId) -> bool {
        self.child_ids.insert(child_id)
    }

    pub fn add_contained_sample(&mut self, sample_id: SampleId) -> bool {
        self.contained_sample_ids.insert(sample_id)
    }

    pub fn remove_contained_sample(&mut self, sample_id: SampleId) -> bool {
        self.contained_sample_ids.remove(&sample_id)
    }

    pub fn set_container(&mut self, container_id: Option<SampleId>) {
        self.container_id = container_id;
    }

    /// Returns the metadata value stored under `key`.
    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Exact-match metadata check used by search paths.
    pub fn metadata_matches(&self, key: &str, value: &MetadataValue) -> bool {
        self.metadata.get(key) == Some(value)
    }

    /// Validates per-entity rules.
    ///
    /// Does not look at other samples; link consistency is checked by the
    /// service layer.
    pub fn validate(&self) -> Result<(), SampleValidationError> {
        if self.id.is_nil() {
            return Err(SampleValidationError::NilId);
        }
        if self.name.trim().is_empty() {
            return Err(SampleValidationError::BlankField("name"));
        }
        if self.sample_type.trim().is_empty() {
            return Err(SampleValidationError::BlankField("sample_type"));
        }
        if self.created_by.trim().is_empty() {
            return Err(SampleValidationError::BlankField("created_by"));
        }
        if self.parent_ids.contains(&self.id) {
            return Err(SampleValidationError::SelfReference("parent_ids"));
        }
        if self.child_ids.contains(&self.id) {
            return Err(SampleValidationError::SelfReference("child_ids"));
        }
        if self.contained_sample_ids.contains(&self.id) {
            return Err(SampleValidationError::SelfReference("contained_sample_ids"));
        }
        if self.container_id == Some(self.id) {
            return Err(SampleValidationError::SelfReference("container_id"));
        }
        if !self.is_container && !self.contained_sample_ids.is_empty() {
            return Err(SampleValidationError::NotAContainer(self.id));
        }
        for (key, value) in &self.metadata {
            if matches!(value, MetadataValue::Float(number) if !number.is_finite()) {
                return Err(SampleValidationError::NonFiniteMetadata(key.clone()));
            }
        }
        Ok(())
    }
}
