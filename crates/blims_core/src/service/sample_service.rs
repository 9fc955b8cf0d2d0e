//! Lineage & containment use-case service.
//!
//! # Responsibility
//! - Validate cross-entity invariants above the Sample Store.
//! - Create and derive samples, edit metadata/files/details, link lineage.
//! - Answer lineage and metadata search queries.
//!
//! # Invariants
//! - Every referenced id is resolved before the first write; a failed call
//!   leaves the store untouched.
//! - `parent_ids`/`child_ids` stay transposes of each other.
//! - Lineage edges never form a cycle.
//!
//! Container operations live in `service::containment`.

use crate::config::{LimsConfig, DEFAULT_MAX_HIERARCHY_DEPTH};
use crate::model::ids::{RandomSampleIds, SampleIdSupplier};
use crate::model::sample::{Metadata, MetadataValue, Sample, SampleId, SampleValidationError};
use crate::repo::sample_repo::{RepoError, SampleListQuery, SampleRepository, TraversalMode};
use crate::service::integrity::{check_integrity, IntegrityViolation};
use crate::service::writes::PendingWrites;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from lineage and containment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleServiceError {
    /// Referenced sample or container does not exist.
    NotFound(SampleId),
    /// A requested lineage parent does not exist.
    ParentNotFound(SampleId),
    /// A requested contained sample does not exist.
    ContainedSampleNotFound(SampleId),
    /// Target exists but is not flagged as a container.
    NotAContainer(SampleId),
    /// Generated or supplied id is already taken.
    DuplicateId(SampleId),
    /// Linking would make a sample its own lineage ancestor.
    LineageCycle {
        child_id: SampleId,
        parent_id: SampleId,
    },
    /// Placing the sample would make it contain itself.
    ContainmentCycle {
        sample_id: SampleId,
        container_id: SampleId,
    },
    /// Containment nesting exceeds the configured bound.
    HierarchyTooDeep {
        container_id: SampleId,
        max_depth: usize,
    },
    /// Per-entity validation failure.
    Validation(SampleValidationError),
    /// Store-level failure.
    Repo(RepoError),
}

impl SampleServiceError {
    /// Whether the error describes bad caller input rather than missing state.
    ///
    /// Missing relationship targets during creation count as validation
    /// errors, matching how API layers report them.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::ParentNotFound(_) | Self::ContainedSampleNotFound(_) | Self::Validation(_)
        )
    }
}

impl Display for SampleServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "sample not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent sample not found: {id}"),
            Self::ContainedSampleNotFound(id) => write!(f, "contained sample not found: {id}"),
            Self::NotAContainer(id) => write!(f, "sample is not a container: {id}"),
            Self::DuplicateId(id) => write!(f, "sample already exists: {id}"),
            Self::LineageCycle {
                child_id,
                parent_id,
            } => write!(
                f,
                "lineage link would create cycle: {child_id} derived from {parent_id}"
            ),
            Self::ContainmentCycle {
                sample_id,
                container_id,
            } => write!(
                f,
                "containment would create cycle: {sample_id} inside {container_id}"
            ),
            Self::HierarchyTooDeep {
                container_id,
                max_depth,
            } => write!(
                f,
                "container hierarchy under {container_id} exceeds depth {max_depth}"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SampleServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SampleServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::DuplicateId(id) => Self::DuplicateId(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<SampleValidationError> for SampleServiceError {
    fn from(value: SampleValidationError) -> Self {
        Self::Validation(value)
    }
}

pub type ServiceResult<T> = Result<T, SampleServiceError>;

/// Request model for creating a sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSample {
    pub name: String,
    pub sample_type: String,
    pub created_by: String,
    pub metadata: Metadata,
    /// Lineage parents, checked in order; the first missing one is reported.
    pub parent_ids: Vec<SampleId>,
    pub file_paths: Vec<String>,
    /// Samples placed inside the new sample; requires `is_container`.
    pub contained_sample_ids: Vec<SampleId>,
    pub is_container: bool,
    pub barcode: Option<String>,
    /// Explicit human code for import paths; generated when `None`.
    pub human_code: Option<String>,
}

impl NewSample {
    pub fn new(
        name: impl Into<String>,
        sample_type: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sample_type: sample_type.into(),
            created_by: created_by.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_id: SampleId) -> Self {
        self.parent_ids.push(parent_id);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    pub fn containing(mut self, sample_id: SampleId) -> Self {
        self.contained_sample_ids.push(sample_id);
        self
    }

    pub fn as_container(mut self) -> Self {
        self.is_container = true;
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_human_code(mut self, human_code: impl Into<String>) -> Self {
        self.human_code = Some(human_code.into());
        self
    }
}

/// Editable descriptive fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleDetails {
    pub name: Option<String>,
    pub sample_type: Option<String>,
    /// `Some(None)` clears the barcode.
    pub barcode: Option<Option<String>>,
}

/// Ancestors and descendants of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub ancestors: Vec<Sample>,
    pub descendants: Vec<Sample>,
}

/// Lineage & containment engine over a Sample Store.
pub struct SampleService<R: SampleRepository> {
    pub(crate) repo: R,
    ids: Box<dyn SampleIdSupplier + Send>,
    pub(crate) traversal: TraversalMode,
    pub(crate) max_depth: usize,
}

impl<R: SampleRepository> SampleService<R> {
    /// Creates a service with default traversal and random ids.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            ids: Box::new(RandomSampleIds),
            traversal: TraversalMode::default(),
            max_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }

    /// Creates a service tuned by `config`, moving the code counter past
    /// `human_code_floor`.
    pub fn with_config(mut repo: R, config: &LimsConfig) -> Self {
        repo.reset_human_codes(config.human_code_floor);
        Self {
            repo,
            ids: Box::new(RandomSampleIds),
            traversal: config.lineage_traversal,
            max_depth: config.max_hierarchy_depth.max(1),
        }
    }

    /// Replaces the identifier supplier used for new samples.
    pub fn with_id_supplier(mut self, ids: impl SampleIdSupplier + Send + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_traversal(mut self, traversal: TraversalMode) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn into_inner(self) -> R {
        self.repo
    }

    /// Creates a sample after validating every referenced id.
    ///
    /// # Contract
    /// - Missing parent -> `ParentNotFound`, missing contained sample ->
    ///   `ContainedSampleNotFound`; nothing is written on failure.
    /// - New id is propagated into each parent's `child_ids` by the store.
    /// - Each contained sample gets `container_id` set to the new sample;
    ///   one held by another container is moved out of it silently.
    /// - `HierarchyTooDeep` when the contents would nest deeper than the
    ///   configured bound under the new container.
    pub fn create_sample(&mut self, request: NewSample) -> ServiceResult<Sample> {
        for parent_id in &request.parent_ids {
            if !self.repo.contains(*parent_id) {
                return Err(SampleServiceError::ParentNotFound(*parent_id));
            }
        }
        for contained_id in &request.contained_sample_ids {
            if !self.repo.contains(*contained_id) {
                return Err(SampleServiceError::ContainedSampleNotFound(*contained_id));
            }
        }

        let id = self.ids.next_id();
        if self.repo.contains(id) {
            return Err(SampleServiceError::DuplicateId(id));
        }
        if request.is_container {
            let tallest = request
                .contained_sample_ids
                .iter()
                .filter_map(|contained_id| self.repo.get_sample(*contained_id))
                .map(|contained| self.nested_height(&contained))
                .max()
                .unwrap_or(0);
            if 1 + tallest > self.max_depth {
                return Err(SampleServiceError::HierarchyTooDeep {
                    container_id: id,
                    max_depth: self.max_depth,
                });
            }
        }

        let mut sample = Sample::with_id(id, request.name, request.sample_type, request.created_by);
        sample.human_code = request.human_code.unwrap_or_default();
        sample.metadata = request.metadata;
        sample.file_paths = request.file_paths.into_iter().collect();
        sample.parent_ids = request.parent_ids.into_iter().collect();
        sample.contained_sample_ids = request.contained_sample_ids.into_iter().collect();
        sample.is_container = request.is_container;
        sample.barcode = request.barcode;
        sample.validate()?;

        // Staged after the insert so parents that are also contained samples
        // keep the child link the store just propagated.
        let created = self.repo.create_sample(sample)?;
        let mut writes = PendingWrites::new();
        for contained_id in &created.contained_sample_ids {
            let previous = match writes.load(&self.repo, *contained_id) {
                Some(contained) => contained.container_id.replace(id),
                None => continue,
            };
            if let Some(previous_container) = previous {
                if let Some(old) = writes.load(&self.repo, previous_container) {
                    old.remove_contained_sample(*contained_id);
                }
            }
        }
        if let Err(err) = writes.commit(&mut self.repo) {
            self.rollback_create(&created);
            return Err(err.into());
        }

        info!(
            "event=sample_create module=service status=ok sample_id={} human_code={} parents={} contained={}",
            created.id,
            created.human_code,
            created.parent_ids.len(),
            created.contained_sample_ids.len()
        );
        Ok(created)
    }

    /// Creates a sample derived from `parent_id`.
    ///
    /// The parent is checked before any other work; `request.parent_ids` is
    /// replaced by `[parent_id]`.
    pub fn derive_sample(
        &mut self,
        parent_id: SampleId,
        mut request: NewSample,
    ) -> ServiceResult<Sample> {
        if !self.repo.contains(parent_id) {
            return Err(SampleServiceError::ParentNotFound(parent_id));
        }
        request.parent_ids = vec![parent_id];
        self.create_sample(request)
    }

    /// Adds a lineage edge `parent_id -> child_id` on both sides.
    ///
    /// Idempotent. Rejects self-links and edges closing a lineage cycle.
    pub fn link_parent(&mut self, child_id: SampleId, parent_id: SampleId) -> ServiceResult<Sample> {
        let child = self.require(child_id)?;
        if !self.repo.contains(parent_id) {
            return Err(SampleServiceError::ParentNotFound(parent_id));
        }
        if child_id == parent_id
            || self
                .repo
                .get_ancestry(parent_id, TraversalMode::Distinct)?
                .iter()
                .any(|ancestor| ancestor.id == child_id)
        {
            return Err(SampleServiceError::LineageCycle {
                child_id,
                parent_id,
            });
        }
        if child.parent_ids.contains(&parent_id) {
            return Ok(child);
        }

        let mut writes = PendingWrites::new();
        if let Some(parent) = writes.load(&self.repo, parent_id) {
            parent.add_child(child_id);
        }
        if let Some(child) = writes.load(&self.repo, child_id) {
            child.add_parent(parent_id);
        }
        let updated = writes.get(child_id).cloned().unwrap_or(child);
        writes.commit(&mut self.repo)?;

        info!(
            "event=lineage_link module=service status=ok child_id={} parent_id={}",
            child_id, parent_id
        );
        Ok(updated)
    }

    /// Inserts or replaces one metadata entry.
    pub fn add_metadata(
        &mut self,
        sample_id: SampleId,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> ServiceResult<Sample> {
        let mut sample = self.require(sample_id)?;
        sample.add_metadata(key, value);
        self.repo.update_sample(&sample)?;
        Ok(sample)
    }

    /// Adds a file path; adding the same path twice is a no-op.
    pub fn add_file(&mut self, sample_id: SampleId, path: impl Into<String>) -> ServiceResult<Sample> {
        let mut sample = self.require(sample_id)?;
        if sample.add_file(path) {
            self.repo.update_sample(&sample)?;
        }
        Ok(sample)
    }

    /// Edits descriptive fields; relationships are untouched.
    pub fn update_details(
        &mut self,
        sample_id: SampleId,
        details: SampleDetails,
    ) -> ServiceResult<Sample> {
        let mut sample = self.require(sample_id)?;
        if let Some(name) = details.name {
            sample.name = name.trim().to_string();
        }
        if let Some(sample_type) = details.sample_type {
            sample.sample_type = sample_type.trim().to_string();
        }
        if let Some(barcode) = details.barcode {
            sample.barcode = barcode;
        }
        self.repo.update_sample(&sample)?;
        Ok(sample)
    }

    /// Removes a sample after detaching every lineage and containment edge
    /// that points at it.
    pub fn delete_sample(&mut self, sample_id: SampleId) -> ServiceResult<Sample> {
        let sample = self.require(sample_id)?;

        let mut writes = PendingWrites::new();
        if let Some(container_id) = sample.container_id {
            if let Some(container) = writes.load(&self.repo, container_id) {
                container.remove_contained_sample(sample_id);
            }
        }
        for contained_id in &sample.contained_sample_ids {
            if let Some(contained) = writes.load(&self.repo, *contained_id) {
                if contained.container_id == Some(sample_id) {
                    contained.set_container(None);
                }
            }
        }
        for parent_id in &sample.parent_ids {
            if let Some(parent) = writes.load(&self.repo, *parent_id) {
                parent.child_ids.remove(&sample_id);
            }
        }
        for child_id in &sample.child_ids {
            if let Some(child) = writes.load(&self.repo, *child_id) {
                child.parent_ids.remove(&sample_id);
            }
        }
        writes.commit(&mut self.repo)?;
        self.repo.delete_sample(sample_id);

        info!(
            "event=sample_delete module=service status=ok sample_id={}",
            sample_id
        );
        Ok(sample)
    }

    pub fn get_sample(&self, sample_id: SampleId) -> Option<Sample> {
        self.repo.get_sample(sample_id)
    }

    pub fn get_sample_by_code(&self, human_code: &str) -> Option<Sample> {
        self.repo.get_sample_by_code(human_code)
    }

    pub fn get_all_samples(&self) -> Vec<Sample> {
        self.repo.get_all()
    }

    pub fn get_samples_by_type(&self, sample_type: &str) -> Vec<Sample> {
        self.repo.list_samples(&SampleListQuery {
            sample_type: Some(sample_type.to_string()),
            ..SampleListQuery::default()
        })
    }

    /// Samples whose `container_id` points at `container_id`.
    pub fn get_samples_by_container(&self, container_id: SampleId) -> Vec<Sample> {
        self.repo.list_samples(&SampleListQuery {
            container_id: Some(container_id),
            ..SampleListQuery::default()
        })
    }

    pub fn get_containers(&self) -> Vec<Sample> {
        self.repo.list_samples(&SampleListQuery {
            containers_only: true,
            ..SampleListQuery::default()
        })
    }

    pub fn count(&self) -> usize {
        self.repo.count()
    }

    /// Moves the code counter forward so the next code follows `floor`.
    pub fn reset_human_codes(&mut self, floor: u64) {
        self.repo.reset_human_codes(floor);
    }

    /// Returns ancestors and descendants using the configured traversal mode.
    pub fn get_lineage(&self, sample_id: SampleId) -> ServiceResult<Lineage> {
        if !self.repo.contains(sample_id) {
            return Err(SampleServiceError::NotFound(sample_id));
        }
        Ok(Lineage {
            ancestors: self.repo.get_ancestry(sample_id, self.traversal)?,
            descendants: self.repo.get_descendants(sample_id, self.traversal)?,
        })
    }

    /// Samples whose metadata matches every filter exactly.
    ///
    /// An empty filter set returns every sample.
    pub fn search_samples(&self, filters: &Metadata) -> Vec<Sample> {
        let mut filters = filters.iter();
        let mut results = match filters.next() {
            Some((key, value)) => self.repo.get_by_metadata(key, value),
            None => return self.repo.get_all(),
        };
        for (key, value) in filters {
            results.retain(|sample| sample.metadata_matches(key, value));
        }
        results
    }

    /// Verifies lineage and containment invariants across the whole store.
    pub fn check_integrity(&self) -> Vec<IntegrityViolation> {
        check_integrity(&self.repo)
    }

    pub(crate) fn require(&self, sample_id: SampleId) -> ServiceResult<Sample> {
        self.repo
            .get_sample(sample_id)
            .ok_or(SampleServiceError::NotFound(sample_id))
    }

    // Undoes a store insert whose follow-up link writes failed.
    fn rollback_create(&mut self, created: &Sample) {
        let mut writes = PendingWrites::new();
        for parent_id in &created.parent_ids {
            if let Some(parent) = writes.load(&self.repo, *parent_id) {
                parent.child_ids.remove(&created.id);
            }
        }
        if let Err(err) = writes.commit(&mut self.repo) {
            warn!(
                "event=sample_create_rollback module=service status=error sample_id={} error={}",
                created.id, err
            );
        }
        self.repo.delete_sample(created.id);
    }
}

#[cfg(test)]
mod tests {
    use super::{NewSample, SampleService, SampleServiceError};
    use crate::model::ids::SequentialSampleIds;
    use crate::model::sample::{Metadata, MetadataValue};
    use crate::repo::sample_repo::InMemorySampleRepository;
    use uuid::Uuid;

    fn service() -> SampleService<InMemorySampleRepository> {
        SampleService::new(InMemorySampleRepository::new())
            .with_id_supplier(SequentialSampleIds::starting_at(1))
    }

    #[test]
    fn create_uses_injected_ids_and_codes() {
        let mut service = service();
        let sample = service
            .create_sample(NewSample::new("Blood draw", "Blood", "alice"))
            .unwrap();

        assert_eq!(sample.id, Uuid::from_u128(1));
        assert_eq!(sample.human_code, "s1");
    }

    #[test]
    fn duplicate_generated_id_is_rejected_without_insert() {
        let mut service = service();
        service
            .create_sample(NewSample::new("a", "Blood", "alice"))
            .unwrap();

        let mut replay = SampleService::new(service.into_inner())
            .with_id_supplier(SequentialSampleIds::starting_at(1));
        let err = replay
            .create_sample(NewSample::new("b", "Blood", "alice"))
            .unwrap_err();
        assert_eq!(err, SampleServiceError::DuplicateId(Uuid::from_u128(1)));
        assert_eq!(replay.count(), 1);
    }

    #[test]
    fn validation_classification() {
        let id = Uuid::from_u128(5);
        assert!(SampleServiceError::ParentNotFound(id).is_validation_error());
        assert!(SampleServiceError::ContainedSampleNotFound(id).is_validation_error());
        assert!(!SampleServiceError::NotFound(id).is_validation_error());
        assert!(!SampleServiceError::NotAContainer(id).is_validation_error());
    }

    #[test]
    fn search_with_multiple_filters_requires_all() {
        let mut service = service();
        let hit = service
            .create_sample(
                NewSample::new("a", "DNA", "alice")
                    .with_metadata("project", "P1")
                    .with_metadata("passed_qc", true),
            )
            .unwrap();
        service
            .create_sample(NewSample::new("b", "DNA", "alice").with_metadata("project", "P1"))
            .unwrap();

        let mut filters = Metadata::new();
        filters.insert("project".to_string(), MetadataValue::from("P1"));
        filters.insert("passed_qc".to_string(), MetadataValue::Bool(true));

        let results = service.search_samples(&filters);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit.id);
        assert_eq!(service.search_samples(&Metadata::new()).len(), 2);
    }
}
