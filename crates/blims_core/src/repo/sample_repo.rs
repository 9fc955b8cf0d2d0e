//! Sample Store contracts and in-memory implementation.
//!
//! # Responsibility
//! - Provide the authoritative keyed collection of samples.
//! - Maintain secondary lookups (human code, metadata, type, container).
//! - Answer ancestry/descendant traversals over lineage edges.
//!
//! # Invariants
//! - Write paths call `Sample::validate()` before mutating the store.
//! - `create_sample` propagates the new id into existing parents' `child_ids`
//!   and nothing else; all other cross-entity links are the service's job.
//! - Human codes are unique for the lifetime of one store instance.
//! - `update_samples` validates the whole batch before the first write.

use crate::model::human_code::HumanCodeCounter;
use crate::model::sample::{MetadataValue, Sample, SampleId, SampleValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level error for sample persistence and query operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Validation(SampleValidationError),
    NotFound(SampleId),
    DuplicateId(SampleId),
    DuplicateHumanCode(String),
    /// Update attempted to change a field fixed at creation.
    ImmutableField {
        id: SampleId,
        field: &'static str,
    },
    /// No generated code is left for this prefix.
    HumanCodesExhausted(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "sample not found: {id}"),
            Self::DuplicateId(id) => write!(f, "sample already exists: {id}"),
            Self::DuplicateHumanCode(code) => write!(f, "sample code already in use: {code}"),
            Self::ImmutableField { id, field } => {
                write!(f, "field `{field}` of sample {id} cannot be changed")
            }
            Self::HumanCodesExhausted(prefix) => {
                write!(f, "no sample codes left for prefix `{prefix}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SampleValidationError> for RepoError {
    fn from(value: SampleValidationError) -> Self {
        Self::Validation(value)
    }
}

/// How ancestry/descendant traversals treat nodes reachable by several paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Yield a node once per path reaching it (multiplicity = path count).
    #[default]
    PerPath,
    /// Yield every node once, at its first depth-first visit.
    Distinct,
}

/// Filter options for listing samples.
#[derive(Debug, Clone, Default)]
pub struct SampleListQuery {
    pub sample_type: Option<String>,
    pub container_id: Option<SampleId>,
    pub containers_only: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Repository interface for the Sample Store.
///
/// Reads return owned snapshots; writes go through `create_sample`,
/// `update_sample(s)` and `delete_sample`.
pub trait SampleRepository {
    /// Inserts a new sample and links it into existing parents' `child_ids`.
    fn create_sample(&mut self, sample: Sample) -> RepoResult<Sample>;
    fn get_sample(&self, id: SampleId) -> Option<Sample>;
    fn get_sample_by_code(&self, human_code: &str) -> Option<Sample>;
    fn contains(&self, id: SampleId) -> bool;
    /// All samples in insertion order.
    fn get_all(&self) -> Vec<Sample>;
    fn list_samples(&self, query: &SampleListQuery) -> Vec<Sample>;
    fn get_by_metadata(&self, key: &str, value: &MetadataValue) -> Vec<Sample>;
    fn get_ancestry(&self, id: SampleId, mode: TraversalMode) -> RepoResult<Vec<Sample>>;
    fn get_descendants(&self, id: SampleId, mode: TraversalMode) -> RepoResult<Vec<Sample>>;
    /// Replaces one stored record after validation.
    fn update_sample(&mut self, sample: &Sample) -> RepoResult<()>;
    /// Replaces several records; nothing is written unless all pass validation.
    fn update_samples(&mut self, samples: &[Sample]) -> RepoResult<()>;
    /// Removes a record without touching its neighbors.
    fn delete_sample(&mut self, id: SampleId) -> bool;
    fn count(&self) -> usize;
    /// Moves human-code numbering to start after `floor`.
    ///
    /// The counter only moves forward: a floor below the next number is a
    /// no-op, so codes are never handed out twice.
    fn reset_human_codes(&mut self, floor: u64);
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Ancestors,
    Descendants,
}

impl Direction {
    fn edges(self, sample: &Sample) -> &BTreeSet<SampleId> {
        match self {
            Self::Ancestors => &sample.parent_ids,
            Self::Descendants => &sample.child_ids,
        }
    }
}

/// Process-local sample store.
#[derive(Debug, Default)]
pub struct InMemorySampleRepository {
    samples: HashMap<SampleId, Sample>,
    order: Vec<SampleId>,
    codes: HashMap<String, SampleId>,
    counter: HumanCodeCounter,
}

impl InMemorySampleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose generated codes use `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            counter: HumanCodeCounter::new(prefix),
            ..Self::default()
        }
    }

    /// Rebuilds a store from previously persisted records.
    ///
    /// Records are inserted as-is (no parent propagation) and the counter is
    /// moved past the highest code found.
    pub fn restore(prefix: impl Into<String>, samples: Vec<Sample>) -> RepoResult<Self> {
        let mut repo = Self::with_prefix(prefix);
        for sample in samples {
            sample.validate()?;
            if repo.samples.contains_key(&sample.id) {
                return Err(RepoError::DuplicateId(sample.id));
            }
            if sample.human_code.is_empty() {
                return Err(RepoError::Validation(SampleValidationError::BlankField(
                    "human_code",
                )));
            }
            if repo.codes.contains_key(&sample.human_code) {
                return Err(RepoError::DuplicateHumanCode(sample.human_code));
            }
            if let Some(number) = repo.counter.number_of(&sample.human_code) {
                repo.counter.observe(number);
            }
            repo.insert_raw(sample);
        }
        Ok(repo)
    }

    /// Number the next generated code will carry.
    pub fn next_code_number(&self) -> u64 {
        self.counter.peek_number()
    }

    fn insert_raw(&mut self, sample: Sample) {
        self.order.push(sample.id);
        self.codes.insert(sample.human_code.clone(), sample.id);
        self.samples.insert(sample.id, sample);
    }

    fn allocate_code(&mut self) -> RepoResult<String> {
        loop {
            let code = self
                .counter
                .next_code()
                .ok_or_else(|| RepoError::HumanCodesExhausted(self.counter.prefix().to_string()))?;
            if !self.codes.contains_key(&code) {
                return Ok(code);
            }
        }
    }

    fn check_update(&self, sample: &Sample) -> RepoResult<()> {
        sample.validate()?;
        let stored = self
            .samples
            .get(&sample.id)
            .ok_or(RepoError::NotFound(sample.id))?;

        let immutable_field = if stored.human_code != sample.human_code {
            Some("human_code")
        } else if stored.created_by != sample.created_by {
            Some("created_by")
        } else if stored.created_at != sample.created_at {
            Some("created_at")
        } else if stored.is_container != sample.is_container {
            Some("is_container")
        } else {
            None
        };

        match immutable_field {
            Some(field) => Err(RepoError::ImmutableField {
                id: sample.id,
                field,
            }),
            None => Ok(()),
        }
    }

    fn iter_ordered(&self) -> impl Iterator<Item = &Sample> {
        self.order.iter().filter_map(|id| self.samples.get(id))
    }

    fn traverse(
        &self,
        start: SampleId,
        direction: Direction,
        mode: TraversalMode,
    ) -> RepoResult<Vec<Sample>> {
        let root = self.samples.get(&start).ok_or(RepoError::NotFound(start))?;
        let mut out = Vec::new();
        let mut on_path = HashSet::from([start]);
        let mut visited = HashSet::new();
        self.walk(root, direction, mode, &mut on_path, &mut visited, &mut out);
        Ok(out)
    }

    // Depth-first pre-order. A node already on the current path is skipped so
    // corrupted cyclic data terminates instead of recursing forever.
    fn walk(
        &self,
        sample: &Sample,
        direction: Direction,
        mode: TraversalMode,
        on_path: &mut HashSet<SampleId>,
        visited: &mut HashSet<SampleId>,
        out: &mut Vec<Sample>,
    ) {
        for next_id in direction.edges(sample) {
            if on_path.contains(next_id) {
                continue;
            }
            if mode == TraversalMode::Distinct && !visited.insert(*next_id) {
                continue;
            }
            let Some(next) = self.samples.get(next_id) else {
                continue;
            };
            out.push(next.clone());
            on_path.insert(*next_id);
            self.walk(next, direction, mode, on_path, visited, out);
            on_path.remove(next_id);
        }
    }
}

impl SampleRepository for InMemorySampleRepository {
    fn create_sample(&mut self, mut sample: Sample) -> RepoResult<Sample> {
        sample.validate()?;
        if self.samples.contains_key(&sample.id) {
            return Err(RepoError::DuplicateId(sample.id));
        }

        if sample.human_code.is_empty() {
            sample.human_code = self.allocate_code()?;
        } else {
            if self.codes.contains_key(&sample.human_code) {
                return Err(RepoError::DuplicateHumanCode(sample.human_code));
            }
            if let Some(number) = self.counter.number_of(&sample.human_code) {
                self.counter.observe(number);
            }
        }

        for parent_id in &sample.parent_ids {
            if let Some(parent) = self.samples.get_mut(parent_id) {
                parent.add_child(sample.id);
            }
        }

        self.insert_raw(sample.clone());
        Ok(sample)
    }

    fn get_sample(&self, id: SampleId) -> Option<Sample> {
        self.samples.get(&id).cloned()
    }

    fn get_sample_by_code(&self, human_code: &str) -> Option<Sample> {
        self.codes
            .get(human_code.trim())
            .and_then(|id| self.samples.get(id))
            .cloned()
    }

    fn contains(&self, id: SampleId) -> bool {
        self.samples.contains_key(&id)
    }

    fn get_all(&self) -> Vec<Sample> {
        self.iter_ordered().cloned().collect()
    }

    fn list_samples(&self, query: &SampleListQuery) -> Vec<Sample> {
        let matching = self.iter_ordered().filter(|sample| {
            query
                .sample_type
                .as_deref()
                .map_or(true, |kind| sample.sample_type == kind)
                && query
                    .container_id
                    .map_or(true, |container_id| sample.container_id == Some(container_id))
                && (!query.containers_only || sample.is_container)
        });

        matching
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn get_by_metadata(&self, key: &str, value: &MetadataValue) -> Vec<Sample> {
        self.iter_ordered()
            .filter(|sample| sample.metadata_matches(key, value))
            .cloned()
            .collect()
    }

    fn get_ancestry(&self, id: SampleId, mode: TraversalMode) -> RepoResult<Vec<Sample>> {
        self.traverse(id, Direction::Ancestors, mode)
    }

    fn get_descendants(&self, id: SampleId, mode: TraversalMode) -> RepoResult<Vec<Sample>> {
        self.traverse(id, Direction::Descendants, mode)
    }

    fn update_sample(&mut self, sample: &Sample) -> RepoResult<()> {
        self.update_samples(std::slice::from_ref(sample))
    }

    fn update_samples(&mut self, samples: &[Sample]) -> RepoResult<()> {
        for sample in samples {
            self.check_update(sample)?;
        }
        for sample in samples {
            self.samples.insert(sample.id, sample.clone());
        }
        Ok(())
    }

    fn delete_sample(&mut self, id: SampleId) -> bool {
        let Some(removed) = self.samples.remove(&id) else {
            return false;
        };
        self.order.retain(|existing| *existing != id);
        self.codes.remove(&removed.human_code);
        true
    }

    fn count(&self) -> usize {
        self.samples.len()
    }

    fn reset_human_codes(&mut self, floor: u64) {
        self.counter.observe(floor);
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemorySampleRepository, RepoError, SampleRepository, TraversalMode};
    use crate::model::sample::Sample;
    use uuid::Uuid;

    fn sample(id: u128, name: &str) -> Sample {
        Sample::with_id(Uuid::from_u128(id), name, "Blood", "tester")
    }

    #[test]
    fn create_assigns_sequential_codes() {
        let mut repo = InMemorySampleRepository::new();
        let first = repo.create_sample(sample(1, "a")).unwrap();
        let second = repo.create_sample(sample(2, "b")).unwrap();

        assert_eq!(first.human_code, "s1");
        assert_eq!(second.human_code, "s2");
        assert_eq!(repo.get_sample_by_code("s2").unwrap().id, second.id);
    }

    #[test]
    fn explicit_code_advances_counter_and_rejects_duplicates() {
        let mut repo = InMemorySampleRepository::new();
        let mut imported = sample(1, "imported");
        imported.human_code = "s10".to_string();
        repo.create_sample(imported).unwrap();

        let next = repo.create_sample(sample(2, "next")).unwrap();
        assert_eq!(next.human_code, "s11");

        let mut clash = sample(3, "clash");
        clash.human_code = "s10".to_string();
        let err = repo.create_sample(clash).unwrap_err();
        assert_eq!(err, RepoError::DuplicateHumanCode("s10".to_string()));
        assert_eq!(repo.count(), 2);
    }

    #[test]
    fn reset_only_moves_counter_forward() {
        let mut repo = InMemorySampleRepository::new();
        repo.create_sample(sample(1, "a")).unwrap();
        repo.create_sample(sample(2, "b")).unwrap();

        repo.reset_human_codes(0);
        assert_eq!(repo.next_code_number(), 3);

        repo.reset_human_codes(100);
        assert_eq!(repo.next_code_number(), 101);

        repo.reset_human_codes(5);
        assert_eq!(repo.next_code_number(), 101);
    }

    #[test]
    fn exhausted_counter_rejects_create_without_insert() {
        let mut repo = InMemorySampleRepository::new();
        let parent = repo.create_sample(sample(1, "parent")).unwrap();
        repo.reset_human_codes(u64::MAX);

        let mut child = sample(2, "child");
        child.parent_ids.insert(parent.id);
        let err = repo.create_sample(child).unwrap_err();

        assert_eq!(err, RepoError::HumanCodesExhausted("s".to_string()));
        assert_eq!(repo.count(), 1);
        assert!(repo.get_sample(parent.id).unwrap().child_ids.is_empty());
        assert_eq!(repo.next_code_number(), u64::MAX);
    }

    #[test]
    fn delete_frees_lookup_entries() {
        let mut repo = InMemorySampleRepository::new();
        let created = repo.create_sample(sample(1, "a")).unwrap();

        assert!(repo.delete_sample(created.id));
        assert!(!repo.delete_sample(created.id));
        assert!(repo.get_sample_by_code("s1").is_none());
        assert!(repo.get_all().is_empty());
    }

    #[test]
    fn update_batch_is_all_or_nothing() {
        let mut repo = InMemorySampleRepository::new();
        let mut a = repo.create_sample(sample(1, "a")).unwrap();
        let mut b = repo.create_sample(sample(2, "b")).unwrap();

        a.name = "renamed".to_string();
        b.is_container = true;
        let err = repo.update_samples(&[a.clone(), b]).unwrap_err();

        assert_eq!(
            err,
            RepoError::ImmutableField {
                id: Uuid::from_u128(2),
                field: "is_container"
            }
        );
        assert_eq!(repo.get_sample(a.id).unwrap().name, "a");
    }

    #[test]
    fn traversal_skips_cyclic_edges() {
        let mut repo = InMemorySampleRepository::new();
        let a = repo.create_sample(sample(1, "a")).unwrap();
        let mut b = sample(2, "b");
        b.parent_ids.insert(a.id);
        let b = repo.create_sample(b).unwrap();

        // Corrupt the store on purpose: a now also derives from b.
        let mut a = repo.get_sample(a.id).unwrap();
        a.parent_ids.insert(b.id);
        repo.update_sample(&a).unwrap();

        let ancestors = repo.get_ancestry(b.id, TraversalMode::PerPath).unwrap();
        let names: Vec<_> = ancestors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
