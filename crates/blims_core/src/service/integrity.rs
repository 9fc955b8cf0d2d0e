//! Store-wide consistency check for lineage and containment links.
//!
//! # Responsibility
//! - Report every broken bidirectional link instead of stopping at the first.
//! - Detect containment loops that per-entity validation cannot see.

use crate::model::sample::{Sample, SampleId};
use crate::repo::sample_repo::SampleRepository;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// One broken cross-sample invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    MissingContainer {
        sample_id: SampleId,
        container_id: SampleId,
    },
    ContainerNotFlagged {
        container_id: SampleId,
    },
    ContainerDoesNotList {
        sample_id: SampleId,
        container_id: SampleId,
    },
    ContainedWithoutBackLink {
        container_id: SampleId,
        sample_id: SampleId,
    },
    MissingContained {
        container_id: SampleId,
        sample_id: SampleId,
    },
    MissingParent {
        sample_id: SampleId,
        parent_id: SampleId,
    },
    ParentDoesNotListChild {
        sample_id: SampleId,
        parent_id: SampleId,
    },
    MissingChild {
        sample_id: SampleId,
        child_id: SampleId,
    },
    ChildDoesNotListParent {
        sample_id: SampleId,
        child_id: SampleId,
    },
    ContainmentCycle {
        sample_id: SampleId,
    },
}

impl Display for IntegrityViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContainer {
                sample_id,
                container_id,
            } => write!(f, "{sample_id} points at missing container {container_id}"),
            Self::ContainerNotFlagged { container_id } => {
                write!(f, "{container_id} holds samples but is not a container")
            }
            Self::ContainerDoesNotList {
                sample_id,
                container_id,
            } => write!(f, "container {container_id} does not list {sample_id}"),
            Self::ContainedWithoutBackLink {
                container_id,
                sample_id,
            } => write!(
                f,
                "{sample_id} is listed by {container_id} but its container_id differs"
            ),
            Self::MissingContained {
                container_id,
                sample_id,
            } => write!(f, "container {container_id} lists missing sample {sample_id}"),
            Self::MissingParent {
                sample_id,
                parent_id,
            } => write!(f, "{sample_id} lists missing parent {parent_id}"),
            Self::ParentDoesNotListChild {
                sample_id,
                parent_id,
            } => write!(f, "parent {parent_id} does not list child {sample_id}"),
            Self::MissingChild {
                sample_id,
                child_id,
            } => write!(f, "{sample_id} lists missing child {child_id}"),
            Self::ChildDoesNotListParent {
                sample_id,
                child_id,
            } => write!(f, "child {child_id} does not list parent {sample_id}"),
            Self::ContainmentCycle { sample_id } => {
                write!(f, "{sample_id} is nested inside itself")
            }
        }
    }
}

/// Checks every sample in `repo` and returns all violations found.
///
/// An empty result means lineage links are transposes, containment links
/// are bidirectional and no containment loop exists.
pub fn check_integrity<R: SampleRepository>(repo: &R) -> Vec<IntegrityViolation> {
    let samples: HashMap<SampleId, Sample> = repo
        .get_all()
        .into_iter()
        .map(|sample| (sample.id, sample))
        .collect();
    let mut ordered: Vec<&Sample> = samples.values().collect();
    ordered.sort_by_key(|sample| sample.id);

    let mut violations = Vec::new();
    for sample in &ordered {
        check_containment(sample, &samples, &mut violations);
        check_lineage(sample, &samples, &mut violations);
    }
    check_containment_cycles(&ordered, &samples, &mut violations);
    violations
}

fn check_containment(
    sample: &Sample,
    samples: &HashMap<SampleId, Sample>,
    violations: &mut Vec<IntegrityViolation>,
) {
    if let Some(container_id) = sample.container_id {
        match samples.get(&container_id) {
            None => violations.push(IntegrityViolation::MissingContainer {
                sample_id: sample.id,
                container_id,
            }),
            Some(container) if !container.contained_sample_ids.contains(&sample.id) => {
                violations.push(IntegrityViolation::ContainerDoesNotList {
                    sample_id: sample.id,
                    container_id,
                });
            }
            Some(_) => {}
        }
    }

    if !sample.is_container && !sample.contained_sample_ids.is_empty() {
        violations.push(IntegrityViolation::ContainerNotFlagged {
            container_id: sample.id,
        });
    }
    for contained_id in &sample.contained_sample_ids {
        match samples.get(contained_id) {
            None => violations.push(IntegrityViolation::MissingContained {
                container_id: sample.id,
                sample_id: *contained_id,
            }),
            Some(contained) if contained.container_id != Some(sample.id) => {
                violations.push(IntegrityViolation::ContainedWithoutBackLink {
                    container_id: sample.id,
                    sample_id: *contained_id,
                });
            }
            Some(_) => {}
        }
    }
}

fn check_lineage(
    sample: &Sample,
    samples: &HashMap<SampleId, Sample>,
    violations: &mut Vec<IntegrityViolation>,
) {
    for parent_id in &sample.parent_ids {
        match samples.get(parent_id) {
            None => violations.push(IntegrityViolation::MissingParent {
                sample_id: sample.id,
                parent_id: *parent_id,
            }),
            Some(parent) if !parent.child_ids.contains(&sample.id) => {
                violations.push(IntegrityViolation::ParentDoesNotListChild {
                    sample_id: sample.id,
                    parent_id: *parent_id,
                });
            }
            Some(_) => {}
        }
    }
    for child_id in &sample.child_ids {
        match samples.get(child_id) {
            None => violations.push(IntegrityViolation::MissingChild {
                sample_id: sample.id,
                child_id: *child_id,
            }),
            Some(child) if !child.parent_ids.contains(&sample.id) => {
                violations.push(IntegrityViolation::ChildDoesNotListParent {
                    sample_id: sample.id,
                    child_id: *child_id,
                });
            }
            Some(_) => {}
        }
    }
}

// Each sample has at most one container, so following `container_id` from a
// sample either ends or loops. A loop is reported once per sample on it.
fn check_containment_cycles(
    ordered: &[&Sample],
    samples: &HashMap<SampleId, Sample>,
    violations: &mut Vec<IntegrityViolation>,
) {
    let mut cleared: HashSet<SampleId> = HashSet::new();
    let mut reported: HashSet<SampleId> = HashSet::new();

    for sample in ordered {
        let mut path: Vec<SampleId> = Vec::new();
        let mut on_path: HashSet<SampleId> = HashSet::new();
        let mut cursor = Some(sample.id);

        while let Some(current) = cursor {
            if cleared.contains(&current) {
                break;
            }
            if !on_path.insert(current) {
                let start = path
                    .iter()
                    .position(|id| *id == current)
                    .unwrap_or_default();
                for looped in &path[start..] {
                    if reported.insert(*looped) {
                        violations.push(IntegrityViolation::ContainmentCycle {
                            sample_id: *looped,
                        });
                    }
                }
                break;
            }
            path.push(current);
            cursor = samples.get(&current).and_then(|s| s.container_id);
        }
        cleared.extend(path);
    }
}
