//! Container membership operations of `SampleService`.
//!
//! # Invariants
//! - A sample is listed by at most one container, and its `container_id`
//!   always names that container.
//! - Only samples flagged `is_container` hold other samples.
//! - A sample never ends up inside itself, directly or through nesting.
//! - Hierarchy walks are bounded by the configured maximum depth, and
//!   writes never build a nesting deeper than that bound.

use crate::model::sample::{Sample, SampleId};
use crate::repo::sample_repo::SampleRepository;
use crate::service::sample_service::{SampleService, SampleServiceError, ServiceResult};
use crate::service::writes::PendingWrites;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One node of a container hierarchy tree.
///
/// Leaves (non-container samples) carry `children: None`, which is omitted
/// from the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerNode {
    pub id: SampleId,
    pub name: String,
    #[serde(rename = "type")]
    pub sample_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ContainerNode>>,
}

impl ContainerNode {
    fn leaf(sample: &Sample) -> Self {
        Self {
            id: sample.id,
            name: sample.name.clone(),
            sample_type: sample.sample_type.clone(),
            children: None,
        }
    }

    /// Total number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children.as_deref().map_or(0, |children| {
            children
                .iter()
                .map(|child| 1 + child.descendant_count())
                .sum()
        })
    }
}

impl<R: SampleRepository> SampleService<R> {
    /// Places `sample_id` inside `container_id` and returns the container.
    ///
    /// # Contract
    /// - `NotFound` for either id, `NotAContainer` when the target is a plain
    ///   sample, `ContainmentCycle` when the target is the sample itself or
    ///   nested inside it.
    /// - `HierarchyTooDeep` when the target's nesting plus the container
    ///   levels held by the sample would exceed the configured depth.
    /// - A sample held by another container is moved out of it silently.
    /// - Adding a sample to the container already holding it is a no-op.
    pub fn add_to_container(
        &mut self,
        sample_id: SampleId,
        container_id: SampleId,
    ) -> ServiceResult<Sample> {
        let sample = self.require(sample_id)?;
        let container = self.require(container_id)?;
        if !container.is_container {
            return Err(SampleServiceError::NotAContainer(container_id));
        }
        if self.is_nested_within(container_id, sample_id)? {
            return Err(SampleServiceError::ContainmentCycle {
                sample_id,
                container_id,
            });
        }
        if sample.container_id == Some(container_id)
            && container.contained_sample_ids.contains(&sample_id)
        {
            return Ok(container);
        }
        let nested_depth = self.depth_from_top(container_id) + self.nested_height(&sample);
        if nested_depth > self.max_depth {
            return Err(SampleServiceError::HierarchyTooDeep {
                container_id,
                max_depth: self.max_depth,
            });
        }

        let mut writes = PendingWrites::new();
        if let Some(previous_id) = sample.container_id.filter(|id| *id != container_id) {
            if let Some(previous) = writes.load(&self.repo, previous_id) {
                previous.remove_contained_sample(sample_id);
            }
            debug!(
                "event=container_switch module=service status=ok sample_id={} from={} to={}",
                sample_id, previous_id, container_id
            );
        }
        if let Some(staged) = writes.load(&self.repo, sample_id) {
            staged.set_container(Some(container_id));
        }
        if let Some(staged) = writes.load(&self.repo, container_id) {
            staged.add_contained_sample(sample_id);
        }
        let updated = writes.get(container_id).cloned().unwrap_or(container);
        writes.commit(&mut self.repo)?;

        info!(
            "event=container_add module=service status=ok sample_id={} container_id={}",
            sample_id, container_id
        );
        Ok(updated)
    }

    /// Takes `sample_id` out of its container and returns the former container.
    ///
    /// Returns `Ok(None)` when the sample was not contained. A dangling
    /// `container_id` pointing at a missing sample is cleared and also
    /// yields `Ok(None)`.
    pub fn remove_from_container(&mut self, sample_id: SampleId) -> ServiceResult<Option<Sample>> {
        let sample = self.require(sample_id)?;
        let Some(container_id) = sample.container_id else {
            return Ok(None);
        };

        let mut writes = PendingWrites::new();
        if let Some(staged) = writes.load(&self.repo, sample_id) {
            staged.set_container(None);
        }
        let container = writes.load(&self.repo, container_id).map(|container| {
            container.remove_contained_sample(sample_id);
            container.clone()
        });
        writes.commit(&mut self.repo)?;

        info!(
            "event=container_remove module=service status=ok sample_id={} container_id={} container_found={}",
            sample_id,
            container_id,
            container.is_some()
        );
        Ok(container)
    }

    /// Resolves every sample listed by `container_id`.
    ///
    /// Ids that no longer resolve are skipped.
    pub fn get_contained_samples(&self, container_id: SampleId) -> ServiceResult<Vec<Sample>> {
        let container = self.require(container_id)?;
        Ok(container
            .contained_sample_ids
            .iter()
            .filter_map(|id| self.repo.get_sample(*id))
            .collect())
    }

    /// Builds the nested tree of everything held by `container_id`.
    pub fn get_container_hierarchy(&self, container_id: SampleId) -> ServiceResult<ContainerNode> {
        let container = self.require(container_id)?;
        if !container.is_container {
            return Err(SampleServiceError::NotAContainer(container_id));
        }
        let mut on_path = HashSet::from([container_id]);
        self.build_hierarchy(&container, 1, &mut on_path)
    }

    fn build_hierarchy(
        &self,
        container: &Sample,
        depth: usize,
        on_path: &mut HashSet<SampleId>,
    ) -> ServiceResult<ContainerNode> {
        if depth > self.max_depth {
            return Err(SampleServiceError::HierarchyTooDeep {
                container_id: container.id,
                max_depth: self.max_depth,
            });
        }

        let mut children = Vec::with_capacity(container.contained_sample_ids.len());
        for child_id in &container.contained_sample_ids {
            let Some(child) = self.repo.get_sample(*child_id) else {
                continue;
            };
            if !child.is_container {
                children.push(ContainerNode::leaf(&child));
                continue;
            }
            if !on_path.insert(child.id) {
                return Err(SampleServiceError::ContainmentCycle {
                    sample_id: child.id,
                    container_id: container.id,
                });
            }
            children.push(self.build_hierarchy(&child, depth + 1, on_path)?);
            on_path.remove(&child.id);
        }

        let mut node = ContainerNode::leaf(container);
        node.children = Some(children);
        Ok(node)
    }

    /// Container levels `sample` brings along: 0 for a plain sample, 1 for an
    /// empty container, 1 + the tallest nested container otherwise.
    ///
    /// Stops descending once the bound is exceeded.
    pub(crate) fn nested_height(&self, sample: &Sample) -> usize {
        let mut on_path = HashSet::from([sample.id]);
        self.height_below(sample, &mut on_path)
    }

    fn height_below(&self, sample: &Sample, on_path: &mut HashSet<SampleId>) -> usize {
        if !sample.is_container {
            return 0;
        }
        if on_path.len() > self.max_depth {
            return 1;
        }
        let mut tallest = 0;
        for child_id in &sample.contained_sample_ids {
            let Some(child) = self.repo.get_sample(*child_id) else {
                continue;
            };
            if !on_path.insert(child.id) {
                continue;
            }
            tallest = tallest.max(self.height_below(&child, on_path));
            on_path.remove(&child.id);
        }
        1 + tallest
    }

    // Containers from the outermost one down to `container_id`, inclusive.
    fn depth_from_top(&self, container_id: SampleId) -> usize {
        let mut visited = HashSet::new();
        let mut cursor = self.repo.get_sample(container_id);
        while let Some(current) = cursor {
            if visited.len() > self.max_depth || !visited.insert(current.id) {
                break;
            }
            cursor = current
                .container_id
                .and_then(|parent_id| self.repo.get_sample(parent_id));
        }
        visited.len()
    }

    // True when `candidate` is `ancestor` itself or sits somewhere inside it,
    // following `container_id` links upward from `candidate`.
    fn is_nested_within(&self, candidate: SampleId, ancestor: SampleId) -> ServiceResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate);
        while let Some(current) = cursor {
            if current == ancestor {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Ok(true);
            }
            if visited.len() > self.max_depth {
                return Err(SampleServiceError::HierarchyTooDeep {
                    container_id: candidate,
                    max_depth: self.max_depth,
                });
            }
            cursor = self
                .repo
                .get_sample(current)
                .and_then(|sample| sample.container_id);
        }
        Ok(false)
    }
}
