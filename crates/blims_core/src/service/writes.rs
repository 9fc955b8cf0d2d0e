//! Staging area for multi-sample writes.
//!
//! Engine operations load every sample they touch into one `PendingWrites`,
//! edit the staged copies, and commit them through
//! `SampleRepository::update_samples` in a single batch.

use crate::model::sample::{Sample, SampleId};
use crate::repo::sample_repo::{RepoResult, SampleRepository};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    staged: BTreeMap<SampleId, Sample>,
}

impl PendingWrites {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the staged copy of `id`, loading it from `repo` on first use.
    ///
    /// `None` when the sample does not exist in the store.
    pub(crate) fn load<R: SampleRepository>(
        &mut self,
        repo: &R,
        id: SampleId,
    ) -> Option<&mut Sample> {
        if !self.staged.contains_key(&id) {
            let sample = repo.get_sample(id)?;
            self.staged.insert(id, sample);
        }
        self.staged.get_mut(&id)
    }

    pub(crate) fn get(&self, id: SampleId) -> Option<&Sample> {
        self.staged.get(&id)
    }

    pub(crate) fn commit<R: SampleRepository>(self, repo: &mut R) -> RepoResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let samples: Vec<Sample> = self.staged.into_values().collect();
        repo.update_samples(&samples)
    }
}
