//! Identifier suppliers for new samples.

use crate::model::sample::SampleId;
use uuid::Uuid;

/// Source of globally unique sample identifiers.
pub trait SampleIdSupplier {
    fn next_id(&mut self) -> SampleId;
}

/// Random UUID v4 supplier used by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampleIds;

impl SampleIdSupplier for RandomSampleIds {
    fn next_id(&mut self) -> SampleId {
        Uuid::new_v4()
    }
}

/// Deterministic supplier yielding `Uuid::from_u128(start)`, `start + 1`, ...
///
/// Intended for demos and tests where stable ids make output reproducible.
#[derive(Debug, Clone, Copy)]
pub struct SequentialSampleIds {
    next: u128,
}

impl SequentialSampleIds {
    /// `start` must be non-zero; the nil UUID is never a valid sample id.
    pub fn starting_at(start: u128) -> Self {
        Self {
            next: start.max(1),
        }
    }
}

impl SampleIdSupplier for SequentialSampleIds {
    fn next_id(&mut self) -> SampleId {
        let id = Uuid::from_u128(self.next);
        self.next += 1;
        id
    }
}
