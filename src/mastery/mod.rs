//! Adaptive mastery tracking.
//!
//! - [`updater`] folds outcome events into rolling per-subject statistics
//! - [`evaluator`] turns statistics into a mastery score and classification
//! - [`scheduler`] orders practice items, favouring unmastered ones
//! - [`engine`] ties them to a store with per-key serialized updates

pub mod config;
pub mod engine;
pub mod evaluator;
pub mod locks;
pub mod scheduler;
pub mod types;
pub mod updater;

use thiserror::Error;

use crate::db::StoreError;

pub use config::{MasteryConfig, MasteryThresholds};
pub use engine::MasteryEngine;
pub use evaluator::{classify, score, MasteryFilter};
pub use scheduler::{AdaptiveScheduler, Schedulable};
pub use types::{
    BatchReceipt, MasteryState, OutcomeBatch, OutcomeEvent, SamplingSummary, StatKey, StatRecord,
    SubjectKind,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    /// Event `index` failed; the `applied` events before it stay applied.
    #[error("event {index} failed after {applied} applied: {source}")]
    Batch {
        index: usize,
        applied: usize,
        source: Box<EngineError>,
    },
    #[error("sampling not recorded after {applied} events applied: {source}")]
    Sampling { applied: usize, source: StoreError },
}

impl EngineError {
    pub(crate) fn at_event(index: usize, applied: usize, source: EngineError) -> Self {
        EngineError::Batch {
            index,
            applied,
            source: Box::new(source),
        }
    }

    /// The underlying failure with any batch context stripped.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Batch { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), EngineError::Validation(_))
    }
}
