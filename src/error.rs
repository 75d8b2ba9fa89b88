//! Run-level error taxonomy
//!
//! Every way a conversation turn can fail maps onto one [`FlowError`]
//! variant. Stage failures carry the step trace completed before the abort,
//! so callers can see exactly how far a run got. None of these leave a
//! partial checkpoint behind; a failed run is invisible to the next one.

use std::time::Duration;

use thiserror::Error;

use crate::checkpoint::{CheckpointError, InvalidThreadIdError};
use crate::collab::CollaboratorError;
use crate::graph::Stage;
use crate::state::MergeError;

/// Errors surfaced by a conversation turn
#[derive(Debug, Error)]
pub enum FlowError {
    /// The caller supplied an empty or blank thread id
    #[error(transparent)]
    InvalidThreadId(#[from] InvalidThreadIdError),

    /// A stage produced a partial update the merge function rejected
    #[error("state merge failed after {step}: {source}")]
    StateMerge {
        /// Node id (or `request_overlay`) whose update failed to merge
        step: &'static str,
        #[source]
        source: MergeError,
    },

    /// Document retrieval failed and the run was aborted
    #[error("retrieval failed after steps {steps:?}: {source}")]
    RetrievalFailure {
        /// Steps completed before the abort
        steps: Vec<String>,
        #[source]
        source: CollaboratorError,
    },

    /// Document grading failed and the run was aborted
    #[error("grading failed after steps {steps:?}: {source}")]
    GradingFailure {
        steps: Vec<String>,
        #[source]
        source: CollaboratorError,
    },

    /// The web-search fallback failed and the run was aborted
    #[error("web search failed after steps {steps:?}: {source}")]
    SearchFailure {
        steps: Vec<String>,
        #[source]
        source: CollaboratorError,
    },

    /// Answer generation failed and the run was aborted
    #[error("generation failed after steps {steps:?}: {source}")]
    GenerationFailure {
        steps: Vec<String>,
        #[source]
        source: CollaboratorError,
    },

    /// The router produced a decision with no mapped stage. Unreachable
    /// with the built-in route targets; a topology change that adds a
    /// target must extend the stage mapping to stay total.
    #[error("router decision {decision:?} has no mapped stage")]
    RouterContractViolation {
        /// The unmappable decision, for the log line
        decision: String,
    },

    /// The run exceeded its deadline; no checkpoint was written
    #[error("run timed out after {timeout:?}")]
    RunTimeout {
        /// The deadline that expired
        timeout: Duration,
    },

    /// The checkpoint store failed
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl FlowError {
    /// Wrap a collaborator failure in the variant matching the stage that
    /// raised it, together with the steps completed before the abort
    pub(crate) fn stage_failure(
        stage: Stage,
        steps: Vec<String>,
        source: CollaboratorError,
    ) -> Self {
        match stage {
            Stage::Retrieve => Self::RetrievalFailure { steps, source },
            Stage::GradeDocuments => Self::GradingFailure { steps, source },
            Stage::WebSearch => Self::SearchFailure { steps, source },
            Stage::Chat => Self::GenerationFailure { steps, source },
        }
    }

    /// The stage a failure variant points at, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::RetrievalFailure { .. } => Some(Stage::Retrieve),
            Self::GradingFailure { .. } => Some(Stage::GradeDocuments),
            Self::SearchFailure { .. } => Some(Stage::WebSearch),
            Self::GenerationFailure { .. } => Some(Stage::Chat),
            _ => None,
        }
    }

    /// Steps the failed run completed before aborting, if the variant
    /// carries them
    pub fn completed_steps(&self) -> Option<&[String]> {
        match self {
            Self::RetrievalFailure { steps, .. }
            | Self::GradingFailure { steps, .. }
            | Self::SearchFailure { steps, .. }
            | Self::GenerationFailure { steps, .. } => Some(steps),
            _ => None,
        }
    }
}
