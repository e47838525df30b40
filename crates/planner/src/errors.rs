use thiserror::Error;

use focusguard_core_types::AxError;

/// Errors emitted by the planning engine.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No candidate action scored above the viability threshold.
    #[error("no viable action: best score {best_score:.2} below threshold")]
    NoViableAction { best_score: f64 },

    /// Decision was requested with an empty option set.
    #[error("no action options supplied")]
    NoOptions,

    /// The task produced no sub-tasks under the current constraints.
    #[error("decomposition produced no sub-tasks: {0}")]
    EmptyDecomposition(String),
}

impl From<PlanError> for AxError {
    fn from(err: PlanError) -> Self {
        AxError::planning(err.to_string())
    }
}
