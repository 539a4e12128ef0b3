use crate::core::process_models::case_centric::petri_net::PetriNetError;

///
/// Errors that can occur when computing alignments
///
/// Only [`AlignmentError::InvalidInput`] aborts a log-level alignment; the other variants are
/// reported as `None` for the affected trace.
///
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    /// Net or markings are malformed, or the final marking cannot be reached from the initial marking
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Time budget of the trace expired
    #[error("alignment exceeded its time budget")]
    Timeout,
    /// Search space was exhausted without reaching the final marking
    #[error("final marking is not reachable in the synchronous product")]
    FinalMarkingUnreachable,
    /// Border-agreement repair merged more sub-nets than allowed
    #[error("border agreement repair exceeded {0} merged sub-nets")]
    DecompositionThresholdExceeded(u64),
    /// Shard alignments could not be combined into an alignment of the whole net
    #[error("shard alignments cannot be recomposed: {0}")]
    Recomposition(String),
}

impl From<PetriNetError> for AlignmentError {
    fn from(value: PetriNetError) -> Self {
        AlignmentError::InvalidInput(value.to_string())
    }
}

///
/// Reasons why an alignment does not replay on a net
///
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentReplayError {
    /// Model side of the move at this position is not enabled
    #[error("model side of move {0} is not enabled")]
    MoveNotEnabled(usize),
    /// Move references a transition that is not part of the net
    #[error("move {0} references a transition outside the net")]
    UnknownTransition(usize),
    /// Replaying all moves does not end in the final marking
    #[error("alignment does not reach the final marking")]
    FinalMarkingNotReached,
    /// Log side of the alignment differs from the trace
    #[error("log side of the alignment differs from the trace")]
    LogMismatch,
}
