use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::AlignmentReplayError;
use crate::core::process_models::case_centric::petri_net::{
    Marking, PetriNet, Semantics, TransitionID,
};

/// Placeholder for the missing side of a log or model move
pub const SKIP: &str = ">>";

/// Kind of an alignment [`Move`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum MoveKind {
    /// Event and visible transition agree
    Sync,
    /// Event without model counterpart
    Log,
    /// Visible transition fired without a matching event
    Model,
    /// Invisible transition fired
    Silent,
}

///
/// A single move of an alignment
///
/// Event indices always refer to positions in the aligned trace, also when the move was computed
/// on a projection of it.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Move {
    /// Kind of move
    pub kind: MoveKind,
    /// Position of the event in the trace (sync and log moves)
    pub event: Option<usize>,
    /// Fired model transition (sync, model and silent moves)
    pub transition: Option<TransitionID>,
    /// Name of the log-side transition ([`SKIP`] for model moves)
    pub log_name: String,
    /// Name of the model-side transition ([`SKIP`] for log moves)
    pub model_name: String,
    /// Activity of the event ([`SKIP`] for model moves)
    pub log_label: String,
    /// Label of the model transition ([`SKIP`] for log moves, `None` for silent moves)
    pub model_label: Option<String>,
    /// Cost of this move
    pub cost: u64,
}

/// Identity of a move used when stitching partial alignments together
pub(crate) type MoveKey = (MoveKind, Option<usize>, Option<TransitionID>);

impl Move {
    /// Whether the model does not move
    pub fn is_log_move(&self) -> bool {
        self.kind == MoveKind::Log
    }

    /// Whether the log does not move (visible or silent)
    pub fn is_model_move(&self) -> bool {
        matches!(self.kind, MoveKind::Model | MoveKind::Silent)
    }

    /// Whether log and model move together
    pub fn is_sync_move(&self) -> bool {
        self.kind == MoveKind::Sync
    }

    pub(crate) fn key(&self) -> MoveKey {
        (self.kind, self.event, self.transition)
    }

    /// Render as an [`AlignmentStep`]
    pub fn to_step(&self, as_transition_description: bool) -> AlignmentStep {
        if as_transition_description {
            AlignmentStep::Described(
                (self.log_name.clone(), self.model_name.clone()),
                (self.log_label.clone(), self.model_label.clone()),
            )
        } else {
            AlignmentStep::Labels(self.log_label.clone(), self.model_label.clone())
        }
    }
}

///
/// A move as returned to callers
///
/// Serializes as `["a", "a"]` (labels) or `[["t_a_0", "a"], ["a", "a"]]` (names and labels).
/// Invisible model transitions have a `null` model label.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AlignmentStep {
    /// `(log label, model label)`
    Labels(String, Option<String>),
    /// `((log name, model name), (log label, model label))`
    Described((String, String), (String, Option<String>)),
}

impl AlignmentStep {
    /// `(log label, model label)` regardless of representation
    pub fn labels(&self) -> (&str, Option<&str>) {
        match self {
            AlignmentStep::Labels(l, m) => (l.as_str(), m.as_deref()),
            AlignmentStep::Described(_, (l, m)) => (l.as_str(), m.as_deref()),
        }
    }
}

///
/// Alignment of one trace
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlignmentResult {
    /// Moves in the representation chosen by `ret_tuple_as_trans_desc`
    pub alignment: Vec<AlignmentStep>,
    /// Typed moves (same order as `alignment`)
    pub moves: Vec<Move>,
    /// Total cost of all moves
    pub cost: u64,
    /// Number of states expanded
    pub visited_states: usize,
    /// Number of states pushed to the open set
    pub queued_states: usize,
    /// Number of arcs of the synchronous product explored
    pub traversed_arcs: usize,
    /// Number of linear programs solved for the heuristic
    pub lp_solved: usize,
    /// Fitness in `[0, 1]`, ignoring the cost of silent moves
    pub fitness: f64,
    /// Best-worst cost used to normalize the fitness
    pub bwc: u64,
}

impl AlignmentResult {
    /// Cost of all moves except silent ones
    pub fn deviation_cost(&self) -> u64 {
        self.moves
            .iter()
            .filter(|m| m.kind != MoveKind::Silent)
            .map(|m| m.cost)
            .sum()
    }

    /// Whether the alignment contains only synchronous and silent moves
    pub fn is_fit(&self) -> bool {
        self.moves
            .iter()
            .all(|m| matches!(m.kind, MoveKind::Sync | MoveKind::Silent))
    }
}

/// `1 - cost / bwc`, or 0 if `bwc` is 0
pub fn alignment_fitness(cost: u64, bwc: u64) -> f64 {
    if bwc == 0 {
        0.0
    } else {
        1.0 - cost as f64 / bwc as f64
    }
}

///
/// Replay an alignment on a net
///
/// Checks that the model side fires from `initial_marking` to `final_marking` and that the log
/// side reproduces `trace`.
///
pub fn replay_alignment<S: AsRef<str>>(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    trace: &[S],
    moves: &[Move],
) -> Result<(), AlignmentReplayError> {
    let semantics = Semantics::for_net(net);
    let mut marking = initial_marking.clone();
    let mut log_side: Vec<&str> = Vec::new();
    for (i, mv) in moves.iter().enumerate() {
        if matches!(mv.kind, MoveKind::Sync | MoveKind::Log) {
            log_side.push(mv.log_label.as_str());
        }
        if mv.kind == MoveKind::Log {
            continue;
        }
        let t = mv
            .transition
            .filter(|t| net.transition(*t).is_some())
            .ok_or(AlignmentReplayError::UnknownTransition(i))?;
        marking = semantics
            .execute(net, t, &marking)
            .ok_or(AlignmentReplayError::MoveNotEnabled(i))?;
    }
    if log_side.len() != trace.len()
        || log_side
            .iter()
            .zip(trace.iter())
            .any(|(a, b)| *a != b.as_ref())
    {
        return Err(AlignmentReplayError::LogMismatch);
    }
    if &marking != final_marking {
        return Err(AlignmentReplayError::FinalMarkingNotReached);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_move(act: &str, event: usize) -> Move {
        Move {
            kind: MoveKind::Log,
            event: Some(event),
            transition: None,
            log_name: format!("t_{}_{}", act, event),
            model_name: SKIP.into(),
            log_label: act.into(),
            model_label: Some(SKIP.into()),
            cost: 10000,
        }
    }

    #[test]
    fn steps_serialize_as_tuples() {
        let mv = log_move("x", 1);
        assert_eq!(
            serde_json::to_string(&mv.to_step(false)).unwrap(),
            r#"["x",">>"]"#
        );
        assert_eq!(
            serde_json::to_string(&mv.to_step(true)).unwrap(),
            r#"[["t_x_1",">>"],["x",">>"]]"#
        );
        let back: AlignmentStep = serde_json::from_str(r#"[">>",null]"#).unwrap();
        assert_eq!(back.labels(), (">>", None));
    }

    #[test]
    fn fitness_with_zero_denominator() {
        assert_eq!(alignment_fitness(0, 0), 0.0);
        assert_eq!(alignment_fitness(10000, 40000), 0.75);
    }

    #[test]
    fn replay_detects_log_mismatch() {
        let net = PetriNet::new();
        let empty = Marking::new();
        let moves = vec![log_move("x", 0)];
        assert_eq!(replay_alignment(&net, &empty, &empty, &["x"], &moves), Ok(()));
        assert_eq!(
            replay_alignment(&net, &empty, &empty, &["y"], &moves),
            Err(AlignmentReplayError::LogMismatch)
        );
    }
}
