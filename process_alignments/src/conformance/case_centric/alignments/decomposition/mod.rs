//! Decompose/Recompose Alignments
//!
//! The net is split into sub-nets sharing only uniquely labeled visible transitions. Every
//! sub-net is aligned with the projection of the trace onto its labels. Sub-nets that disagree on
//! a shared label are merged and re-aligned until all borders agree, then the partial alignments
//! are stitched together. Stitched alignments always replay on the original net.
pub(crate) mod align;
/// Splitting nets into sub-nets
pub mod decompose;
/// Stitching shard alignments
pub mod recompose;

use std::collections::HashMap;
use std::time::Instant;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::AlignmentError;
use super::log::{
    best_worst_cost_with_solver, recover, validate_inputs, variants_of, DeadlinePlanner,
};
use super::lp::{LpSolver, SimplexSolver};
use super::moves::AlignmentResult;
use super::parameters::{AlignmentParameters, TieBreak};
use crate::core::event_data::case_centric::EventLog;
use crate::core::process_models::case_centric::petri_net::{Marking, PetriNet, TransitionID};
use align::{align_with_subnets, ShardAlignment, ShardKey};
pub use decompose::{decompose, merge_subnets, SubNet};
pub use recompose::{recompose, ShardMoves, StitchConflict};

/// Default cap on the number of sub-nets merged while repairing border disagreements of a trace
pub const DEFAULT_THRESHOLD_BORDER_AGREEMENT: u64 = 100_000_000;

///
/// Which sub-nets are merged when two sub-nets disagree on a shared label
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum MergeRule {
    /// All sub-nets containing the label
    #[default]
    AllSharingShards,
    /// Only the two disagreeing sub-nets
    DisagreeingPair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
/// Parameters for decomposed alignments
pub struct DecompositionParameters {
    /// Cost functions, time budgets and output options (costs refer to the full trace)
    pub base: AlignmentParameters,
    /// Maximal number of sub-nets merged per trace before giving up
    pub threshold_border_agreement: u64,
    /// Merge rule on border disagreements
    pub merge_rule: MergeRule,
    /// Tie-break used when aligning sub-nets
    pub tie_break: TieBreak,
}

impl Default for DecompositionParameters {
    fn default() -> Self {
        Self {
            base: AlignmentParameters::default(),
            threshold_border_agreement: DEFAULT_THRESHOLD_BORDER_AGREEMENT,
            merge_rule: MergeRule::default(),
            tie_break: TieBreak::LaterInsertion,
        }
    }
}

impl DecompositionParameters {
    /// Serialize parameters to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    /// Deserialize parameters from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

///
/// Caches of decomposed alignments
///
/// `icache` holds sub-net alignments by (sub-net, projected activities, costs), `mcache` merged
/// sub-nets by the sub-nets they were merged from. A context is only valid for one net and
/// one set of parameters.
///
#[derive(Debug, Default)]
pub struct DecompositionContext {
    pub(crate) icache: HashMap<ShardKey, ShardAlignment>,
    pub(crate) mcache: HashMap<Vec<Vec<TransitionID>>, SubNet>,
}

impl DecompositionContext {
    /// Empty caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached sub-net alignments
    pub fn cached_alignments(&self) -> usize {
        self.icache.len()
    }

    /// Number of cached merged sub-nets
    pub fn cached_merges(&self) -> usize {
        self.mcache.len()
    }

    /// Drop all cached entries
    pub fn clear(&mut self) {
        self.icache.clear();
        self.mcache.clear();
    }
}

///
/// Result of a decomposed alignment
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecomposedAlignment {
    /// Recomposed alignment (statistics are summed over the sub-net alignments)
    pub result: AlignmentResult,
    /// Number of merge steps
    pub merges: usize,
    /// Number of sub-nets involved in merges
    pub border_disagreements: u64,
    /// Number of sub-nets after repairing all borders
    pub shards: usize,
}

///
/// Align an activity sequence by decomposing the net
///
pub fn align_activities_decomposed<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &DecompositionParameters,
) -> Result<DecomposedAlignment, AlignmentError> {
    align_activities_decomposed_with_context(
        trace,
        net,
        initial_marking,
        final_marking,
        params,
        &mut DecompositionContext::new(),
        &SimplexSolver::default(),
    )
}

/// [`align_activities_decomposed`] reusing the caches of `ctx` and a custom LP solver
pub fn align_activities_decomposed_with_context<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &DecompositionParameters,
    ctx: &mut DecompositionContext,
    solver: &dyn LpSolver,
) -> Result<DecomposedAlignment, AlignmentError> {
    let model_bwc = model_best_worst_cost(net, initial_marking, final_marking, params, solver)?;
    let subnets = decompose(net, initial_marking, final_marking);
    let deadline = params.base.trace_budget().map(|b| Instant::now() + b);
    align_with_subnets(
        trace,
        net,
        initial_marking,
        final_marking,
        &subnets,
        params,
        model_bwc,
        ctx,
        solver,
        deadline,
    )
}

fn model_best_worst_cost(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &DecompositionParameters,
    solver: &dyn LpSolver,
) -> Result<u64, AlignmentError> {
    match params.base.best_worst_cost_internal {
        Some(b) => {
            validate_inputs(net, initial_marking, final_marking)?;
            Ok(b)
        }
        None => {
            best_worst_cost_with_solver(net, initial_marking, final_marking, &params.base, solver)
        }
    }
}

///
/// Align every trace of a log by decomposing the net
///
/// Variants are aligned one after another, sharing one [`DecompositionContext`]. Traces that
/// time out or exceed the merge threshold are `None`.
///
pub fn align_log_decomposed(
    log: &EventLog,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &DecompositionParameters,
) -> Result<Vec<Option<AlignmentResult>>, AlignmentError> {
    let solver = SimplexSolver::default();
    let model_bwc = model_best_worst_cost(net, initial_marking, final_marking, params, &solver)?;
    let subnets = decompose(net, initial_marking, final_marking);
    let variants = variants_of(log, &params.base.activity_key, &params.base.variants_idx);
    let planner = DeadlinePlanner::new(&params.base);
    let mut ctx = DecompositionContext::new();
    debug!(
        variants = variants.len(),
        subnets = subnets.len(),
        "aligning log by decomposition"
    );

    let total = variants.len();
    let mut per_variant = Vec::with_capacity(total);
    for (finished, (acts, _)) in variants.iter().enumerate() {
        let res = match planner.next() {
            Ok(deadline) => recover(
                align_with_subnets(
                    acts,
                    net,
                    initial_marking,
                    final_marking,
                    &subnets,
                    params,
                    model_bwc,
                    &mut ctx,
                    &solver,
                    deadline,
                ),
                acts,
            ),
            Err(()) => {
                warn!(variant = ?acts, "global time budget exhausted");
                None
            }
        };
        per_variant.push(res.map(|d| d.result));
        if params.base.show_progress_bar {
            info!(finished = finished + 1, total, "aligned variant");
        }
    }
    let mut ret = variants.fan_out(per_variant);
    ret.resize(ret.len().max(log.traces.len()), None);
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_roundtrip_json() {
        let params = DecompositionParameters::from_json("{}").unwrap();
        assert_eq!(params, DecompositionParameters::default());
        assert_eq!(params.tie_break, TieBreak::LaterInsertion);
        assert_eq!(params.base.tie_break, TieBreak::EarlierInsertion);
        let custom = DecompositionParameters {
            merge_rule: MergeRule::DisagreeingPair,
            threshold_border_agreement: 3,
            ..Default::default()
        };
        let back = DecompositionParameters::from_json(&custom.to_json().unwrap()).unwrap();
        assert_eq!(back, custom);
    }
}
