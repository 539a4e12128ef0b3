use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tracing::{debug, warn};

use super::decompose::{merge_subnets, SubNet};
use super::recompose::{recompose, ShardMoves};
use super::{DecomposedAlignment, DecompositionContext, DecompositionParameters, MergeRule};
use crate::conformance::case_centric::alignments::error::AlignmentError;
use crate::conformance::case_centric::alignments::log::align_sequence;
use crate::conformance::case_centric::alignments::lp::LpSolver;
use crate::conformance::case_centric::alignments::moves::{
    alignment_fitness, replay_alignment, AlignmentResult, Move, MoveKind, SKIP,
};
use crate::conformance::case_centric::alignments::parameters::AlignmentParameters;
use crate::conformance::case_centric::alignments::sync_product::trace_transition_name;
use crate::core::process_models::case_centric::petri_net::{Marking, PetriNet, TransitionID};

/// A move on a visible label as seen by one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BorderMove {
    /// Synchronous move on the event at this trace position
    Sync(usize),
    /// Model move
    Model,
    /// Log move on the event at this trace position
    Log(usize),
}

/// Per visible label: the moves of one shard on it, in order
pub(crate) type Alres = BTreeMap<String, Vec<BorderMove>>;

/// Key of a shard alignment: sub-net, projected activities and their log move costs
pub(crate) type ShardKey = (Vec<TransitionID>, Vec<String>, Vec<u64>);

/// Alignment of a projected trace on a shard, with event indices relative to the projection
#[derive(Debug, Clone)]
pub(crate) struct ShardAlignment {
    pub(crate) moves: Vec<Move>,
    pub(crate) visited_states: usize,
    pub(crate) queued_states: usize,
    pub(crate) traversed_arcs: usize,
    pub(crate) lp_solved: usize,
}

/// Shard alignment placed on the full trace
#[derive(Debug)]
struct Placed {
    aligned: ShardAlignment,
    positions: Vec<usize>,
    moves: Vec<Move>,
    alres: Alres,
}

impl Placed {
    fn alres_of(&self, label: &str) -> &[BorderMove] {
        self.alres.get(label).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn alres_of(moves: &[Move]) -> Alres {
    let mut ret = Alres::new();
    for mv in moves {
        let (label, border) = match (mv.kind, mv.event, &mv.model_label) {
            (MoveKind::Sync, Some(e), _) => (&mv.log_label, BorderMove::Sync(e)),
            (MoveKind::Log, Some(e), _) => (&mv.log_label, BorderMove::Log(e)),
            (MoveKind::Model, _, Some(label)) => (label, BorderMove::Model),
            _ => continue,
        };
        ret.entry(label.clone()).or_default().push(border);
    }
    ret
}

/// Visible label -> shards having it (ascending)
fn label_cache(shards: &[SubNet]) -> HashMap<String, Vec<usize>> {
    let mut ret: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, s) in shards.iter().enumerate() {
        for l in &s.lvis_labels {
            ret.entry(l.clone()).or_default().push(i);
        }
    }
    ret
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Map a shard alignment back onto the positions of the full trace
fn lift(shard: &ShardAlignment, positions: &[usize]) -> Vec<Move> {
    shard
        .moves
        .iter()
        .map(|mv| {
            let mut mv = mv.clone();
            if let Some(e) = mv.event {
                let original = positions[e];
                mv.event = Some(original);
                mv.log_name = trace_transition_name(&mv.log_label, original);
            }
            mv
        })
        .collect()
}

/// Align the projection of `trace` onto the labels of `shard`, reusing cached alignments
fn align_shard(
    trace: &[&str],
    shard: &SubNet,
    params: &AlignmentParameters,
    ctx: &mut DecompositionContext,
    solver: &dyn LpSolver,
    deadline: Option<Instant>,
) -> Result<Placed, AlignmentError> {
    let positions: Vec<usize> = trace
        .iter()
        .enumerate()
        .filter(|(_, a)| shard.has_label(a))
        .map(|(k, _)| k)
        .collect();
    let projected: Vec<String> = positions.iter().map(|k| trace[*k].to_string()).collect();
    let proj_params = params.projected(&positions);
    let costs: Vec<u64> = (0..positions.len())
        .map(|k| proj_params.log_move_cost(k))
        .collect();
    let key: ShardKey = (shard.t_tuple.clone(), projected.clone(), costs);
    let aligned = match ctx.icache.get(&key) {
        Some(cached) => cached.clone(),
        None => {
            let res = align_sequence(
                &projected,
                &shard.net,
                &shard.initial_marking,
                &shard.final_marking,
                &proj_params,
                0,
                solver,
                deadline,
            )?;
            let aligned = ShardAlignment {
                moves: res.moves,
                visited_states: res.visited_states,
                queued_states: res.queued_states,
                traversed_arcs: res.traversed_arcs,
                lp_solved: res.lp_solved,
            };
            ctx.icache.insert(key, aligned.clone());
            aligned
        }
    };
    let moves = lift(&aligned, &positions);
    Ok(Placed {
        alres: alres_of(&moves),
        moves,
        positions,
        aligned,
    })
}

/// Log moves for the events whose activity is no visible label of any shard
fn foreign_log_moves(
    trace: &[&str],
    shards: &[SubNet],
    params: &AlignmentParameters,
) -> ShardMoves {
    let mut ret = ShardMoves::default();
    for (k, act) in trace.iter().enumerate() {
        if shards.iter().any(|s| s.has_label(act)) {
            continue;
        }
        ret.events.insert(k);
        ret.moves.push(Move {
            kind: MoveKind::Log,
            event: Some(k),
            transition: None,
            log_name: trace_transition_name(act, k),
            model_name: SKIP.to_string(),
            log_label: act.to_string(),
            model_label: Some(SKIP.to_string()),
            cost: params.log_move_cost(k),
        });
    }
    ret
}

///
/// Replace the shards at `members` by their union, appended at the end
///
/// Returns the first replaced position, from where the shards have to be aligned again.
///
#[allow(clippy::too_many_arguments)]
fn merge_shards(
    mut members: Vec<usize>,
    shards: &mut Vec<SubNet>,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &DecompositionParameters,
    ctx: &mut DecompositionContext,
    border_disagreements: &mut u64,
) -> Result<usize, AlignmentError> {
    members.sort_unstable();
    members.dedup();
    *border_disagreements += members.len() as u64;
    if *border_disagreements > params.threshold_border_agreement {
        warn!(
            border_disagreements = *border_disagreements,
            threshold = params.threshold_border_agreement,
            "border agreement repair exceeded its threshold"
        );
        return Err(AlignmentError::DecompositionThresholdExceeded(
            params.threshold_border_agreement,
        ));
    }
    let merge_key: Vec<Vec<TransitionID>> = members
        .iter()
        .map(|z| shards[*z].t_tuple.clone())
        .collect();
    let merged = ctx
        .mcache
        .entry(merge_key)
        .or_insert_with(|| {
            merge_subnets(
                net,
                initial_marking,
                final_marking,
                members.iter().map(|z| &shards[*z]),
            )
        })
        .clone();
    let restart = members.first().copied().unwrap_or(0);
    debug!(merged = members.len(), at = restart, "merging disagreeing sub-nets");
    for z in members.iter().rev() {
        shards.remove(*z);
    }
    shards.push(merged);
    Ok(restart)
}

///
/// Decomposed alignment of one activity sequence
///
/// `subnets` is the decomposition of `net`; `model_bwc` its best-worst cost.
///
/// Sub-nets disagreeing on the moves of a shared label are merged. Once all borders agree, the
/// shard alignments are stitched and the result is replayed on `net`. Shards that cannot be
/// stitched are merged as well; an alignment that does not replay falls back to the whole net.
///
#[allow(clippy::too_many_arguments)]
pub(crate) fn align_with_subnets<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    subnets: &[SubNet],
    params: &DecompositionParameters,
    model_bwc: u64,
    ctx: &mut DecompositionContext,
    solver: &dyn LpSolver,
    deadline: Option<Instant>,
) -> Result<DecomposedAlignment, AlignmentError> {
    let trace: Vec<&str> = trace.iter().map(|a| a.as_ref()).collect();
    let mut shard_params = params.base.clone();
    shard_params.tie_break = params.tie_break;

    let mut shards: Vec<SubNet> = subnets.to_vec();
    let mut acache = label_cache(&shards);
    let mut results: Vec<Placed> = Vec::new();
    let mut border_disagreements: u64 = 0;
    let mut merges = 0;
    let mut i = 0;

    let moves = loop {
        if expired(deadline) {
            return Err(AlignmentError::Timeout);
        }
        let members: Vec<usize> = if i < shards.len() {
            let placed = align_shard(&trace, &shards[i], &shard_params, ctx, solver, deadline)?;
            let mut members: Vec<usize> = Vec::new();
            for label in &shards[i].lvis_labels {
                let Some(sharing) = acache.get(label) else {
                    continue;
                };
                for &ind in sharing {
                    if ind >= i {
                        break;
                    }
                    if results[ind].alres_of(label) != placed.alres_of(label) {
                        match params.merge_rule {
                            MergeRule::AllSharingShards => members.extend(sharing),
                            MergeRule::DisagreeingPair => members.extend([ind, i]),
                        }
                    }
                }
            }
            results.push(placed);
            if members.is_empty() {
                i += 1;
                continue;
            }
            members
        } else {
            let mut stitched: Vec<ShardMoves> = results
                .iter()
                .zip(&shards)
                .map(|(placed, shard)| ShardMoves {
                    moves: placed.moves.clone(),
                    events: placed.positions.iter().copied().collect(),
                    transitions: shard.t_tuple.iter().copied().collect(),
                })
                .collect();
            stitched.push(foreign_log_moves(&trace, &shards, &params.base));
            match recompose(&stitched) {
                Ok(moves) => {
                    match replay_alignment(net, initial_marking, final_marking, &trace, &moves) {
                        Ok(()) => break moves,
                        Err(e) if shards.len() > 1 => {
                            warn!(error = %e, "recomposed alignment does not replay, merging all sub-nets");
                            (0..shards.len()).collect()
                        }
                        Err(e) => return Err(AlignmentError::Recomposition(e.to_string())),
                    }
                }
                Err(conflict) => {
                    debug!(shards = ?conflict.shards, "shard alignments cannot be interleaved");
                    let blocked: Vec<usize> = conflict
                        .shards
                        .iter()
                        .copied()
                        .filter(|s| *s < shards.len())
                        .collect();
                    if blocked.len() > 1 {
                        blocked
                    } else if shards.len() > 1 {
                        (0..shards.len()).collect()
                    } else {
                        return Err(AlignmentError::Recomposition(conflict.to_string()));
                    }
                }
            }
        };

        i = merge_shards(
            members,
            &mut shards,
            net,
            initial_marking,
            final_marking,
            params,
            ctx,
            &mut border_disagreements,
        )?;
        merges += 1;
        results.truncate(i);
        acache = label_cache(&shards);
    };

    let cost: u64 = moves.iter().map(|m| m.cost).sum();
    let bwc = params.base.trace_best_worst_cost(trace.len()) + model_bwc;
    let mut result = AlignmentResult {
        alignment: moves
            .iter()
            .map(|m| m.to_step(params.base.ret_tuple_as_trans_desc))
            .collect(),
        moves,
        cost,
        visited_states: results.iter().map(|p| p.aligned.visited_states).sum(),
        queued_states: results.iter().map(|p| p.aligned.queued_states).sum(),
        traversed_arcs: results.iter().map(|p| p.aligned.traversed_arcs).sum(),
        lp_solved: results.iter().map(|p| p.aligned.lp_solved).sum(),
        fitness: 0.0,
        bwc,
    };
    result.fitness = alignment_fitness(result.deviation_cost(), bwc);
    Ok(DecomposedAlignment {
        result,
        merges,
        border_disagreements,
        shards: shards.len(),
    })
}
