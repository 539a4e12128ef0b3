//! Aligning single traces and whole event logs
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::astar::{a_star_search, SearchOptions, SearchOutcome};
use super::error::AlignmentError;
use super::lp::{LpSolver, SimplexSolver};
use super::moves::{alignment_fitness, AlignmentResult, Move};
use super::parameters::AlignmentParameters;
use super::sync_product::SynchronousProduct;
use crate::core::event_data::case_centric::{
    EventLog, EventLogClassifier, Trace, VariantIndex,
};
use crate::core::process_models::case_centric::petri_net::{Marking, PetriNet};

/// Check the net and both markings, mapping problems to [`AlignmentError::InvalidInput`]
pub(crate) fn validate_inputs(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
) -> Result<(), AlignmentError> {
    net.validate()?;
    net.validate_marking(initial_marking)?;
    net.validate_marking(final_marking)?;
    Ok(())
}

///
/// Best-worst cost of a model: the cost of aligning the empty trace
///
/// Fails with [`AlignmentError::InvalidInput`] if the final marking cannot be reached.
///
pub fn best_worst_cost(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
) -> Result<u64, AlignmentError> {
    best_worst_cost_with_solver(
        net,
        initial_marking,
        final_marking,
        params,
        &SimplexSolver::default(),
    )
}

/// [`best_worst_cost`] with a custom LP solver
pub fn best_worst_cost_with_solver(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
    solver: &dyn LpSolver,
) -> Result<u64, AlignmentError> {
    validate_inputs(net, initial_marking, final_marking)?;
    let empty: [&str; 0] = [];
    let spn = SynchronousProduct::build(net, initial_marking, final_marking, &empty, params)?;
    let options = SearchOptions {
        tie_break: params.tie_break,
        integrality: params.lp_integrality,
        deadline: None,
    };
    match a_star_search(&spn, solver, &options) {
        Ok(outcome) => Ok(outcome.cost),
        Err(AlignmentError::FinalMarkingUnreachable) => Err(AlignmentError::InvalidInput(
            "final marking is not reachable from the initial marking".to_string(),
        )),
        Err(e) => Err(e),
    }
}

fn model_best_worst_cost(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
    solver: &dyn LpSolver,
) -> Result<u64, AlignmentError> {
    match params.best_worst_cost_internal {
        Some(b) => {
            validate_inputs(net, initial_marking, final_marking)?;
            Ok(b)
        }
        None => best_worst_cost_with_solver(net, initial_marking, final_marking, params, solver),
    }
}

/// Turn the path of a search into an [`AlignmentResult`]
pub(crate) fn result_from_outcome(
    spn: &SynchronousProduct,
    outcome: SearchOutcome,
    params: &AlignmentParameters,
    bwc: u64,
) -> AlignmentResult {
    let moves: Vec<Move> = outcome
        .path
        .iter()
        .map(|t| spn.transitions[*t].to_move())
        .collect();
    let mut result = AlignmentResult {
        alignment: moves
            .iter()
            .map(|m| m.to_step(params.ret_tuple_as_trans_desc))
            .collect(),
        moves,
        cost: outcome.cost,
        visited_states: outcome.visited_states,
        queued_states: outcome.queued_states,
        traversed_arcs: outcome.traversed_arcs,
        lp_solved: outcome.lp_solved,
        fitness: 0.0,
        bwc,
    };
    result.fitness = alignment_fitness(result.deviation_cost(), bwc);
    result
}

/// Align an activity sequence given an already known model best-worst cost
#[allow(clippy::too_many_arguments)]
pub(crate) fn align_sequence<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
    model_bwc: u64,
    solver: &dyn LpSolver,
    deadline: Option<Instant>,
) -> Result<AlignmentResult, AlignmentError> {
    let spn = SynchronousProduct::build(net, initial_marking, final_marking, trace, params)?;
    let options = SearchOptions {
        tie_break: params.tie_break,
        integrality: params.lp_integrality,
        deadline,
    };
    let outcome = a_star_search(&spn, solver, &options)?;
    let bwc = params.trace_best_worst_cost(trace.len()) + model_bwc;
    Ok(result_from_outcome(&spn, outcome, params, bwc))
}

///
/// Compute an optimal alignment of an activity sequence
///
/// Uses `max_align_time_trace` as time budget.
///
pub fn align_activities<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
) -> Result<AlignmentResult, AlignmentError> {
    align_activities_with_solver(
        trace,
        net,
        initial_marking,
        final_marking,
        params,
        &SimplexSolver::default(),
    )
}

/// [`align_activities`] with a custom LP solver
pub fn align_activities_with_solver<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
    solver: &dyn LpSolver,
) -> Result<AlignmentResult, AlignmentError> {
    let model_bwc = model_best_worst_cost(net, initial_marking, final_marking, params, solver)?;
    let deadline = params.trace_budget().map(|b| Instant::now() + b);
    align_sequence(
        trace,
        net,
        initial_marking,
        final_marking,
        params,
        model_bwc,
        solver,
        deadline,
    )
}

///
/// Compute an optimal alignment of a [`Trace`]
///
/// Activities are read from the `activity_key` attribute of the events.
///
pub fn align_trace(
    trace: &Trace,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
) -> Result<AlignmentResult, AlignmentError> {
    let classifier = EventLogClassifier::from_activity_key(&params.activity_key);
    let activities: Vec<String> = trace
        .events
        .iter()
        .map(|e| classifier.get_class_identity(e))
        .collect();
    align_activities(&activities, net, initial_marking, final_marking, params)
}

/// Variant grouping from the parameters, or computed from the log
pub(crate) fn variants_of(
    log: &EventLog,
    activity_key: &str,
    given: &Option<VariantIndex>,
) -> VariantIndex {
    match given {
        Some(v) => v.clone(),
        None => VariantIndex::from_log(log, &EventLogClassifier::from_activity_key(activity_key)),
    }
}

///
/// Tracks the global time budget of a log run and hands out per-variant deadlines
///
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeadlinePlanner {
    global: Option<Instant>,
    per_trace: Option<Duration>,
}

impl DeadlinePlanner {
    pub(crate) fn new(params: &AlignmentParameters) -> Self {
        Self {
            global: params.log_budget().map(|b| Instant::now() + b),
            per_trace: params.trace_budget(),
        }
    }

    ///
    /// Deadline for the next variant
    ///
    /// `Err(())` if the global budget is already used up. Otherwise the per-trace budget,
    /// capped at half of the remaining global budget.
    ///
    pub(crate) fn next(&self) -> Result<Option<Instant>, ()> {
        let now = Instant::now();
        match self.global {
            None => Ok(self.per_trace.map(|b| now + b)),
            Some(global) => {
                let remaining = global.saturating_duration_since(now);
                if remaining.is_zero() {
                    return Err(());
                }
                let cap = remaining / 2;
                Ok(Some(now + self.per_trace.map_or(cap, |b| b.min(cap))))
            }
        }
    }
}

///
/// Apply `f` to every variant, sequentially or on a `rayon` pool with `workers` threads
///
/// Panics in `f` are caught and reported as `None` for the affected variant.
///
pub(crate) fn run_variants<T, F>(
    variants: &VariantIndex,
    workers: usize,
    show_progress: bool,
    f: F,
) -> Vec<Option<T>>
where
    T: Send,
    F: Fn(&[String]) -> Option<T> + Sync,
{
    let total = variants.len();
    let done = AtomicUsize::new(0);
    let guarded = |acts: &[String]| {
        let ret = match catch_unwind(AssertUnwindSafe(|| f(acts))) {
            Ok(r) => r,
            Err(_) => {
                warn!(variant = ?acts, "alignment worker panicked");
                None
            }
        };
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if show_progress {
            info!(finished, total, "aligned variant");
        }
        ret
    };
    let sequential = |g: &dyn Fn(&[String]) -> Option<T>| {
        variants.iter().map(|(acts, _)| g(acts)).collect::<Vec<_>>()
    };
    if workers <= 1 || total < 2 {
        return sequential(&guarded);
    }
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| {
            variants
                .variants
                .par_iter()
                .map(|(acts, _)| guarded(acts.as_slice()))
                .collect()
        }),
        Err(e) => {
            warn!(%e, "could not start worker pool, aligning sequentially");
            sequential(&guarded)
        }
    }
}

/// Map recoverable per-trace failures to `None`
pub(crate) fn recover<T>(res: Result<T, AlignmentError>, acts: &[String]) -> Option<T> {
    match res {
        Ok(r) => Some(r),
        Err(e) => {
            warn!(variant = ?acts, error = %e, "no alignment for variant");
            None
        }
    }
}

///
/// Align every trace of an event log
///
/// One representative per variant is aligned and its result is copied to all traces of the
/// variant. The returned list follows the trace order of `log`; traces that timed out or could not
/// be aligned are `None`. Invalid nets or markings fail the whole call.
///
pub fn align_log(
    log: &EventLog,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
) -> Result<Vec<Option<AlignmentResult>>, AlignmentError> {
    align_log_with_solver(
        log,
        net,
        initial_marking,
        final_marking,
        params,
        &SimplexSolver::default(),
    )
}

/// [`align_log`] with a custom LP solver
pub fn align_log_with_solver(
    log: &EventLog,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &AlignmentParameters,
    solver: &dyn LpSolver,
) -> Result<Vec<Option<AlignmentResult>>, AlignmentError> {
    let model_bwc = model_best_worst_cost(net, initial_marking, final_marking, params, solver)?;
    let variants = variants_of(log, &params.activity_key, &params.variants_idx);
    let planner = DeadlinePlanner::new(params);
    let workers = params.worker_count();
    debug!(
        traces = log.traces.len(),
        variants = variants.len(),
        workers,
        "aligning log"
    );

    let per_variant = run_variants(&variants, workers, params.show_progress_bar, |acts| {
        let Ok(deadline) = planner.next() else {
            warn!(variant = ?acts, "global time budget exhausted");
            return None;
        };
        recover(
            align_sequence(
                acts,
                net,
                initial_marking,
                final_marking,
                params,
                model_bwc,
                solver,
                deadline,
            ),
            acts,
        )
    });
    let mut ret = variants.fan_out(per_variant);
    ret.resize(ret.len().max(log.traces.len()), None);
    Ok(ret)
}

///
/// Aggregated fitness of a log alignment
///
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct AlignmentLogFitness {
    /// Share of aligned traces with fitness 1, in percent
    pub percentage_of_fitting_traces: f64,
    /// Mean fitness of the aligned traces
    pub average_trace_fitness: f64,
    /// `1 - sum(deviation cost) / sum(bwc)` over the aligned traces
    pub log_fitness: f64,
}

impl AlignmentLogFitness {
    /// Aggregate per-trace results (`None` entries are skipped)
    pub fn from_results(results: &[Option<AlignmentResult>]) -> Self {
        let aligned: Vec<&AlignmentResult> = results.iter().flatten().collect();
        if aligned.is_empty() {
            return Self::default();
        }
        let n = aligned.len() as f64;
        let fitting = aligned.iter().filter(|r| r.fitness >= 1.0).count() as f64;
        let sum_fitness: f64 = aligned.iter().map(|r| r.fitness).sum();
        let sum_cost: u64 = aligned.iter().map(|r| r.deviation_cost()).sum();
        let sum_bwc: u64 = aligned.iter().map(|r| r.bwc).sum();
        Self {
            percentage_of_fitting_traces: 100.0 * fitting / n,
            average_trace_fitness: sum_fitness / n,
            log_fitness: alignment_fitness(sum_cost, sum_bwc),
        }
    }
}
