//! A* search for optimal alignments on a synchronous product
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Instant;

use tracing::debug;

use super::error::AlignmentError;
use super::heuristic::{HeuristicValue, MarkingEquation};
use super::lp::LpSolver;
use super::moves::MoveKind;
use super::parameters::TieBreak;
use super::sync_product::{DenseMarking, SynchronousProduct};
use crate::core::process_models::case_centric::petri_net::Semantics;

/// Options of a single A* run
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Order of states with equal `f` and `g`
    pub tie_break: TieBreak,
    /// Request integer solutions of the marking equation
    pub integrality: bool,
    /// Abort with [`AlignmentError::Timeout`] once this instant has passed
    pub deadline: Option<Instant>,
}

/// Optimal path through a [`SynchronousProduct`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Indices of the fired product transitions
    pub path: Vec<usize>,
    /// Total cost of the path
    pub cost: u64,
    /// Number of expanded states
    pub visited_states: usize,
    /// Number of queued states
    pub queued_states: usize,
    /// Number of explored arcs
    pub traversed_arcs: usize,
    /// Number of solved linear programs
    pub lp_solved: usize,
}

#[derive(Debug)]
struct SearchNode {
    marking: DenseMarking,
    g: u64,
    parent: Option<usize>,
    via: Option<usize>,
    heuristic: HeuristicValue,
}

#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    f: u64,
    g: u64,
    trusted: bool,
    order: u64,
    node: usize,
}

impl Ord for QueueEntry {
    /// Greater entries are popped first: lower `f`, then higher `g`, then trusted, then lower `order`
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then(self.g.cmp(&other.g))
            .then(self.trusted.cmp(&other.trusted))
            .then(other.order.cmp(&self.order))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct OpenSet {
    heap: BinaryHeap<QueueEntry>,
    counter: u64,
    tie_break: TieBreak,
}

impl OpenSet {
    fn push(&mut self, node: usize, g: u64, heuristic: &HeuristicValue) {
        self.counter += 1;
        let order = match self.tie_break {
            TieBreak::EarlierInsertion => self.counter,
            TieBreak::LaterInsertion => u64::MAX - self.counter,
        };
        self.heap.push(QueueEntry {
            f: g.saturating_add(heuristic.h),
            g,
            trusted: heuristic.trusted,
            order,
            node,
        });
    }
}

///
/// Compute a minimum-cost path from the initial to the final marking of `spn`
///
/// Classic nets use the marking equation as heuristic (solved with `solver`), nets with reset or
/// inhibitor arcs are searched with `h = 0`. After a log move, model moves are not expanded.
///
pub fn a_star_search(
    spn: &SynchronousProduct,
    solver: &dyn LpSolver,
    options: &SearchOptions,
) -> Result<SearchOutcome, AlignmentError> {
    let n_transitions = spn.transitions.len();
    let equation = (spn.semantics == Semantics::Classic)
        .then(|| MarkingEquation::new(spn, solver, options.integrality));

    let mut lp_solved = 0;
    let mut visited_states = 0;
    let mut queued_states = 0;
    let mut traversed_arcs = 0;

    let initial_heuristic = match &equation {
        Some(eq) => {
            lp_solved += 1;
            eq.compute(&spn.initial_marking)
        }
        None => HeuristicValue::zero(n_transitions),
    };
    let mut nodes: Vec<SearchNode> = vec![SearchNode {
        marking: spn.initial_marking.clone(),
        g: 0,
        parent: None,
        via: None,
        heuristic: initial_heuristic,
    }];
    let mut open = OpenSet {
        heap: BinaryHeap::new(),
        counter: 0,
        tie_break: options.tie_break,
    };
    open.push(0, 0, &nodes[0].heuristic);
    let mut closed: HashSet<DenseMarking> = HashSet::new();
    let mut best_g: HashMap<DenseMarking, u64> = HashMap::new();
    best_g.insert(spn.initial_marking.clone(), 0);

    while let Some(entry) = open.heap.pop() {
        if options.deadline.is_some_and(|d| Instant::now() >= d) {
            debug!(visited_states, queued_states, "alignment search timed out");
            return Err(AlignmentError::Timeout);
        }
        let current = entry.node;
        if closed.contains(&nodes[current].marking) {
            continue;
        }
        if !nodes[current].heuristic.trusted {
            if let Some(eq) = &equation {
                lp_solved += 1;
                nodes[current].heuristic = eq.compute(&nodes[current].marking);
            } else {
                nodes[current].heuristic = HeuristicValue::zero(n_transitions);
            }
            let g = nodes[current].g;
            open.push(current, g, &nodes[current].heuristic);
            continue;
        }
        if nodes[current].marking == spn.final_marking {
            let mut path = Vec::new();
            let mut cursor = current;
            while let (Some(parent), Some(t)) = (nodes[cursor].parent, nodes[cursor].via) {
                path.push(t);
                cursor = parent;
            }
            path.reverse();
            debug!(
                cost = nodes[current].g,
                visited_states, queued_states, traversed_arcs, lp_solved, "alignment found"
            );
            return Ok(SearchOutcome {
                path,
                cost: nodes[current].g,
                visited_states,
                queued_states,
                traversed_arcs,
                lp_solved,
            });
        }

        let marking = nodes[current].marking.clone();
        let g = nodes[current].g;
        let after_log_move = nodes[current]
            .via
            .is_some_and(|t| spn.transitions[t].kind == MoveKind::Log);
        closed.insert(marking.clone());
        visited_states += 1;

        for t in spn.enabled_transitions(&marking) {
            let transition = &spn.transitions[t];
            if after_log_move && matches!(transition.kind, MoveKind::Model | MoveKind::Silent) {
                continue;
            }
            traversed_arcs += 1;
            let next = spn.fire(t, &marking);
            if closed.contains(&next) {
                continue;
            }
            let next_g = g + transition.cost;
            if best_g.get(&next).is_some_and(|known| *known <= next_g) {
                continue;
            }
            best_g.insert(next.clone(), next_g);
            queued_states += 1;
            let heuristic = if equation.is_some() {
                nodes[current].heuristic.derive(t, transition.cost)
            } else {
                HeuristicValue::zero(n_transitions)
            };
            nodes.push(SearchNode {
                marking: next,
                g: next_g,
                parent: Some(current),
                via: Some(t),
                heuristic,
            });
            let idx = nodes.len() - 1;
            open.push(idx, next_g, &nodes[idx].heuristic);
        }
    }
    debug!(visited_states, queued_states, "open set exhausted");
    Err(AlignmentError::FinalMarkingUnreachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::case_centric::alignments::lp::SimplexSolver;
    use crate::conformance::case_centric::alignments::parameters::{
        AlignmentParameters, STD_MODEL_LOG_MOVE_COST,
    };
    use crate::core::process_models::case_centric::petri_net::{ArcType, Marking, PetriNet};

    fn choice_net() -> (PetriNet, Marking, Marking) {
        // p0 -> {A | B} -> p1
        let mut net = PetriNet::new();
        let p0 = net.add_place(None);
        let p1 = net.add_place(None);
        for label in ["A", "B"] {
            let t = net.add_named_transition(label, Some(label));
            net.add_arc(ArcType::place_to_transition(p0, t), None);
            net.add_arc(ArcType::transition_to_place(t, p1), None);
        }
        let im: Marking = [(p0, 1)].into_iter().collect();
        let fm: Marking = [(p1, 1)].into_iter().collect();
        (net, im, fm)
    }

    fn search(trace: &[&str], options: SearchOptions) -> Result<SearchOutcome, AlignmentError> {
        let (net, im, fm) = choice_net();
        let spn =
            SynchronousProduct::build(&net, &im, &fm, trace, &AlignmentParameters::default())?;
        a_star_search(&spn, &SimplexSolver::default(), &options)
    }

    #[test]
    fn queue_prefers_low_f_then_high_g() {
        let mut heap = BinaryHeap::new();
        let e = |f, g, trusted, order, node| QueueEntry {
            f,
            g,
            trusted,
            order,
            node,
        };
        heap.push(e(5, 1, true, 1, 0));
        heap.push(e(5, 3, true, 2, 1));
        heap.push(e(4, 0, false, 3, 2));
        heap.push(e(5, 3, false, 0, 3));
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|e| e.node)).collect();
        assert_eq!(order, vec![2, 1, 3, 0]);
    }

    #[test]
    fn finds_choice_alignments() {
        let fit = search(&["B"], SearchOptions::default()).unwrap();
        assert_eq!(fit.cost, 0);
        assert_eq!(fit.path.len(), 1);

        let deviating = search(&["C"], SearchOptions::default()).unwrap();
        assert_eq!(deviating.cost, 2 * STD_MODEL_LOG_MOVE_COST);
        assert_eq!(deviating.path.len(), 2);
        assert!(deviating.lp_solved >= 1);
    }

    #[test]
    fn tie_break_is_deterministic() {
        for tie_break in [TieBreak::EarlierInsertion, TieBreak::LaterInsertion] {
            let options = SearchOptions {
                tie_break,
                ..Default::default()
            };
            let first = search(&["C"], options).unwrap();
            for _ in 0..3 {
                assert_eq!(search(&["C"], options).unwrap().cost, first.cost);
            }
        }
    }

    #[test]
    fn expired_deadline_times_out() {
        let options = SearchOptions {
            deadline: Some(Instant::now()),
            ..Default::default()
        };
        assert_eq!(search(&["A"], options), Err(AlignmentError::Timeout));
    }

    #[test]
    fn unreachable_final_marking() {
        let (mut net, im, _) = choice_net();
        let island = net.add_place(None);
        let fm: Marking = [(island, 1)].into_iter().collect();
        let spn =
            SynchronousProduct::build(&net, &im, &fm, &["A"], &AlignmentParameters::default())
                .unwrap();
        assert_eq!(
            a_star_search(&spn, &SimplexSolver::default(), &SearchOptions::default()),
            Err(AlignmentError::FinalMarkingUnreachable)
        );
    }
}
