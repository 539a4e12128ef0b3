//! Marking-equation heuristic for A* on the synchronous product
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use super::lp::{LpProblem, LpSolver, LpStatus};
use super::sync_product::SynchronousProduct;

const ROUNDING_TOLERANCE: f64 = 1e-6;

///
/// Heuristic value of a state together with the firing vector it was derived from
///
/// A value is _trusted_ if it is the exact solution of the marking equation for its state.
/// Values derived from a predecessor are trusted as long as the firing vector stays non-negative.
///
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicValue {
    /// Lower bound on the remaining cost
    pub h: u64,
    /// Transition firing vector
    pub x: Vec<f64>,
    /// Whether `h` is exact for the marking equation
    pub trusted: bool,
}

impl HeuristicValue {
    /// The trivial heuristic `h = 0`
    pub fn zero(n: usize) -> Self {
        Self {
            h: 0,
            x: vec![0.0; n],
            trusted: true,
        }
    }

    ///
    /// Derive the value of a successor reached by firing transition `t` with cost `cost`
    ///
    /// Subtracts `t` from the firing vector. If the entry stays non-negative the bound `h - cost` is exact.
    ///
    pub fn derive(&self, t: usize, cost: u64) -> Self {
        let mut x = self.x.clone();
        x[t] -= 1.0;
        Self {
            h: self.h.saturating_sub(cost),
            trusted: self.trusted && x[t] >= -ROUNDING_TOLERANCE,
            x,
        }
    }
}

///
/// Solves `C x = FM - m`, `x >= 0`, minimizing `cost^T x` for markings `m` of a [`SynchronousProduct`]
///
#[derive(Debug)]
pub struct MarkingEquation<'a> {
    spn: &'a SynchronousProduct,
    solver: &'a dyn LpSolver,
    integrality: bool,
    a_ub: DMatrix<f64>,
    b_ub: DVector<f64>,
    target: DVector<f64>,
}

impl<'a> MarkingEquation<'a> {
    /// Prepare the heuristic for `spn`
    pub fn new(spn: &'a SynchronousProduct, solver: &'a dyn LpSolver, integrality: bool) -> Self {
        Self {
            spn,
            solver,
            integrality,
            a_ub: DMatrix::zeros(0, spn.transitions.len()),
            b_ub: DVector::zeros(0),
            target: DVector::from_iterator(
                spn.final_marking.len(),
                spn.final_marking.iter().map(|c| *c as f64),
            ),
        }
    }

    ///
    /// Exact heuristic for `marking`
    ///
    /// Falls back to `h = 0` (still admissible) if the solver does not report an optimum.
    ///
    pub fn compute(&self, marking: &[u32]) -> HeuristicValue {
        let b_eq = &self.target
            - DVector::from_iterator(marking.len(), marking.iter().map(|c| *c as f64));
        let sol = self.solver.solve(&LpProblem {
            c: self.spn.cost_vector(),
            a_ub: &self.a_ub,
            b_ub: &self.b_ub,
            a_eq: self.spn.incidence_matrix(),
            b_eq: &b_eq,
            integrality: self.integrality,
        });
        match sol.status {
            LpStatus::Optimal => HeuristicValue {
                h: (sol.objective - ROUNDING_TOLERANCE).ceil().max(0.0) as u64,
                x: sol.x,
                trusted: true,
            },
            LpStatus::Infeasible => {
                debug!("marking equation infeasible, using h = 0");
                HeuristicValue::zero(self.spn.transitions.len())
            }
            status => {
                warn!(?status, "marking equation could not be solved, using h = 0");
                HeuristicValue::zero(self.spn.transitions.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::case_centric::alignments::lp::SimplexSolver;
    use crate::conformance::case_centric::alignments::parameters::{
        AlignmentParameters, STD_MODEL_LOG_MOVE_COST,
    };
    use crate::core::process_models::case_centric::petri_net::{ArcType, Marking, PetriNet};

    #[test]
    fn heuristic_counts_unavoidable_deviations() {
        let mut net = PetriNet::new();
        let p0 = net.add_place(None);
        let p1 = net.add_place(None);
        let a = net.add_transition(Some("A".into()), None);
        net.add_arc(ArcType::place_to_transition(p0, a), None);
        net.add_arc(ArcType::transition_to_place(a, p1), None);
        let im: Marking = [(p0, 1)].into_iter().collect();
        let fm: Marking = [(p1, 1)].into_iter().collect();
        let params = AlignmentParameters::default();
        let solver = SimplexSolver::default();

        let spn = SynchronousProduct::build(&net, &im, &fm, &["A"], &params).unwrap();
        let eq = MarkingEquation::new(&spn, &solver, false);
        assert_eq!(eq.compute(&spn.initial_marking).h, 0);

        let spn = SynchronousProduct::build(&net, &im, &fm, &["B"], &params).unwrap();
        let eq = MarkingEquation::new(&spn, &solver, false);
        let hv = eq.compute(&spn.initial_marking);
        assert_eq!(hv.h, 2 * STD_MODEL_LOG_MOVE_COST);
        assert!(hv.trusted);
    }

    #[test]
    fn derived_values_lose_trust_on_negative_entries() {
        let hv = HeuristicValue {
            h: 5,
            x: vec![1.0, 0.0],
            trusted: true,
        };
        let ok = hv.derive(0, 3);
        assert!(ok.trusted);
        assert_eq!(ok.h, 2);
        let bad = hv.derive(1, 10);
        assert!(!bad.trusted);
        assert_eq!(bad.h, 0);
    }
}
