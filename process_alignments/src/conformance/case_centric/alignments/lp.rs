//! Linear programming for the marking-equation heuristic
//!
//! Problems have the form: minimize `c^T x` subject to `A_ub x <= b_ub`, `A_eq x = b_eq`, `x >= 0`.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-9;
const FEASIBILITY_TOLERANCE: f64 = 1e-7;
const MAX_PIVOTS: usize = 100_000;
/// Number of branch-and-bound nodes explored before falling back to the relaxation
pub const BRANCH_AND_BOUND_NODE_BUDGET: usize = 100;

/// Outcome of solving a linear program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpStatus {
    /// Optimal solution found
    Optimal,
    /// No feasible solution exists
    Infeasible,
    /// Objective is unbounded from below
    Unbounded,
    /// Solver gave up (malformed input or pivot limit reached)
    Failed,
}

/// Solution of a linear program
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    /// Solver status; `x` and `objective` are only meaningful for [`LpStatus::Optimal`]
    pub status: LpStatus,
    /// Values of the variables
    pub x: Vec<f64>,
    /// Objective value `c^T x`
    pub objective: f64,
}

impl LpSolution {
    fn without_solution(status: LpStatus, n: usize) -> Self {
        Self {
            status,
            x: vec![0.0; n],
            objective: 0.0,
        }
    }

    /// Whether all variables are integral (within tolerance)
    pub fn is_integral(&self) -> bool {
        first_fractional(&self.x).is_none()
    }
}

/// Linear program: minimize `c^T x` s.t. `a_ub x <= b_ub`, `a_eq x = b_eq`, `x >= 0`
#[derive(Debug, Clone, Copy)]
pub struct LpProblem<'a> {
    /// Objective coefficients
    pub c: &'a DVector<f64>,
    /// Inequality constraint matrix (may have zero rows)
    pub a_ub: &'a DMatrix<f64>,
    /// Inequality right-hand side
    pub b_ub: &'a DVector<f64>,
    /// Equality constraint matrix (may have zero rows)
    pub a_eq: &'a DMatrix<f64>,
    /// Equality right-hand side
    pub b_eq: &'a DVector<f64>,
    /// Request an integer solution
    pub integrality: bool,
}

///
/// Pluggable linear programming backend
///
/// Implementations must be thread-safe, as log alignments solve from several workers.
///
pub trait LpSolver: Send + Sync + std::fmt::Debug {
    /// Solve the given problem
    fn solve(&self, problem: &LpProblem<'_>) -> LpSolution;
}

///
/// Dense two-phase simplex with Bland's rule
///
/// When integrality is requested, runs a depth-first branch-and-bound limited to
/// `node_budget` nodes and returns the relaxation if the budget is exhausted.
///
#[derive(Debug, Clone, Copy)]
pub struct SimplexSolver {
    /// Node budget for branch-and-bound
    pub node_budget: usize,
}

impl Default for SimplexSolver {
    fn default() -> Self {
        Self {
            node_budget: BRANCH_AND_BOUND_NODE_BUDGET,
        }
    }
}

impl LpSolver for SimplexSolver {
    fn solve(&self, problem: &LpProblem<'_>) -> LpSolution {
        let root = solve_relaxation(problem);
        if !problem.integrality || root.status != LpStatus::Optimal || root.is_integral() {
            return root;
        }
        self.branch_and_bound(problem, root)
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Upper(usize, f64),
    Lower(usize, f64),
}

impl SimplexSolver {
    fn branch_and_bound(&self, problem: &LpProblem<'_>, root: LpSolution) -> LpSolution {
        let n = problem.c.len();
        let mut best: Option<LpSolution> = None;
        let mut stack: Vec<Vec<Bound>> = vec![Vec::new()];
        let mut nodes = 0;
        while let Some(bounds) = stack.pop() {
            nodes += 1;
            if nodes > self.node_budget {
                return root;
            }
            let sol = if bounds.is_empty() {
                root.clone()
            } else {
                let a_ub = DMatrix::from_fn(problem.a_ub.nrows() + bounds.len(), n, |i, j| {
                    if i < problem.a_ub.nrows() {
                        problem.a_ub[(i, j)]
                    } else {
                        match bounds[i - problem.a_ub.nrows()] {
                            Bound::Upper(k, _) if k == j => 1.0,
                            Bound::Lower(k, _) if k == j => -1.0,
                            _ => 0.0,
                        }
                    }
                });
                let b_ub = DVector::from_iterator(
                    a_ub.nrows(),
                    problem.b_ub.iter().copied().chain(bounds.iter().map(|b| match b {
                        Bound::Upper(_, v) => *v,
                        Bound::Lower(_, v) => -*v,
                    })),
                );
                solve_relaxation(&LpProblem {
                    a_ub: &a_ub,
                    b_ub: &b_ub,
                    ..*problem
                })
            };
            if sol.status != LpStatus::Optimal {
                continue;
            }
            if best
                .as_ref()
                .is_some_and(|b| sol.objective >= b.objective - EPS)
            {
                continue;
            }
            match first_fractional(&sol.x) {
                None => best = Some(sol),
                Some(j) => {
                    let v = sol.x[j];
                    let mut lower = bounds.clone();
                    lower.push(Bound::Lower(j, v.ceil()));
                    let mut upper = bounds;
                    upper.push(Bound::Upper(j, v.floor()));
                    stack.push(lower);
                    stack.push(upper);
                }
            }
        }
        best.unwrap_or(root)
    }
}

fn first_fractional(x: &[f64]) -> Option<usize> {
    x.iter()
        .position(|v| (v - v.round()).abs() > FEASIBILITY_TOLERANCE)
}

struct Tableau {
    t: DMatrix<f64>,
    basis: Vec<usize>,
    rows: usize,
    rhs: usize,
    pivots: usize,
}

impl Tableau {
    fn pivot(&mut self, r: usize, e: usize) {
        let piv = self.t[(r, e)];
        for j in 0..=self.rhs {
            self.t[(r, j)] /= piv;
        }
        for i in 0..=self.rows {
            if i == r {
                continue;
            }
            let f = self.t[(i, e)];
            if f.abs() <= f64::EPSILON {
                continue;
            }
            for j in 0..=self.rhs {
                let v = self.t[(r, j)];
                self.t[(i, j)] -= f * v;
            }
        }
        self.basis[r] = e;
        self.pivots += 1;
    }

    /// Run simplex iterations with entering columns restricted to `0..limit`
    fn run(&mut self, limit: usize) -> LpStatus {
        let obj = self.rows;
        loop {
            if self.pivots > MAX_PIVOTS {
                return LpStatus::Failed;
            }
            let Some(e) = (0..limit).find(|j| self.t[(obj, *j)] < -EPS) else {
                return LpStatus::Optimal;
            };
            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..self.rows {
                let a = self.t[(i, e)];
                if a <= EPS {
                    continue;
                }
                let ratio = self.t[(i, self.rhs)] / a;
                leaving = match leaving {
                    None => Some((i, ratio)),
                    Some((r, best)) => {
                        if ratio < best - EPS
                            || ((ratio - best).abs() <= EPS && self.basis[i] < self.basis[r])
                        {
                            Some((i, ratio))
                        } else {
                            Some((r, best))
                        }
                    }
                };
            }
            match leaving {
                Some((r, _)) => self.pivot(r, e),
                None => return LpStatus::Unbounded,
            }
        }
    }
}

///
/// Solve the linear relaxation of `problem` (integrality is ignored)
///
pub fn solve_relaxation(problem: &LpProblem<'_>) -> LpSolution {
    let n = problem.c.len();
    let m_ub = problem.a_ub.nrows();
    let m_eq = problem.a_eq.nrows();
    if (m_ub > 0 && problem.a_ub.ncols() != n)
        || (m_eq > 0 && problem.a_eq.ncols() != n)
        || problem.b_ub.len() != m_ub
        || problem.b_eq.len() != m_eq
    {
        return LpSolution::without_solution(LpStatus::Failed, n);
    }
    let m = m_ub + m_eq;
    let first_artificial = n + m_ub;
    let cols = first_artificial + m;
    let rhs = cols;

    let mut t = DMatrix::<f64>::zeros(m + 1, cols + 1);
    for i in 0..m {
        let (b, slack) = if i < m_ub {
            (problem.b_ub[i], Some(n + i))
        } else {
            (problem.b_eq[i - m_ub], None)
        };
        let sign = if b < 0.0 { -1.0 } else { 1.0 };
        for j in 0..n {
            let a = if i < m_ub {
                problem.a_ub[(i, j)]
            } else {
                problem.a_eq[(i - m_ub, j)]
            };
            t[(i, j)] = sign * a;
        }
        if let Some(s) = slack {
            t[(i, s)] = sign;
        }
        t[(i, first_artificial + i)] = 1.0;
        t[(i, rhs)] = sign * b;
    }
    // phase I: minimize the sum of artificial variables
    for j in (0..first_artificial).chain(std::iter::once(rhs)) {
        t[(m, j)] = -(0..m).map(|i| t[(i, j)]).sum::<f64>();
    }
    let mut tab = Tableau {
        t,
        basis: (first_artificial..cols).collect(),
        rows: m,
        rhs,
        pivots: 0,
    };
    if tab.run(cols) != LpStatus::Optimal {
        return LpSolution::without_solution(LpStatus::Failed, n);
    }
    let scale = 1.0 + (0..m).map(|i| tab.t[(i, rhs)].abs()).sum::<f64>();
    if -tab.t[(m, rhs)] > FEASIBILITY_TOLERANCE * scale {
        return LpSolution::without_solution(LpStatus::Infeasible, n);
    }
    for i in 0..m {
        if tab.basis[i] >= first_artificial {
            if let Some(j) = (0..first_artificial).find(|j| tab.t[(i, *j)].abs() > EPS) {
                tab.pivot(i, j);
            }
        }
    }

    // phase II: original objective over structural and slack variables
    for j in 0..=rhs {
        tab.t[(m, j)] = if j < n { problem.c[j] } else { 0.0 };
    }
    for i in 0..m {
        let b = tab.basis[i];
        let cb = if b < n { problem.c[b] } else { 0.0 };
        if cb != 0.0 {
            for j in 0..=rhs {
                let v = tab.t[(i, j)];
                tab.t[(m, j)] -= cb * v;
            }
        }
    }
    match tab.run(first_artificial) {
        LpStatus::Optimal => {}
        status => return LpSolution::without_solution(status, n),
    }
    let mut x = vec![0.0; n];
    for i in 0..m {
        if tab.basis[i] < n {
            x[tab.basis[i]] = tab.t[(i, rhs)].max(0.0);
        }
    }
    let objective = x.iter().zip(problem.c.iter()).map(|(a, b)| a * b).sum();
    LpSolution {
        status: LpStatus::Optimal,
        x,
        objective,
    }
}
