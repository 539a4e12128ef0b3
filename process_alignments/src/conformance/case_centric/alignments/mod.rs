//! Cost-based Alignments
//!
//! Alignments relate every event of a trace to a step of a model execution with minimal
//! deviation cost. Optimal alignments are found with A* on the synchronous product of a
//! trace net and the model, guided by the marking equation.
/// A* search on synchronous products
pub mod astar;
/// Decompose/recompose alignments
pub mod decomposition;
/// Errors of alignment computations
pub mod error;
/// Marking-equation heuristic
pub mod heuristic;
/// Aligning traces and event logs
pub mod log;
/// Linear programming
pub mod lp;
/// Alignment moves and results
pub mod moves;
/// Parameters and cost functions
pub mod parameters;
/// Synchronous product nets
pub mod sync_product;

pub use error::{AlignmentError, AlignmentReplayError};
pub use log::{
    align_activities, align_activities_with_solver, align_log, align_log_with_solver,
    align_trace, best_worst_cost, best_worst_cost_with_solver, AlignmentLogFitness,
};
pub use lp::{LpProblem, LpSolution, LpSolver, LpStatus, SimplexSolver};
pub use moves::{replay_alignment, AlignmentResult, AlignmentStep, Move, MoveKind, SKIP};
pub use parameters::{
    AlignmentParameters, TieBreak, STD_MODEL_LOG_MOVE_COST, STD_SYNC_COST, STD_TAU_COST,
};
