use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::process_models::case_centric::petri_net::{
    Marking, PetriNetError, TransitionID,
};

///
/// Errors than can occur for the input of the token-based replay algorithm
///
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenReplayError {
    /// Net or markings are malformed
    #[error(transparent)]
    InvalidNet(#[from] PetriNetError),
    /// Error if no initial marking is provided
    #[error("No initial marking")]
    NoInitialMarking,
    /// Error if the no final marking is provided
    #[error("No final marking")]
    NoFinalMarking,
    /// Error if there are too many final markings are provided
    #[error("Too many final markings")]
    TooManyFinalMarkings,
}

///
/// Outcome of replaying a single trace
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TokenReplayTraceResult {
    /// Whether the trace fits the net
    pub trace_is_fit: bool,
    /// Token-based fitness of the trace in `[0, 1]`
    pub trace_fitness: f64,
    /// Fired transitions (visible and invisible) in order
    pub activated_transitions: Vec<TransitionID>,
    /// Marking at the end of the replay
    pub reached_marking: Marking,
    /// Transitions enabled in the reached marking (sorted)
    pub enabled_transitions_in_marking: Vec<TransitionID>,
    /// Transitions that were fired although not enabled
    pub transitions_with_problems: Vec<TransitionID>,
    /// Tokens that had to be inserted
    pub missing_tokens: u64,
    /// Tokens consumed
    pub consumed_tokens: u64,
    /// Tokens left over beyond the final marking
    pub remaining_tokens: u64,
    /// Tokens produced
    pub produced_tokens: u64,
    /// Activities of the trace without a transition in the net (first occurrence order)
    pub activities_not_in_model: Vec<String>,
}

/// Token-based fitness: `½(1 − missing/consumed) + ½(1 − remaining/produced)`
///
/// A zero denominator makes its term 1.
pub fn token_fitness(missing: u64, consumed: u64, remaining: u64, produced: u64) -> f64 {
    let ratio = |a: u64, b: u64| if b == 0 { 0.0 } else { a as f64 / b as f64 };
    0.5 * (1.0 - ratio(missing, consumed)) + 0.5 * (1.0 - ratio(remaining, produced))
}

///
/// Token counters summed over replayed traces
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TokenBasedReplayResult {
    /// Produced tokens during token-based replay
    pub produced: u64,
    /// Consumed tokens during token-based replay
    pub consumed: u64,
    /// Missing tokens during token-based replay
    pub missing: u64,
    /// Remaining tokens during token-based replay
    pub remaining: u64,
}

impl TokenBasedReplayResult {
    /// Initializes a [`TokenBasedReplayResult`]
    pub fn new() -> TokenBasedReplayResult {
        Self::default()
    }

    /// Sum the counters of replayed traces
    pub fn from_traces<'a, I: IntoIterator<Item = &'a TokenReplayTraceResult>>(traces: I) -> Self {
        traces.into_iter().fold(Self::new(), |mut acc, t| {
            acc.produced += t.produced_tokens;
            acc.consumed += t.consumed_tokens;
            acc.missing += t.missing_tokens;
            acc.remaining += t.remaining_tokens;
            acc
        })
    }

    /// Computes the fitness from the produced, consumed, missing, and remaining tokens
    pub fn compute_fitness(&self) -> f64 {
        token_fitness(self.missing, self.consumed, self.remaining, self.produced)
    }
}

///
/// Log-level summary of token-based replay
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TokenReplayLogFitness {
    /// Percentage (`0..=100`) of fitting traces
    pub perc_fit_traces: f64,
    /// Mean of the trace fitness values
    pub average_trace_fitness: f64,
    /// Fitness over the summed token counters
    pub log_fitness: f64,
}

impl TokenReplayLogFitness {
    /// Summarize replayed traces (an empty list yields zeros)
    pub fn from_results(results: &[TokenReplayTraceResult]) -> Self {
        if results.is_empty() {
            return Self {
                perc_fit_traces: 0.0,
                average_trace_fitness: 0.0,
                log_fitness: 0.0,
            };
        }
        let n = results.len() as f64;
        let fit = results.iter().filter(|r| r.trace_is_fit).count() as f64;
        Self {
            perc_fit_traces: 100.0 * fit / n,
            average_trace_fitness: results.iter().map(|r| r.trace_fitness).sum::<f64>() / n,
            log_fitness: TokenBasedReplayResult::from_traces(results).compute_fitness(),
        }
    }
}
