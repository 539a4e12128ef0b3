use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::core::event_data::case_centric::constants::ACTIVITY_NAME;
use crate::core::event_data::case_centric::VariantIndex;
use crate::core::process_models::case_centric::petri_net::{PetriNet, TransitionID};

/// Cost of a log move or of a model move on a visible transition
pub const STD_MODEL_LOG_MOVE_COST: u64 = 10000;
/// Cost of a model move on an invisible transition
pub const STD_TAU_COST: u64 = 1;
/// Cost of a synchronous move
pub const STD_SYNC_COST: u64 = 0;

///
/// Order of queued states with equal `f` and equal `g`
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum TieBreak {
    /// Pop the state that was queued first
    #[default]
    EarlierInsertion,
    /// Pop the state that was queued last
    LaterInsertion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
/// Parameters for computing alignments
///
/// All fields have defaults, so `{}` is a valid JSON configuration.
pub struct AlignmentParameters {
    /// Event attribute holding the activity label
    pub activity_key: String,
    /// Cost of a log move per event position (defaults to [`STD_MODEL_LOG_MOVE_COST`] for every event)
    pub trace_cost_function: Option<Vec<u64>>,
    /// Cost of a model move per transition
    ///
    /// Transitions not listed cost [`STD_MODEL_LOG_MOVE_COST`] (visible) or [`STD_TAU_COST`] (invisible).
    pub model_cost_function: Option<HashMap<TransitionID, u64>>,
    /// Cost of a synchronous move per transition (defaults to [`STD_SYNC_COST`])
    pub sync_cost_function: Option<HashMap<TransitionID, u64>>,
    /// Time budget for a whole log (in seconds)
    pub max_align_time: Option<f64>,
    /// Time budget for a single trace (in seconds)
    pub max_align_time_trace: Option<f64>,
    /// Pre-computed variant grouping of the log
    pub variants_idx: Option<VariantIndex>,
    /// Pre-computed best-worst cost of the model
    pub best_worst_cost_internal: Option<u64>,
    /// Report progress through `tracing` at `info` level
    pub show_progress_bar: bool,
    /// Number of worker threads for log alignments (`None`: number of CPUs minus 2)
    pub cores: Option<usize>,
    /// Return moves as `((log name, model name), (log label, model label))` instead of label pairs
    pub ret_tuple_as_trans_desc: bool,
    /// Order of states with equal `f` and `g`
    pub tie_break: TieBreak,
    /// Refine the marking equation with a bounded branch-and-bound over integer solutions
    pub lp_integrality: bool,
}

impl Default for AlignmentParameters {
    fn default() -> Self {
        Self {
            activity_key: ACTIVITY_NAME.to_string(),
            trace_cost_function: None,
            model_cost_function: None,
            sync_cost_function: None,
            max_align_time: None,
            max_align_time_trace: None,
            variants_idx: None,
            best_worst_cost_internal: None,
            show_progress_bar: false,
            cores: None,
            ret_tuple_as_trans_desc: false,
            tie_break: TieBreak::default(),
            lp_integrality: false,
        }
    }
}

impl AlignmentParameters {
    /// Serialize parameters to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    /// Deserialize parameters from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Cost of a log move on the event at position `index`
    pub fn log_move_cost(&self, index: usize) -> u64 {
        self.trace_cost_function
            .as_ref()
            .and_then(|costs| costs.get(index).copied())
            .unwrap_or(STD_MODEL_LOG_MOVE_COST)
    }

    /// Cost of a model move on `t`
    pub fn model_move_cost(&self, net: &PetriNet, t: TransitionID) -> u64 {
        if let Some(c) = self
            .model_cost_function
            .as_ref()
            .and_then(|costs| costs.get(&t))
        {
            return *c;
        }
        match net.label_of(t) {
            Some(_) => STD_MODEL_LOG_MOVE_COST,
            None => STD_TAU_COST,
        }
    }

    /// Cost of a synchronous move on `t`
    pub fn sync_move_cost(&self, t: TransitionID) -> u64 {
        self.sync_cost_function
            .as_ref()
            .and_then(|costs| costs.get(&t).copied())
            .unwrap_or(STD_SYNC_COST)
    }

    /// Sum of log move costs of a trace with `len` events
    pub fn trace_best_worst_cost(&self, len: usize) -> u64 {
        (0..len).map(|i| self.log_move_cost(i)).sum()
    }

    /// Per-trace time budget
    pub fn trace_budget(&self) -> Option<Duration> {
        self.max_align_time_trace.and_then(seconds_to_duration)
    }

    /// Time budget for a whole log
    pub fn log_budget(&self) -> Option<Duration> {
        self.max_align_time.and_then(seconds_to_duration)
    }

    /// Number of worker threads to use for log alignments
    pub fn worker_count(&self) -> usize {
        self.cores.unwrap_or_else(default_cores).max(1)
    }

    /// Copy of these parameters for a projection of the trace onto the given event positions
    pub(crate) fn projected(&self, positions: &[usize]) -> Self {
        let mut ret = self.clone();
        ret.trace_cost_function = self
            .trace_cost_function
            .as_ref()
            .map(|_| positions.iter().map(|i| self.log_move_cost(*i)).collect());
        ret.variants_idx = None;
        ret.best_worst_cost_internal = None;
        ret
    }
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0)).ok()
}

/// Number of available CPUs minus 2 (at least 1)
pub fn default_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(2))
        .unwrap_or(1)
        .max(1)
}
