use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::event_data::case_centric::constants::ACTIVITY_NAME;
use crate::core::event_data::case_centric::VariantIndex;

///
/// Parameters of token-based replay
///
/// Deserializing fills in defaults for all missing fields.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TokenReplayParameters {
    /// Event attribute holding the activity
    pub activity_key: String,
    /// Whether remaining tokens make a trace unfit
    pub consider_remaining_in_fitness: bool,
    /// Fire invisible transitions towards the final marking at the end of a trace
    pub try_to_reach_final_marking_through_hidden: bool,
    /// Abort the replay of a trace at its first problematic event
    pub stop_immediately_unfit: bool,
    /// Fire invisible transitions to enable the transition of an event
    pub walk_through_hidden_trans: bool,
    /// Reuse replays of trace suffixes starting in the same marking
    pub enable_postfix_cache: bool,
    /// Reuse the transitions fired for an activity in a marking
    pub enable_marktoact_cache: bool,
    /// Remove tokens that would flood an S-component after inserting missing tokens
    pub cleaning_token_flood: bool,
    /// Whether activities without transition make a trace unfit
    pub consider_activities_not_in_model_in_fitness: bool,
    /// Log progress while replaying a log
    pub show_progress_bar: bool,
    /// Worker threads for log replay (`None`: sequential with shared caches)
    pub cores: Option<usize>,
    /// Precomputed variants of the replayed log
    pub variants_idx: Option<VariantIndex>,
}

impl Default for TokenReplayParameters {
    fn default() -> Self {
        Self {
            activity_key: ACTIVITY_NAME.to_string(),
            consider_remaining_in_fitness: true,
            try_to_reach_final_marking_through_hidden: true,
            stop_immediately_unfit: false,
            walk_through_hidden_trans: true,
            enable_postfix_cache: false,
            enable_marktoact_cache: false,
            cleaning_token_flood: false,
            consider_activities_not_in_model_in_fitness: false,
            show_progress_bar: false,
            cores: None,
            variants_idx: None,
        }
    }
}

impl TokenReplayParameters {
    /// Serialize parameters to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    /// Deserialize parameters from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
