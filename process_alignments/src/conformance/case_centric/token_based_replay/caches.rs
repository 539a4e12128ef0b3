use std::collections::HashMap;

use crate::core::process_models::case_centric::petri_net::{Marking, TransitionID};

/// Replay of a trace suffix from some marking until the end of a fitting trace
#[derive(Debug, Clone)]
pub(crate) struct PostfixEntry {
    pub(crate) transitions: Vec<TransitionID>,
    pub(crate) final_marking: Marking,
    pub(crate) consumed: u64,
    pub(crate) produced: u64,
}

/// Replay of a single activity from some marking in a fitting trace
#[derive(Debug, Clone)]
pub(crate) struct ActivityEntry {
    pub(crate) previous_activity: String,
    pub(crate) next_activity: Option<String>,
    pub(crate) transitions: Vec<TransitionID>,
    pub(crate) end_marking: Marking,
    pub(crate) consumed: u64,
    pub(crate) produced: u64,
}

///
/// Caches shared by the replays of several traces on the same net
///
/// Only fitting traces populate the caches. A set of caches must not be reused across nets or
/// parameter sets.
///
#[derive(Debug, Clone, Default)]
pub struct ReplayCaches {
    pub(crate) postfix: HashMap<(Vec<String>, Marking), PostfixEntry>,
    pub(crate) marking_to_activity: HashMap<(Marking, String), ActivityEntry>,
}

impl ReplayCaches {
    /// Empty caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached trace suffixes
    pub fn postfix_entries(&self) -> usize {
        self.postfix.len()
    }

    /// Number of cached (marking, activity) replays
    pub fn marking_to_activity_entries(&self) -> usize {
        self.marking_to_activity.len()
    }

    /// Drop all cached entries
    pub fn clear(&mut self) {
        self.postfix.clear();
        self.marking_to_activity.clear();
    }
}
