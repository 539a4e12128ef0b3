use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::trace;

use super::caches::{ActivityEntry, PostfixEntry, ReplayCaches};
use super::hidden::{
    paths_between, shortest_paths_by_hidden, HiddenPaths, MAX_REC_DEPTH_HIDTRANSENABL,
};
use super::parameters::TokenReplayParameters;
use super::result::{token_fitness, TokenReplayError, TokenReplayTraceResult};
use super::s_components::s_components;
use crate::core::process_models::case_centric::petri_net::{
    Marking, PetriNet, PlaceID, Semantics, TransitionArcs, TransitionID,
};

/// Passes over invisible paths towards the final marking
pub const MAX_IT_FINAL1: usize = 5;
/// Passes over invisible paths towards a single sink place
pub const MAX_IT_FINAL2: usize = 5;
/// Longest trace suffix stored in the postfix cache
pub const MAX_POSTFIX_SUFFIX_LENGTH: usize = 20;

#[derive(Debug)]
struct TraceState {
    marking: Marking,
    activated: Vec<TransitionID>,
    consumed: u64,
    produced: u64,
    missing: u64,
}

/// State right before replaying the trace suffix starting at `start`
#[derive(Debug)]
struct Snapshot {
    start: usize,
    marking: Marking,
    activated: usize,
    consumed: u64,
    produced: u64,
}

#[derive(Debug)]
struct Step {
    activity: String,
    start_marking: Marking,
    entry: ActivityEntry,
}

///
/// A [`PetriNet`] with its accepting markings, prepared for replaying many traces
///
/// Holds the arcs of all transitions, the transitions per label, the shortest paths over invisible
/// transitions between places and (if token flood cleaning is enabled) the S-components of the
/// net.
///
#[derive(Debug)]
pub struct ReplayModel<'a> {
    net: &'a PetriNet,
    initial_marking: Marking,
    final_marking: Marking,
    semantics: Semantics,
    arcs: HashMap<TransitionID, TransitionArcs>,
    by_label: HashMap<String, Vec<TransitionID>>,
    hidden_paths: HiddenPaths,
    s_components: Vec<BTreeSet<PlaceID>>,
}

impl<'a> ReplayModel<'a> {
    /// Prepare `net` for replay, failing on malformed nets or markings
    pub fn new(
        net: &'a PetriNet,
        initial_marking: &Marking,
        final_marking: &Marking,
        params: &TokenReplayParameters,
    ) -> Result<Self, TokenReplayError> {
        net.validate()?;
        net.validate_marking(initial_marking)?;
        net.validate_marking(final_marking)?;
        let arcs = net.all_transition_arcs();
        let hidden_paths = shortest_paths_by_hidden(net, &arcs);
        let s_components = if params.cleaning_token_flood {
            s_components(net, initial_marking, final_marking)
        } else {
            Vec::new()
        };
        Ok(Self {
            net,
            initial_marking: initial_marking.clone(),
            final_marking: final_marking.clone(),
            semantics: Semantics::for_net(net),
            arcs,
            by_label: net.transitions_by_label(),
            hidden_paths,
            s_components,
        })
    }

    /// The replayed net
    pub fn net(&self) -> &PetriNet {
        self.net
    }

    fn is_enabled(&self, t: TransitionID, marking: &Marking) -> bool {
        self.arcs
            .get(&t)
            .is_some_and(|a| self.semantics.is_enabled_arcs(a, marking))
    }

    fn fire(&self, t: TransitionID, state: &mut TraceState) {
        if let Some(a) = self.arcs.get(&t) {
            state.consumed += a.consumed_tokens();
            state.produced += a.produced_tokens();
            state.marking = self.semantics.weak_execute_arcs(a, &state.marking);
            state.activated.push(t);
        }
    }

    ///
    /// Transition for `label`, looking one activity ahead
    ///
    /// Among the enabled candidates, one whose firing enables a transition labelled `next` wins,
    /// then any enabled one. Without enabled candidates the one with smallest ID is returned.
    ///
    fn transition_for(
        &self,
        label: &str,
        next: Option<&str>,
        marking: &Marking,
    ) -> Option<TransitionID> {
        let candidates = self.by_label.get(label)?;
        let enabled: Vec<TransitionID> = candidates
            .iter()
            .copied()
            .filter(|t| self.is_enabled(*t, marking))
            .collect();
        let enables_next = |t: &&TransitionID| {
            let (Some(next), Some(arcs)) = (next, self.arcs.get(*t)) else {
                return false;
            };
            let after = self.semantics.weak_execute_arcs(arcs, marking);
            self.by_label
                .get(next)
                .is_some_and(|ts| ts.iter().any(|n| self.is_enabled(*n, &after)))
        };
        enabled
            .iter()
            .find(enables_next)
            .or(enabled.first())
            .or(candidates.first())
            .copied()
    }

    fn places_missing_tokens(&self, t: TransitionID, marking: &Marking) -> Vec<PlaceID> {
        self.arcs
            .get(&t)
            .map(|a| {
                a.inputs
                    .iter()
                    .filter(|(p, w)| marking.get(p) < *w as u64)
                    .map(|(p, _)| *p)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert the tokens `t` lacks on its input places, returning their number
    fn insert_missing_tokens(&self, t: TransitionID, marking: &mut Marking) -> u64 {
        let Some(a) = self.arcs.get(&t) else {
            return 0;
        };
        let mut missing = 0;
        for (p, w) in &a.inputs {
            let lacking = (*w as u64).saturating_sub(marking.get(p));
            marking.add_tokens(*p, lacking);
            missing += lacking;
        }
        missing
    }

    /// Fire the invisible paths round-robin until `t` is enabled or no path makes progress
    fn enable_through_paths(
        &self,
        t: TransitionID,
        state: &mut TraceState,
        paths: &[&Vec<TransitionID>],
    ) {
        let mut next = vec![0; paths.len()];
        loop {
            let mut progressed = false;
            for (z, path) in paths.iter().enumerate() {
                if self.is_enabled(t, &state.marking) {
                    return;
                }
                if let Some(&hidden) = path.get(next[z]) {
                    if self.is_enabled(hidden, &state.marking) {
                        self.fire(hidden, state);
                        next[z] += 1;
                        progressed = true;
                    }
                }
            }
            if !progressed {
                return;
            }
        }
    }

    /// Try to enable `t` by firing invisible transitions, recursing into blocked ones
    fn apply_hidden(
        &self,
        t: TransitionID,
        state: &mut TraceState,
        depth: usize,
        mut visited: HashSet<TransitionID>,
    ) {
        if depth >= MAX_REC_DEPTH_HIDTRANSENABL || !visited.insert(t) {
            return;
        }
        let targets = self.places_missing_tokens(t, &state.marking);
        let paths = paths_between(&self.hidden_paths, state.marking.places(), &targets);
        if paths.is_empty() {
            return;
        }
        self.enable_through_paths(t, state, &paths);
        if self.is_enabled(t, &state.marking) {
            return;
        }
        let paths = paths_between(&self.hidden_paths, state.marking.places(), &targets);
        for path in paths {
            for &hidden in path {
                if hidden == t {
                    continue;
                }
                if !visited.contains(&hidden) && !self.is_enabled(hidden, &state.marking) {
                    self.apply_hidden(hidden, state, depth + 1, visited.clone());
                }
                if self.is_enabled(hidden, &state.marking) {
                    self.fire(hidden, state);
                }
            }
        }
    }

    fn final_places_marked(&self, marking: &Marking) -> bool {
        self.final_marking.places().all(|p| marking.contains(p))
    }

    fn walk_to_final_marking(&self, state: &mut TraceState) {
        let final_places: Vec<PlaceID> = self.final_marking.places().copied().collect();
        for _ in 0..MAX_IT_FINAL1 {
            if self.final_places_marked(&state.marking) {
                return;
            }
            let paths = paths_between(&self.hidden_paths, state.marking.places(), &final_places);
            if paths.is_empty() {
                break;
            }
            for path in paths {
                for &hidden in path {
                    if self.is_enabled(hidden, &state.marking) {
                        self.fire(hidden, state);
                    }
                }
                if self.final_places_marked(&state.marking) {
                    return;
                }
            }
        }
        if final_places.len() != 1 || self.final_places_marked(&state.marking) {
            return;
        }
        let paths = paths_between(&self.hidden_paths, state.marking.places(), &final_places);
        for _ in 0..MAX_IT_FINAL2 {
            for path in &paths {
                for &hidden in path.iter() {
                    if !self.is_enabled(hidden, &state.marking) {
                        break;
                    }
                    self.fire(hidden, state);
                }
            }
        }
    }

    /// Drop tokens from places that share an S-component with a freshly marked place
    fn clean_token_flood(&self, state: &mut TraceState, old_places: &BTreeSet<PlaceID>) {
        let (kept, fresh): (Vec<PlaceID>, Vec<PlaceID>) = state
            .marking
            .places()
            .copied()
            .partition(|p| old_places.contains(p));
        for p1 in kept {
            let flooded = fresh.iter().any(|p2| {
                self.s_components
                    .iter()
                    .any(|c| c.contains(&p1) && c.contains(p2))
            });
            if flooded {
                trace!(place = ?p1, "cleaning token flood");
                state.marking.set(p1, 0);
            }
        }
    }

    /// Replay a single event; `false` aborts the trace
    fn replay_event(
        &self,
        activity: &str,
        next: Option<&str>,
        state: &mut TraceState,
        params: &TokenReplayParameters,
        problems: &mut Vec<TransitionID>,
    ) -> bool {
        let Some(t) = self.transition_for(activity, next, &state.marking) else {
            return true;
        };
        if params.walk_through_hidden_trans && !self.is_enabled(t, &state.marking) {
            self.apply_hidden(t, state, 0, HashSet::new());
        }
        let old_places: BTreeSet<PlaceID> = state.marking.places().copied().collect();
        let initially_enabled = self.is_enabled(t, &state.marking);
        if !initially_enabled {
            problems.push(t);
            if params.stop_immediately_unfit {
                state.missing += 1;
                return false;
            }
            state.missing += self.insert_missing_tokens(t, &mut state.marking);
        }
        self.fire(t, state);
        if !initially_enabled && params.cleaning_token_flood {
            self.clean_token_flood(state, &old_places);
        }
        true
    }

    ///
    /// Replay one trace, given as its activities
    ///
    /// Caches are consulted and filled according to `params`.
    ///
    pub fn replay<S: AsRef<str>>(
        &self,
        trace: &[S],
        params: &TokenReplayParameters,
        caches: &mut ReplayCaches,
    ) -> TokenReplayTraceResult {
        let trace: Vec<&str> = trace.iter().map(|a| a.as_ref()).collect();
        let suffix = |k: usize| trace[k..].iter().map(|a| a.to_string()).collect::<Vec<_>>();
        let mut state = TraceState {
            marking: self.initial_marking.clone(),
            activated: Vec::new(),
            consumed: 0,
            produced: 0,
            missing: 0,
        };
        let mut problems = Vec::new();
        let mut not_in_model: Vec<String> = Vec::new();
        let note_not_in_model = |act: &str, not_in_model: &mut Vec<String>| {
            if !self.by_label.contains_key(act) && !not_in_model.iter().any(|a| a == act) {
                not_in_model.push(act.to_string());
            }
        };
        let mut used_postfix = false;
        let mut snapshots: Vec<Snapshot> = Vec::new();
        let mut steps: Vec<Step> = Vec::new();

        for (i, act) in trace.iter().enumerate() {
            if params.enable_postfix_cache && trace.len() - i <= MAX_POSTFIX_SUFFIX_LENGTH {
                if let Some(hit) = caches.postfix.get(&(suffix(i), state.marking.clone())) {
                    state.activated.extend_from_slice(&hit.transitions);
                    state.marking = hit.final_marking.clone();
                    state.consumed += hit.consumed;
                    state.produced += hit.produced;
                    for a in &trace[i..] {
                        note_not_in_model(*a, &mut not_in_model);
                    }
                    used_postfix = true;
                    break;
                }
            }
            snapshots.push(Snapshot {
                start: i,
                marking: state.marking.clone(),
                activated: state.activated.len(),
                consumed: state.consumed,
                produced: state.produced,
            });

            if !self.by_label.contains_key(*act) {
                note_not_in_model(*act, &mut not_in_model);
                continue;
            }
            let previous = if i == 0 { "" } else { trace[i - 1] };
            let next = trace.get(i + 1).copied();
            let start_marking = state.marking.clone();
            let (start, c0, p0) = (state.activated.len(), state.consumed, state.produced);
            let cached = if params.enable_marktoact_cache {
                caches
                    .marking_to_activity
                    .get(&(start_marking.clone(), act.to_string()))
                    .filter(|e| {
                        e.previous_activity == previous
                            && e.next_activity.as_deref() == next
                    })
                    .cloned()
            } else {
                None
            };
            match cached {
                Some(entry) => {
                    state.activated.extend(entry.transitions);
                    state.marking = entry.end_marking;
                    state.consumed += entry.consumed;
                    state.produced += entry.produced;
                }
                None => {
                    if !self.replay_event(act, next, &mut state, params, &mut problems) {
                        break;
                    }
                }
            }
            steps.push(Step {
                activity: act.to_string(),
                start_marking,
                entry: ActivityEntry {
                    previous_activity: previous.to_string(),
                    next_activity: next.map(str::to_string),
                    transitions: state.activated[start..].to_vec(),
                    end_marking: state.marking.clone(),
                    consumed: state.consumed - c0,
                    produced: state.produced - p0,
                },
            });
        }

        if params.try_to_reach_final_marking_through_hidden && !used_postfix {
            self.walk_to_final_marking(&mut state);
        }

        let reached = state.marking.clone();
        let remaining: u64 = reached
            .iter()
            .map(|(p, c)| c.saturating_sub(self.final_marking.get(p)))
            .sum();
        let final_missing: u64 = self
            .final_marking
            .iter()
            .map(|(p, c)| c.saturating_sub(reached.get(p)))
            .sum();
        let missing = state.missing + final_missing;
        let consumed = state.consumed + self.final_marking.total_tokens();
        let produced = state.produced + self.initial_marking.total_tokens();
        let trace_is_fit = missing == 0
            && (!params.consider_remaining_in_fitness || remaining == 0)
            && !(params.consider_activities_not_in_model_in_fitness && !not_in_model.is_empty());

        if trace_is_fit {
            if params.enable_postfix_cache {
                for s in &snapshots {
                    if trace.len() - s.start > MAX_POSTFIX_SUFFIX_LENGTH {
                        continue;
                    }
                    caches
                        .postfix
                        .entry((suffix(s.start), s.marking.clone()))
                        .or_insert_with(|| PostfixEntry {
                            transitions: state.activated[s.activated..].to_vec(),
                            final_marking: reached.clone(),
                            consumed: state.consumed - s.consumed,
                            produced: state.produced - s.produced,
                        });
                }
            }
            if params.enable_marktoact_cache {
                for step in steps {
                    caches
                        .marking_to_activity
                        .entry((step.start_marking, step.activity))
                        .or_insert(step.entry);
                }
            }
        }

        let mut enabled: Vec<TransitionID> = self
            .arcs
            .iter()
            .filter(|(_, a)| self.semantics.is_enabled_arcs(a, &reached))
            .map(|(t, _)| *t)
            .collect();
        enabled.sort();
        TokenReplayTraceResult {
            trace_is_fit,
            trace_fitness: token_fitness(missing, consumed, remaining, produced),
            activated_transitions: state.activated,
            reached_marking: reached,
            enabled_transitions_in_marking: enabled,
            transitions_with_problems: problems,
            missing_tokens: missing,
            consumed_tokens: consumed,
            remaining_tokens: remaining,
            produced_tokens: produced,
            activities_not_in_model: not_in_model,
        }
    }
}
