//! Firing semantics for classic, reset, inhibitor and reset/inhibitor Petri nets
use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::marking::Marking;
use super::petri_net_struct::{NetType, PetriNet, TransitionArcs, TransitionID};

///
/// Firing rule used to decide enabledness and execute transitions
///
/// [`Semantics::Classic`] ignores reset and inhibitor arcs entirely, the extensions only honor
/// their own arc kind.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum Semantics {
    /// Normal arcs only
    #[default]
    Classic,
    /// Reset arcs clear their source place on firing
    Reset,
    /// Inhibitor arcs disable their target while the source place is marked
    Inhibitor,
    /// Both extensions
    ResetInhibitor,
}

impl From<NetType> for Semantics {
    fn from(value: NetType) -> Self {
        match value {
            NetType::Classic => Semantics::Classic,
            NetType::Reset => Semantics::Reset,
            NetType::Inhibitor => Semantics::Inhibitor,
            NetType::ResetInhibitor => Semantics::ResetInhibitor,
        }
    }
}

impl Semantics {
    /// Semantics matching the arcs of the given net
    pub fn for_net(net: &PetriNet) -> Self {
        net.net_type().into()
    }

    fn honors_resets(self) -> bool {
        matches!(self, Semantics::Reset | Semantics::ResetInhibitor)
    }

    fn honors_inhibitors(self) -> bool {
        matches!(self, Semantics::Inhibitor | Semantics::ResetInhibitor)
    }

    /// Whether a transition with the given arcs is enabled in `marking`
    pub fn is_enabled_arcs(self, arcs: &TransitionArcs, marking: &Marking) -> bool {
        arcs.inputs
            .iter()
            .all(|(p, w)| marking.get(p) >= *w as u64)
            && (!self.honors_inhibitors() || arcs.inhibitors.iter().all(|p| !marking.contains(p)))
    }

    /// Fire a transition with the given arcs regardless of enabledness
    ///
    /// Consumes normal inputs (saturating at zero), clears reset places and then produces outputs.
    pub fn weak_execute_arcs(self, arcs: &TransitionArcs, marking: &Marking) -> Marking {
        let mut ret = marking.clone();
        for (p, w) in &arcs.inputs {
            ret.remove_tokens(*p, *w as u64);
        }
        if self.honors_resets() {
            for p in &arcs.resets {
                ret.set(*p, 0);
            }
        }
        for (p, w) in &arcs.outputs {
            ret.add_tokens(*p, *w as u64);
        }
        ret
    }

    /// Whether `t` is enabled in `marking`
    pub fn is_enabled(self, net: &PetriNet, t: TransitionID, marking: &Marking) -> bool {
        self.is_enabled_arcs(&net.transition_arcs(t), marking)
    }

    /// Fire `t` if enabled, returning the successor marking
    pub fn execute(self, net: &PetriNet, t: TransitionID, marking: &Marking) -> Option<Marking> {
        let arcs = net.transition_arcs(t);
        if self.is_enabled_arcs(&arcs, marking) {
            Some(self.weak_execute_arcs(&arcs, marking))
        } else {
            None
        }
    }

    /// Fire `t` without checking enabledness
    pub fn weak_execute(self, net: &PetriNet, t: TransitionID, marking: &Marking) -> Marking {
        self.weak_execute_arcs(&net.transition_arcs(t), marking)
    }

    /// All transitions enabled in `marking`, sorted by ID
    pub fn enabled_transitions(self, net: &PetriNet, marking: &Marking) -> Vec<TransitionID> {
        net.all_transition_arcs()
            .into_iter()
            .filter(|(_, arcs)| self.is_enabled_arcs(arcs, marking))
            .map(|(t, _)| t)
            .sorted()
            .collect()
    }
}
