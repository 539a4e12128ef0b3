use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::marking::Marking;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Hash, Eq, PartialOrd, Ord)]
/// Place in a Petri net
pub struct Place {
    id: Uuid,
    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Place {
    /// Get the [`PlaceID`] of this place
    pub fn id(&self) -> PlaceID {
        PlaceID(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Hash, Eq, PartialOrd, Ord)]
/// Transition in a Petri net
pub struct Transition {
    /// Transition label (None if this transition is _invisible_)
    pub label: Option<String>,
    /// Optional human-readable name (used when describing alignment moves)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    id: Uuid,
}

impl Transition {
    /// Get the [`TransitionID`] of this transition
    pub fn id(&self) -> TransitionID {
        TransitionID(self.id)
    }

    /// Invisible (silent, tau) transitions do not have a label
    pub fn is_silent(&self) -> bool {
        self.label.is_none()
    }

    /// Name used when describing this transition (falls back to the UUID)
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "type", content = "nodes")]
/// Arc direction in a Petri net
pub enum ArcType {
    /// From Place to Transition
    PlaceTransition(Uuid, Uuid),
    /// From Transition to Place
    TransitionPlace(Uuid, Uuid),
}

impl ArcType {
    /// Create new from place to transition
    pub fn place_to_transition(from: PlaceID, to: TransitionID) -> ArcType {
        ArcType::PlaceTransition(from.0, to.0)
    }
    /// Create new from transition to place
    pub fn transition_to_place(from: TransitionID, to: PlaceID) -> ArcType {
        ArcType::TransitionPlace(from.0, to.0)
    }
}

#[derive(
    Debug, Default, Deserialize, Serialize, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
/// Kind of an [`Arc`]
///
/// Reset and inhibitor arcs always go from a place to a transition.
pub enum ArcKind {
    /// Consumes/produces `weight` tokens
    #[default]
    Normal,
    /// Clears the source place when the target transition fires
    Reset,
    /// Disables the target transition while the source place holds any token
    Inhibitor,
}

#[derive(Debug, Deserialize, Serialize, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
/// Arc in a Petri net
///
/// Connecting a transition and a place (or the other way around)
pub struct Arc {
    /// Source and target of Arc
    pub from_to: ArcType,
    /// Weight (i.e., how many tokens this arc moves)
    pub weight: u32,
    /// Normal, reset or inhibitor arc
    #[serde(default)]
    pub kind: ArcKind,
}

#[derive(
    Debug, PartialEq, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialOrd, Ord, JsonSchema,
)]
/// Place ID
pub struct PlaceID(pub Uuid);
impl PlaceID {
    /// Get UUID
    pub fn get_uuid(self) -> Uuid {
        self.0
    }
}
impl From<&Place> for PlaceID {
    fn from(value: &Place) -> Self {
        PlaceID(value.id)
    }
}

#[derive(
    Debug, PartialEq, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialOrd, Ord, JsonSchema,
)]
/// Transition ID
pub struct TransitionID(pub Uuid);

impl From<&Transition> for TransitionID {
    fn from(value: &Transition) -> Self {
        TransitionID(value.id)
    }
}
impl TransitionID {
    /// Get  UUID
    pub fn get_uuid(self) -> Uuid {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
/// Type of a [`PetriNet`], determined by the kinds of arcs it contains
pub enum NetType {
    /// Only normal arcs
    Classic,
    /// Normal and reset arcs
    Reset,
    /// Normal and inhibitor arcs
    Inhibitor,
    /// Normal, reset and inhibitor arcs
    ResetInhibitor,
}

impl NetType {
    /// Promote this net type so that it also supports arcs of the given kind
    pub fn with_arc_kind(self, kind: ArcKind) -> NetType {
        match (self, kind) {
            (t, ArcKind::Normal) => t,
            (NetType::Classic, ArcKind::Reset) | (NetType::Reset, ArcKind::Reset) => NetType::Reset,
            (NetType::Classic, ArcKind::Inhibitor) | (NetType::Inhibitor, ArcKind::Inhibitor) => {
                NetType::Inhibitor
            }
            _ => NetType::ResetInhibitor,
        }
    }

    /// Whether nets of this type may contain arcs of the given kind
    pub fn supports(self, kind: ArcKind) -> bool {
        self.with_arc_kind(kind) == self
    }
}

///
/// Errors for structurally invalid [`PetriNet`]s or [`Marking`]s
///
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PetriNetError {
    /// Arc references a place that is not part of the net
    #[error("arc references unknown place {0}")]
    UnknownPlace(Uuid),
    /// Arc references a transition that is not part of the net
    #[error("arc references unknown transition {0}")]
    UnknownTransition(Uuid),
    /// Arc has weight zero
    #[error("arc {0:?} has weight 0")]
    ZeroWeight(ArcType),
    /// Reset/inhibitor arc from a transition to a place
    #[error("{kind:?} arc must go from a place to a transition, got {from_to:?}")]
    MisdirectedArc {
        /// Kind of the offending arc
        kind: ArcKind,
        /// Endpoints of the offending arc
        from_to: ArcType,
    },
    /// Marking assigns tokens to a place that is not part of the net
    #[error("marking references unknown place {0}")]
    MarkingOutsideNet(Uuid),
}

/// Arcs of a single transition, split by their role during firing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionArcs {
    /// Normal input arcs (place, weight)
    pub inputs: Vec<(PlaceID, u32)>,
    /// Places cleared by reset arcs
    pub resets: Vec<PlaceID>,
    /// Places that must be empty (inhibitor arcs)
    pub inhibitors: Vec<PlaceID>,
    /// Output arcs (place, weight)
    pub outputs: Vec<(PlaceID, u32)>,
}

impl TransitionArcs {
    /// Number of tokens consumed through normal input arcs
    pub fn consumed_tokens(&self) -> u64 {
        self.inputs.iter().map(|(_, w)| *w as u64).sum()
    }

    /// Number of tokens produced through output arcs
    pub fn produced_tokens(&self) -> u64 {
        self.outputs.iter().map(|(_, w)| *w as u64).sum()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
///
/// A Petri net of [`Place`]s and [`Transition`]s
///
/// Bipartite graph of [`Place`]s and [`Transition`]s with [`Arc`]s connecting them, as well as initial and final [`Marking`]s
pub struct PetriNet {
    /// Places
    pub places: HashMap<Uuid, Place>,
    /// Transitions
    pub transitions: HashMap<Uuid, Transition>,
    /// Arcs
    pub arcs: Vec<Arc>,
    /// Initial marking
    pub initial_marking: Option<Marking>,
    /// Final markings (any of them are accepted as a final marking)
    pub final_markings: Option<Vec<Marking>>,
}

impl Default for PetriNet {
    fn default() -> Self {
        Self::new()
    }
}
impl PetriNet {
    /// Create new [`PetriNet`] with no places or transitions
    pub fn new() -> Self {
        Self {
            places: HashMap::new(),
            transitions: HashMap::new(),
            arcs: Vec::new(),
            initial_marking: None,
            final_markings: None,
        }
    }
    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
    /// Add a place (with an optional passed UUID)
    ///
    /// If no ID is passed, a new UUID will be generated.
    /// Adding a place with an already known UUID keeps the existing place.
    pub fn add_place(&mut self, place_id: Option<Uuid>) -> PlaceID {
        let place_id = place_id.unwrap_or(Uuid::new_v4());
        self.places
            .entry(place_id)
            .or_insert(Place {
                id: place_id,
                name: None,
            });
        PlaceID(place_id)
    }

    /// Add a place with a name (and a fresh UUID)
    pub fn add_named_place(&mut self, name: &str) -> PlaceID {
        let id = self.add_place(None);
        if let Some(p) = self.places.get_mut(&id.0) {
            p.name = Some(name.to_string());
        }
        id
    }

    /// Add a transition with an label (and with an optional passed UUID)
    ///
    /// If no ID is passed, a new UUID will be generated.
    /// Adding a transition with an already known UUID keeps the existing transition.
    pub fn add_transition(
        &mut self,
        label: Option<String>,
        transition_id: Option<Uuid>,
    ) -> TransitionID {
        let transition_id = transition_id.unwrap_or(Uuid::new_v4());
        self.transitions
            .entry(transition_id)
            .or_insert(Transition {
                id: transition_id,
                name: None,
                label,
            });
        TransitionID(transition_id)
    }

    /// Add a transition with a name and label (and a fresh UUID)
    pub fn add_named_transition(&mut self, name: &str, label: Option<&str>) -> TransitionID {
        let id = self.add_transition(label.map(|l| l.to_string()), None);
        if let Some(t) = self.transitions.get_mut(&id.0) {
            t.name = Some(name.to_string());
        }
        id
    }

    /// Add a normal arc
    ///
    /// Adding an arc that is already present (same endpoints and kind) has no effect.
    pub fn add_arc(&mut self, from_to: ArcType, weight: Option<u32>) {
        self.push_arc(from_to, weight.unwrap_or(1), ArcKind::Normal);
    }

    /// Add a reset arc, clearing `place` whenever `transition` fires
    ///
    /// Promotes the [`NetType`] of this net (see [`PetriNet::net_type`]).
    pub fn add_reset_arc(&mut self, place: PlaceID, transition: TransitionID) {
        self.push_arc(
            ArcType::place_to_transition(place, transition),
            1,
            ArcKind::Reset,
        );
    }

    /// Add an inhibitor arc, disabling `transition` while `place` holds tokens
    ///
    /// Promotes the [`NetType`] of this net (see [`PetriNet::net_type`]).
    pub fn add_inhibitor_arc(&mut self, place: PlaceID, transition: TransitionID) {
        self.push_arc(
            ArcType::place_to_transition(place, transition),
            1,
            ArcKind::Inhibitor,
        );
    }

    fn push_arc(&mut self, from_to: ArcType, weight: u32, kind: ArcKind) {
        if self
            .arcs
            .iter()
            .any(|a| a.from_to == from_to && a.kind == kind)
        {
            return;
        }
        self.arcs.push(Arc {
            from_to,
            weight,
            kind,
        });
    }

    /// Type of this net, promoted by every reset/inhibitor arc it contains
    pub fn net_type(&self) -> NetType {
        self.arcs
            .iter()
            .fold(NetType::Classic, |t, arc| t.with_arc_kind(arc.kind))
    }

    /// Get a transition by its ID
    pub fn transition(&self, t: TransitionID) -> Option<&Transition> {
        self.transitions.get(&t.0)
    }

    /// Label of a transition (None for invisible or unknown transitions)
    pub fn label_of(&self, t: TransitionID) -> Option<&str> {
        self.transition(t).and_then(|t| t.label.as_deref())
    }

    /// Transition IDs in a stable (sorted) order
    pub fn sorted_transition_ids(&self) -> Vec<TransitionID> {
        self.transitions.keys().sorted().map(|id| TransitionID(*id)).collect()
    }

    /// Place IDs in a stable (sorted) order
    pub fn sorted_place_ids(&self) -> Vec<PlaceID> {
        self.places.keys().sorted().map(|id| PlaceID(*id)).collect()
    }

    /// Get the preset of a [`PetriNet`] place
    pub fn preset_of_place(&self, p: PlaceID) -> Vec<TransitionID> {
        self.arcs
            .iter()
            .filter_map(|x: &Arc| match x.from_to {
                ArcType::TransitionPlace(from, to) if to == p.0 => Some(TransitionID(from)),
                _ => None,
            })
            .collect()
    }

    /// Get the preset of [`PetriNet`] transition (including reset and inhibitor sources)
    pub fn preset_of_transition(&self, t: TransitionID) -> Vec<PlaceID> {
        self.arcs
            .iter()
            .filter_map(|x: &Arc| match x.from_to {
                ArcType::PlaceTransition(from, to) if to == t.0 => Some(PlaceID(from)),
                _ => None,
            })
            .collect()
    }

    /// Get postset of [`PetriNet`] place referred to by passed id (including reset and inhibitor targets)
    pub fn postset_of_place(&self, p: PlaceID) -> Vec<TransitionID> {
        self.arcs
            .iter()
            .filter_map(|x: &Arc| match x.from_to {
                ArcType::PlaceTransition(from, to) if from == p.0 => Some(TransitionID(to)),
                _ => None,
            })
            .collect()
    }

    /// Get postset of [`PetriNet`] transition referred to by passed id
    pub fn postset_of_transition(&self, t: TransitionID) -> Vec<PlaceID> {
        self.arcs
            .iter()
            .filter_map(|x: &Arc| match x.from_to {
                ArcType::TransitionPlace(from, to) if from == t.0 => Some(PlaceID(to)),
                _ => None,
            })
            .collect()
    }

    /// Collect the arcs of a transition, grouped by their role during firing
    pub fn transition_arcs(&self, t: TransitionID) -> TransitionArcs {
        let mut ret = TransitionArcs::default();
        for arc in &self.arcs {
            match (arc.from_to.clone(), arc.kind) {
                (ArcType::PlaceTransition(p, to), ArcKind::Normal) if to == t.0 => {
                    ret.inputs.push((PlaceID(p), arc.weight))
                }
                (ArcType::PlaceTransition(p, to), ArcKind::Reset) if to == t.0 => {
                    ret.resets.push(PlaceID(p))
                }
                (ArcType::PlaceTransition(p, to), ArcKind::Inhibitor) if to == t.0 => {
                    ret.inhibitors.push(PlaceID(p))
                }
                (ArcType::TransitionPlace(from, p), _) if from == t.0 => {
                    ret.outputs.push((PlaceID(p), arc.weight))
                }
                _ => {}
            }
        }
        ret.inputs.sort();
        ret.resets.sort();
        ret.inhibitors.sort();
        ret.outputs.sort();
        ret
    }

    /// [`TransitionArcs`] for every transition of the net
    pub fn all_transition_arcs(&self) -> HashMap<TransitionID, TransitionArcs> {
        let mut ret: HashMap<TransitionID, TransitionArcs> = self
            .transitions
            .keys()
            .map(|id| (TransitionID(*id), TransitionArcs::default()))
            .collect();
        for arc in &self.arcs {
            match arc.from_to {
                ArcType::PlaceTransition(p, t) => {
                    if let Some(entry) = ret.get_mut(&TransitionID(t)) {
                        match arc.kind {
                            ArcKind::Normal => entry.inputs.push((PlaceID(p), arc.weight)),
                            ArcKind::Reset => entry.resets.push(PlaceID(p)),
                            ArcKind::Inhibitor => entry.inhibitors.push(PlaceID(p)),
                        }
                    }
                }
                ArcType::TransitionPlace(t, p) => {
                    if let Some(entry) = ret.get_mut(&TransitionID(t)) {
                        entry.outputs.push((PlaceID(p), arc.weight));
                    }
                }
            }
        }
        for entry in ret.values_mut() {
            entry.inputs.sort();
            entry.resets.sort();
            entry.inhibitors.sort();
            entry.outputs.sort();
        }
        ret
    }

    /// Initial marking and first final marking stored with the net (if both are set)
    pub fn accepting_markings(&self) -> Option<(&Marking, &Marking)> {
        let im = self.initial_marking.as_ref()?;
        let fm = self.final_markings.as_ref()?.first()?;
        Some((im, fm))
    }

    /// Map from visible labels to all transitions carrying them (sorted by ID)
    pub fn transitions_by_label(&self) -> HashMap<String, Vec<TransitionID>> {
        let mut ret: HashMap<String, Vec<TransitionID>> = HashMap::new();
        for t in self.transitions.values().sorted_by_key(|t| t.id) {
            if let Some(label) = &t.label {
                ret.entry(label.clone()).or_default().push(t.id());
            }
        }
        ret
    }

    /// Check structural invariants: arc endpoints exist and have matching node types,
    /// weights are positive and reset/inhibitor arcs go from places to transitions
    pub fn validate(&self) -> Result<(), PetriNetError> {
        for arc in &self.arcs {
            let (place, transition) = match arc.from_to {
                ArcType::PlaceTransition(p, t) => (p, t),
                ArcType::TransitionPlace(t, p) => {
                    if arc.kind != ArcKind::Normal {
                        return Err(PetriNetError::MisdirectedArc {
                            kind: arc.kind,
                            from_to: arc.from_to.clone(),
                        });
                    }
                    (p, t)
                }
            };
            if !self.places.contains_key(&place) {
                return Err(PetriNetError::UnknownPlace(place));
            }
            if !self.transitions.contains_key(&transition) {
                return Err(PetriNetError::UnknownTransition(transition));
            }
            if arc.weight == 0 {
                return Err(PetriNetError::ZeroWeight(arc.from_to.clone()));
            }
        }
        if let Some(im) = &self.initial_marking {
            self.validate_marking(im)?;
        }
        for fm in self.final_markings.iter().flatten() {
            self.validate_marking(fm)?;
        }
        Ok(())
    }

    /// Check that a marking only assigns tokens to places of this net
    pub fn validate_marking(&self, marking: &Marking) -> Result<(), PetriNetError> {
        match marking
            .places()
            .find(|p| !self.places.contains_key(&p.get_uuid()))
        {
            Some(p) => Err(PetriNetError::MarkingOutsideNet(p.get_uuid())),
            None => Ok(()),
        }
    }
}
