//! Trace nets and their synchronous product with a process model
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

use super::error::AlignmentError;
use super::moves::{Move, MoveKind, SKIP};
use super::parameters::AlignmentParameters;
use crate::core::process_models::case_centric::petri_net::{
    Marking, PetriNet, PlaceID, Semantics, TransitionID,
};

/// Dense marking of a [`SynchronousProduct`] (token count per place index)
pub type DenseMarking = Box<[u32]>;

///
/// Transition of a [`SynchronousProduct`]
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpnTransition {
    /// Kind of move this transition represents
    pub kind: MoveKind,
    /// Position of the trace event (log and sync moves)
    pub event: Option<usize>,
    /// Underlying model transition (model, silent and sync moves)
    pub model_transition: Option<TransitionID>,
    /// `(log name, model name)`, unique within the product
    pub name: (String, String),
    /// `(log label, model label)`
    pub label: (String, Option<String>),
    /// Cost of firing
    pub cost: u64,
    /// Consumed tokens (place index, weight)
    pub inputs: Vec<(usize, u32)>,
    /// Produced tokens (place index, weight)
    pub outputs: Vec<(usize, u32)>,
    /// Places cleared on firing
    pub resets: Vec<usize>,
    /// Places that must be empty for firing
    pub inhibitors: Vec<usize>,
}

impl SpnTransition {
    /// Convert to an alignment [`Move`]
    pub fn to_move(&self) -> Move {
        Move {
            kind: self.kind,
            event: self.event,
            transition: self.model_transition,
            log_name: self.name.0.clone(),
            model_name: self.name.1.clone(),
            log_label: self.label.0.clone(),
            model_label: self.label.1.clone(),
            cost: self.cost,
        }
    }
}

///
/// Synchronous product of a trace net and a model net
///
/// Places `0..model_places.len()` are the model places (sorted by ID), followed by the trace
/// places `p_0 .. p_n`. The incidence matrix and cost vector are built once on construction.
///
#[derive(Debug, Clone)]
pub struct SynchronousProduct {
    /// Model places in index order
    pub model_places: Vec<PlaceID>,
    /// Number of trace places (trace length + 1)
    pub trace_places: usize,
    /// Transitions in a stable order
    pub transitions: Vec<SpnTransition>,
    /// Initial marking (model initial marking plus `p_0`)
    pub initial_marking: DenseMarking,
    /// Final marking (model final marking plus `p_n`)
    pub final_marking: DenseMarking,
    /// Semantics of the model net, applied to the product
    pub semantics: Semantics,
    incidence: DMatrix<f64>,
    costs: DVector<f64>,
}

/// Name of the trace net transition for the event at `index`
pub fn trace_transition_name(activity: &str, index: usize) -> String {
    format!("t_{}_{}", activity, index)
}

fn dense_marking(
    marking: &Marking,
    place_index: &HashMap<PlaceID, usize>,
    size: usize,
) -> Result<Vec<u32>, AlignmentError> {
    let mut ret = vec![0u32; size];
    for (p, c) in marking.iter() {
        let i = place_index.get(p).ok_or_else(|| {
            AlignmentError::InvalidInput(format!("marking references unknown place {}", p.0))
        })?;
        ret[*i] = u32::try_from(*c).map_err(|_| {
            AlignmentError::InvalidInput(format!("too many tokens in place {}", p.0))
        })?;
    }
    Ok(ret)
}

impl SynchronousProduct {
    ///
    /// Build the synchronous product of `trace` (activity labels) and `net`
    ///
    /// Costs are taken from `params` (see [`AlignmentParameters::log_move_cost`] and friends).
    ///
    pub fn build<S: AsRef<str>>(
        net: &PetriNet,
        initial_marking: &Marking,
        final_marking: &Marking,
        trace: &[S],
        params: &AlignmentParameters,
    ) -> Result<Self, AlignmentError> {
        net.validate()?;
        let model_places = net.sorted_place_ids();
        let place_index: HashMap<PlaceID, usize> = model_places
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, i))
            .collect();
        let n_model = model_places.len();
        let trace_places = trace.len() + 1;
        let size = n_model + trace_places;

        let mut im = dense_marking(initial_marking, &place_index, size)?;
        let mut fm = dense_marking(final_marking, &place_index, size)?;
        im[n_model] += 1;
        fm[n_model + trace.len()] += 1;

        let arcs = net.all_transition_arcs();
        let model_side = |t: TransitionID| {
            let a = &arcs[&t];
            (
                a.inputs
                    .iter()
                    .map(|(p, w)| (place_index[p], *w))
                    .collect_vec(),
                a.outputs
                    .iter()
                    .map(|(p, w)| (place_index[p], *w))
                    .collect_vec(),
                a.resets.iter().map(|p| place_index[p]).collect_vec(),
                a.inhibitors.iter().map(|p| place_index[p]).collect_vec(),
            )
        };

        let mut transitions: Vec<SpnTransition> = Vec::new();
        let model_transitions = net.sorted_transition_ids();

        for (i, act) in trace.iter().enumerate() {
            let act = act.as_ref();
            transitions.push(SpnTransition {
                kind: MoveKind::Log,
                event: Some(i),
                model_transition: None,
                name: (trace_transition_name(act, i), SKIP.to_string()),
                label: (act.to_string(), Some(SKIP.to_string())),
                cost: params.log_move_cost(i),
                inputs: vec![(n_model + i, 1)],
                outputs: vec![(n_model + i + 1, 1)],
                resets: Vec::new(),
                inhibitors: Vec::new(),
            });
        }

        for t in &model_transitions {
            let transition = &net.transitions[&t.0];
            let (inputs, outputs, resets, inhibitors) = model_side(*t);
            let kind = if transition.is_silent() {
                MoveKind::Silent
            } else {
                MoveKind::Model
            };
            transitions.push(SpnTransition {
                kind,
                event: None,
                model_transition: Some(*t),
                name: (SKIP.to_string(), transition.display_name()),
                label: (SKIP.to_string(), transition.label.clone()),
                cost: params.model_move_cost(net, *t),
                inputs,
                outputs,
                resets,
                inhibitors,
            });
        }

        for (i, act) in trace.iter().enumerate() {
            let act = act.as_ref();
            for t in &model_transitions {
                let transition = &net.transitions[&t.0];
                if transition.label.as_deref() != Some(act) {
                    continue;
                }
                let (mut inputs, mut outputs, resets, inhibitors) = model_side(*t);
                inputs.push((n_model + i, 1));
                outputs.push((n_model + i + 1, 1));
                transitions.push(SpnTransition {
                    kind: MoveKind::Sync,
                    event: Some(i),
                    model_transition: Some(*t),
                    name: (trace_transition_name(act, i), transition.display_name()),
                    label: (act.to_string(), Some(act.to_string())),
                    cost: params.sync_move_cost(*t),
                    inputs,
                    outputs,
                    resets,
                    inhibitors,
                });
            }
        }

        let mut incidence = DMatrix::<f64>::zeros(size, transitions.len());
        for (j, t) in transitions.iter().enumerate() {
            for (p, w) in &t.inputs {
                incidence[(*p, j)] -= *w as f64;
            }
            for (p, w) in &t.outputs {
                incidence[(*p, j)] += *w as f64;
            }
        }
        let costs = DVector::from_iterator(
            transitions.len(),
            transitions.iter().map(|t| t.cost as f64),
        );

        Ok(Self {
            model_places,
            trace_places,
            transitions,
            initial_marking: im.into_boxed_slice(),
            final_marking: fm.into_boxed_slice(),
            semantics: Semantics::for_net(net),
            incidence,
            costs,
        })
    }

    /// Number of places (model and trace)
    pub fn place_count(&self) -> usize {
        self.model_places.len() + self.trace_places
    }

    /// Incidence matrix (places x transitions), `post - pre` over normal arcs
    pub fn incidence_matrix(&self) -> &DMatrix<f64> {
        &self.incidence
    }

    /// Pre-incidence matrix (tokens consumed per place and transition)
    pub fn pre_incidence_matrix(&self) -> DMatrix<f64> {
        let mut ret = DMatrix::<f64>::zeros(self.place_count(), self.transitions.len());
        for (j, t) in self.transitions.iter().enumerate() {
            for (p, w) in &t.inputs {
                ret[(*p, j)] += *w as f64;
            }
        }
        ret
    }

    /// Post-incidence matrix (tokens produced per place and transition)
    pub fn post_incidence_matrix(&self) -> DMatrix<f64> {
        &self.incidence + self.pre_incidence_matrix()
    }

    /// Cost per transition
    pub fn cost_vector(&self) -> &DVector<f64> {
        &self.costs
    }

    /// Whether transition `t` is enabled in `marking`
    pub fn is_enabled(&self, t: usize, marking: &[u32]) -> bool {
        let tr = &self.transitions[t];
        let honors_inhibitors = matches!(
            self.semantics,
            Semantics::Inhibitor | Semantics::ResetInhibitor
        );
        tr.inputs.iter().all(|(p, w)| marking[*p] >= *w)
            && (!honors_inhibitors || tr.inhibitors.iter().all(|p| marking[*p] == 0))
    }

    /// Fire transition `t` (without checking enabledness)
    pub fn fire(&self, t: usize, marking: &[u32]) -> DenseMarking {
        let tr = &self.transitions[t];
        let mut ret: DenseMarking = marking.into();
        for (p, w) in &tr.inputs {
            ret[*p] = ret[*p].saturating_sub(*w);
        }
        if matches!(self.semantics, Semantics::Reset | Semantics::ResetInhibitor) {
            for p in &tr.resets {
                ret[*p] = 0;
            }
        }
        for (p, w) in &tr.outputs {
            ret[*p] = ret[*p].saturating_add(*w);
        }
        ret
    }

    /// Transitions enabled in `marking`, in index order
    pub fn enabled_transitions(&self, marking: &[u32]) -> Vec<usize> {
        (0..self.transitions.len())
            .filter(|t| self.is_enabled(*t, marking))
            .collect()
    }

    /// Convert a dense marking back to a model [`Marking`] and the index of the marked trace place
    pub fn split_marking(&self, marking: &[u32]) -> (Marking, Option<usize>) {
        let n_model = self.model_places.len();
        let model: Marking = self
            .model_places
            .iter()
            .zip(marking.iter())
            .map(|(p, c)| (*p, *c as u64))
            .collect();
        let trace_pos = marking[n_model..].iter().position(|c| *c > 0);
        (model, trace_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process_models::case_centric::petri_net::ArcType;

    fn sequence_net() -> (PetriNet, Marking, Marking) {
        let mut net = PetriNet::new();
        let p0 = net.add_place(None);
        let p1 = net.add_place(None);
        let p2 = net.add_place(None);
        let a = net.add_named_transition("A", Some("A"));
        let b = net.add_named_transition("B", Some("B"));
        net.add_arc(ArcType::place_to_transition(p0, a), None);
        net.add_arc(ArcType::transition_to_place(a, p1), None);
        net.add_arc(ArcType::place_to_transition(p1, b), None);
        net.add_arc(ArcType::transition_to_place(b, p2), None);
        let im: Marking = [(p0, 1)].into_iter().collect();
        let fm: Marking = [(p2, 1)].into_iter().collect();
        (net, im, fm)
    }

    #[test]
    fn product_shape() {
        let (net, im, fm) = sequence_net();
        let spn = SynchronousProduct::build(
            &net,
            &im,
            &fm,
            &["A", "X", "B"],
            &AlignmentParameters::default(),
        )
        .unwrap();
        assert_eq!(spn.place_count(), 3 + 4);
        let count = |k: MoveKind| spn.transitions.iter().filter(|t| t.kind == k).count();
        assert_eq!(count(MoveKind::Log), 3);
        assert_eq!(count(MoveKind::Model), 2);
        assert_eq!(count(MoveKind::Sync), 2);
        assert_eq!(spn.initial_marking.iter().sum::<u32>(), 2);
        assert_eq!(spn.final_marking[spn.place_count() - 1], 1);

        let names: std::collections::HashSet<_> =
            spn.transitions.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names.len(), spn.transitions.len());

        let sync_a = spn
            .transitions
            .iter()
            .find(|t| t.kind == MoveKind::Sync && t.label.0 == "A")
            .unwrap();
        assert_eq!(sync_a.cost, 0);
        assert_eq!(sync_a.name.0, "t_A_0");
        assert_eq!(sync_a.inputs.len(), 2);
    }

    #[test]
    fn incidence_matches_firing() {
        let (net, im, fm) = sequence_net();
        let spn =
            SynchronousProduct::build(&net, &im, &fm, &["A"], &AlignmentParameters::default())
                .unwrap();
        let c = spn.incidence_matrix();
        for t in spn.enabled_transitions(&spn.initial_marking) {
            let next = spn.fire(t, &spn.initial_marking);
            for p in 0..spn.place_count() {
                let delta = next[p] as f64 - spn.initial_marking[p] as f64;
                assert_eq!(delta, c[(p, t)]);
            }
        }
        assert_eq!(
            spn.post_incidence_matrix() - spn.pre_incidence_matrix(),
            c.clone()
        );
    }

    #[test]
    fn marking_outside_net_is_rejected() {
        let (net, im, _) = sequence_net();
        let foreign: Marking = [(PlaceID(uuid::Uuid::new_v4()), 1)].into_iter().collect();
        let err = SynchronousProduct::build(
            &net,
            &im,
            &foreign,
            &["A"],
            &AlignmentParameters::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AlignmentError::InvalidInput(_)));
    }
}
