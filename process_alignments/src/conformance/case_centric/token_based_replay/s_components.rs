//! S-components used for cleaning token floods
use std::collections::BTreeSet;

use crate::core::process_models::case_centric::petri_net::{
    Marking, PetriNet, PlaceID, TransitionID,
};

/// Maximal recursion depth when splitting S-components at branching transitions
pub const MAX_S_COMPONENT_DEPTH: usize = 6;

///
/// Approximate S-components of a net with one initial and one final place
///
/// Starting from the initial place, places are collected along the postsets of their
/// transitions. A transition with several unvisited output places splits the component.
/// Nets with more than one marked place in either marking have no S-components.
///
pub(crate) fn s_components(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
) -> Vec<BTreeSet<PlaceID>> {
    if initial_marking.len() != 1 || final_marking.len() != 1 {
        return Vec::new();
    }
    let Some(source) = initial_marking.places().next() else {
        return Vec::new();
    };
    let mut found = Vec::new();
    explore(net, vec![*source], 0, 0, &mut found);
    found
}

fn out_degree_of_place(net: &PetriNet, p: PlaceID) -> usize {
    net.postset_of_place(p).len()
}

fn out_degree_of_transition(net: &PetriNet, t: TransitionID) -> usize {
    net.postset_of_transition(t).len()
}

fn explore(
    net: &PetriNet,
    mut component: Vec<PlaceID>,
    mut visited: usize,
    depth: usize,
    found: &mut Vec<BTreeSet<PlaceID>>,
) {
    let mut changed = true;
    while changed && depth < MAX_S_COMPONENT_DEPTH {
        changed = false;
        let mut to_visit: Vec<PlaceID> = component[visited..].to_vec();
        to_visit.sort_by_key(|p| (std::cmp::Reverse(out_degree_of_place(net, *p)), *p));
        for place in to_visit {
            visited += 1;
            let mut targets = net.postset_of_place(place);
            targets.sort_by_key(|t| (out_degree_of_transition(net, *t), *t));
            for t in targets {
                let mut next: Vec<PlaceID> = net
                    .postset_of_transition(t)
                    .into_iter()
                    .filter(|p| !component.contains(p))
                    .collect();
                next.sort();
                next.dedup();
                match next.len() {
                    0 => {}
                    1 => {
                        component.push(next[0]);
                        changed = true;
                    }
                    _ => {
                        for p in next {
                            let mut branch = component.clone();
                            branch.push(p);
                            explore(net, branch, visited, depth + 1, found);
                        }
                        changed = true;
                    }
                }
            }
        }
    }
    let places: BTreeSet<PlaceID> = component.into_iter().collect();
    if !found.contains(&places) {
        found.push(places);
    }
}
