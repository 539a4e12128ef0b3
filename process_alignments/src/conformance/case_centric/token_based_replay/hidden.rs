//! Paths over invisible transitions
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::core::process_models::case_centric::petri_net::{
    PetriNet, PlaceID, TransitionArcs, TransitionID,
};

/// Maximal number of invisible transitions on a path between two places
pub const MAX_REC_DEPTH: usize = 50;
/// Maximal recursion depth when enabling a transition through invisible transitions
pub const MAX_REC_DEPTH_HIDTRANSENABL: usize = 5;

/// For each place: shortest sequence of invisible transitions leading to every other place
pub(crate) type HiddenPaths = HashMap<PlaceID, BTreeMap<PlaceID, Vec<TransitionID>>>;

pub(crate) fn shortest_paths_by_hidden(
    net: &PetriNet,
    arcs: &HashMap<TransitionID, TransitionArcs>,
) -> HiddenPaths {
    let mut successors: HashMap<PlaceID, Vec<(TransitionID, Vec<PlaceID>)>> = HashMap::new();
    for t in net.sorted_transition_ids() {
        if net.label_of(t).is_some() {
            continue;
        }
        let Some(a) = arcs.get(&t) else {
            continue;
        };
        let outputs: Vec<PlaceID> = a.outputs.iter().map(|(p, _)| *p).collect();
        for (p, _) in &a.inputs {
            successors
                .entry(*p)
                .or_default()
                .push((t, outputs.clone()));
        }
    }

    let mut ret = HiddenPaths::new();
    for source in net.sorted_place_ids() {
        let mut reached: BTreeMap<PlaceID, Vec<TransitionID>> = BTreeMap::new();
        let mut seen: HashSet<PlaceID> = HashSet::from([source]);
        let mut queue: VecDeque<(PlaceID, Vec<TransitionID>)> = VecDeque::from([(source, vec![])]);
        while let Some((place, path)) = queue.pop_front() {
            if path.len() >= MAX_REC_DEPTH {
                continue;
            }
            for (t, outputs) in successors.get(&place).into_iter().flatten() {
                for next in outputs {
                    if seen.insert(*next) {
                        let mut next_path = path.clone();
                        next_path.push(*t);
                        reached.insert(*next, next_path.clone());
                        queue.push_back((*next, next_path));
                    }
                }
            }
        }
        if !reached.is_empty() {
            ret.insert(source, reached);
        }
    }
    ret
}

/// Paths from any of `from` to any of `to`, shortest first
pub(crate) fn paths_between<'a, 'b>(
    paths: &'a HiddenPaths,
    from: impl Iterator<Item = &'b PlaceID>,
    to: &[PlaceID],
) -> Vec<&'a Vec<TransitionID>> {
    let mut ret: Vec<&Vec<TransitionID>> = Vec::new();
    for p1 in from {
        let Some(reachable) = paths.get(p1) else {
            continue;
        };
        for p2 in to {
            if let Some(path) = reachable.get(p2) {
                ret.push(path);
            }
        }
    }
    ret.sort_by_key(|p| p.len());
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process_models::case_centric::petri_net::ArcType;

    #[test]
    fn shortest_paths_only_use_invisible_transitions() {
        let mut net = PetriNet::new();
        let p: Vec<PlaceID> = (0..4).map(|_| net.add_place(None)).collect();
        let tau1 = net.add_named_transition("tau1", None);
        let tau2 = net.add_named_transition("tau2", None);
        let tau3 = net.add_named_transition("tau3", None);
        let a = net.add_named_transition("a", Some("a"));
        net.add_arc(ArcType::place_to_transition(p[0], tau1), None);
        net.add_arc(ArcType::transition_to_place(tau1, p[1]), None);
        net.add_arc(ArcType::place_to_transition(p[1], tau2), None);
        net.add_arc(ArcType::transition_to_place(tau2, p[2]), None);
        net.add_arc(ArcType::place_to_transition(p[0], tau3), None);
        net.add_arc(ArcType::transition_to_place(tau3, p[2]), None);
        net.add_arc(ArcType::place_to_transition(p[2], a), None);
        net.add_arc(ArcType::transition_to_place(a, p[3]), None);

        let paths = shortest_paths_by_hidden(&net, &net.all_transition_arcs());
        assert_eq!(paths[&p[0]][&p[1]], vec![tau1]);
        assert_eq!(paths[&p[0]][&p[2]], vec![tau3]);
        assert_eq!(paths[&p[1]][&p[2]], vec![tau2]);
        assert!(!paths[&p[0]].contains_key(&p[3]));
        assert!(!paths.contains_key(&p[2]));

        let found = paths_between(&paths, [p[0], p[1]].iter(), &[p[2]]);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|path| path.len() == 1));
    }
}
