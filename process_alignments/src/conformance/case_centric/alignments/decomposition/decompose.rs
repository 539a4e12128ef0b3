use std::collections::{BTreeSet, HashMap, HashSet};

use itertools::Itertools;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Dfs;
use uuid::Uuid;

use crate::core::process_models::case_centric::petri_net::{
    ArcType, Marking, PetriNet, PlaceID, TransitionID,
};

///
/// A sub-net of a decomposed [`PetriNet`]
///
/// Places, transitions and arcs keep the IDs of the original net.
///
#[derive(Debug, Clone)]
pub struct SubNet {
    /// The sub-net itself
    pub net: PetriNet,
    /// Projection of the initial marking onto the places of the sub-net
    pub initial_marking: Marking,
    /// Projection of the final marking onto the places of the sub-net
    pub final_marking: Marking,
    /// Sorted visible labels of the sub-net
    pub lvis_labels: Vec<String>,
    /// Sorted transition IDs, identifying the sub-net in caches
    pub t_tuple: Vec<TransitionID>,
}

impl SubNet {
    ///
    /// Sub-net of `net` induced by `places` and `transitions`
    ///
    /// Transitions adjacent to any of the places are added as well. Arcs are copied if both
    /// endpoints are part of the sub-net.
    ///
    pub fn from_nodes(
        net: &PetriNet,
        initial_marking: &Marking,
        final_marking: &Marking,
        places: &BTreeSet<PlaceID>,
        transitions: &BTreeSet<TransitionID>,
    ) -> Self {
        let mut transitions = transitions.clone();
        for arc in &net.arcs {
            match arc.from_to {
                ArcType::PlaceTransition(p, t) | ArcType::TransitionPlace(t, p) => {
                    if places.contains(&PlaceID(p)) {
                        transitions.insert(TransitionID(t));
                    }
                }
            }
        }

        let mut sub = PetriNet::new();
        for p in places {
            if let Some(place) = net.places.get(&p.0) {
                sub.places.insert(p.0, place.clone());
            }
        }
        for t in &transitions {
            if let Some(transition) = net.transitions.get(&t.0) {
                sub.transitions.insert(t.0, transition.clone());
            }
        }
        sub.arcs = net
            .arcs
            .iter()
            .filter(|arc| match arc.from_to {
                ArcType::PlaceTransition(p, t) | ArcType::TransitionPlace(t, p) => {
                    sub.places.contains_key(&p) && sub.transitions.contains_key(&t)
                }
            })
            .cloned()
            .collect();

        let in_sub = |p: &PlaceID| sub.places.contains_key(&p.0);
        let initial_marking = initial_marking.project(in_sub);
        let final_marking = final_marking.project(in_sub);
        let lvis_labels = sub
            .transitions
            .values()
            .filter_map(|t| t.label.clone())
            .sorted()
            .dedup()
            .collect();
        let t_tuple = sub
            .transitions
            .keys()
            .map(|t| TransitionID(*t))
            .sorted()
            .collect();
        sub.initial_marking = Some(initial_marking.clone());
        sub.final_markings = Some(vec![final_marking.clone()]);
        Self {
            net: sub,
            initial_marking,
            final_marking,
            lvis_labels,
            t_tuple,
        }
    }

    /// Place IDs of this sub-net
    pub fn place_ids(&self) -> BTreeSet<PlaceID> {
        self.net.places.keys().map(|p| PlaceID(*p)).collect()
    }

    /// Whether `label` is a visible label of this sub-net
    pub fn has_label(&self, label: &str) -> bool {
        self.lvis_labels
            .binary_search_by(|l| l.as_str().cmp(label))
            .is_ok()
    }
}

///
/// Split a net into sub-nets that only share visible transitions with unique labels
///
/// Places, invisible transitions and transitions with duplicate labels are connected along the
/// arcs of the net; transitions with the same label are connected with each other. Every connected
/// component yields one [`SubNet`], as does every visible transition without arcs. Sub-nets are
/// ordered by their smallest node ID.
///
pub fn decompose(net: &PetriNet, initial_marking: &Marking, final_marking: &Marking) -> Vec<SubNet> {
    let label_counts = net
        .transitions
        .values()
        .filter_map(|t| t.label.as_deref())
        .counts();
    let is_node = |t: &Uuid| {
        net.transitions.get(t).is_some_and(|tr| match &tr.label {
            None => true,
            Some(l) => label_counts.get(l.as_str()).is_some_and(|c| *c > 1),
        })
    };

    let mut graph: UnGraph<Uuid, ()> = UnGraph::new_undirected();
    let mut index: HashMap<Uuid, NodeIndex> = HashMap::new();
    for p in net.places.keys().sorted() {
        index.insert(*p, graph.add_node(*p));
    }
    for t in net.transitions.keys().filter(|t| is_node(t)).sorted() {
        index.insert(*t, graph.add_node(*t));
    }
    for arc in &net.arcs {
        let (p, t) = match arc.from_to {
            ArcType::PlaceTransition(p, t) | ArcType::TransitionPlace(t, p) => (p, t),
        };
        if let (Some(pi), Some(ti)) = (index.get(&p), index.get(&t)) {
            graph.update_edge(*pi, *ti, ());
        }
    }
    for ids in net.transitions_by_label().into_values() {
        if ids.len() < 2 {
            continue;
        }
        for (a, b) in ids.iter().tuple_combinations() {
            if let (Some(ai), Some(bi)) = (index.get(&a.0), index.get(&b.0)) {
                graph.update_edge(*ai, *bi, ());
            }
        }
    }

    let mut seen = vec![false; graph.node_count()];
    let mut components: Vec<(BTreeSet<PlaceID>, BTreeSet<TransitionID>, Uuid)> = Vec::new();
    for start in graph.node_indices() {
        if seen[start.index()] {
            continue;
        }
        let mut places = BTreeSet::new();
        let mut transitions = BTreeSet::new();
        let mut min_id = graph[start];
        let mut dfs = Dfs::new(&graph, start);
        while let Some(n) = dfs.next(&graph) {
            seen[n.index()] = true;
            let id = graph[n];
            min_id = min_id.min(id);
            if net.places.contains_key(&id) {
                places.insert(PlaceID(id));
            } else {
                transitions.insert(TransitionID(id));
            }
        }
        components.push((places, transitions, min_id));
    }
    let adjacent: HashSet<Uuid> = net
        .arcs
        .iter()
        .map(|arc| match arc.from_to {
            ArcType::PlaceTransition(_, t) | ArcType::TransitionPlace(t, _) => t,
        })
        .collect();
    for t in net
        .transitions
        .keys()
        .filter(|t| !is_node(t) && !adjacent.contains(*t))
    {
        components.push((BTreeSet::new(), BTreeSet::from([TransitionID(*t)]), *t));
    }
    components.sort_by_key(|(_, _, min_id)| *min_id);
    components
        .into_iter()
        .map(|(places, transitions, _)| {
            SubNet::from_nodes(net, initial_marking, final_marking, &places, &transitions)
        })
        .collect()
}

///
/// Merge sub-nets into one, rebuilt from the original net
///
pub fn merge_subnets<'a, I: IntoIterator<Item = &'a SubNet>>(
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    subnets: I,
) -> SubNet {
    let mut places = BTreeSet::new();
    let mut transitions = BTreeSet::new();
    for s in subnets {
        places.extend(s.place_ids());
        transitions.extend(s.t_tuple.iter().copied());
    }
    SubNet::from_nodes(net, initial_marking, final_marking, &places, &transitions)
}
