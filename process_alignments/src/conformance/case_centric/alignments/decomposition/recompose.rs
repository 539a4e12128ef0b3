use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::conformance::case_centric::alignments::moves::Move;
use crate::core::process_models::case_centric::petri_net::TransitionID;

///
/// Alignment of one shard, lifted to the positions of the full trace
///
/// `events` and `transitions` are what the shard shares with others: every move on one of them
/// has to be taken together by all shards owning it.
///
#[derive(Debug, Clone, Default)]
pub struct ShardMoves {
    /// Moves of the shard alignment
    pub moves: Vec<Move>,
    /// Trace positions projected onto the shard
    pub events: BTreeSet<usize>,
    /// Transitions of the shard
    pub transitions: BTreeSet<TransitionID>,
}

///
/// Shard alignments that cannot be interleaved into one alignment
///
/// `shards` lists the shards still holding moves when stitching got stuck, together with the
/// shards their next moves wait for.
///
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("alignments of shards {shards:?} cannot be interleaved")]
pub struct StitchConflict {
    /// Indices of the blocked shards (ascending)
    pub shards: Vec<usize>,
}

fn min_event(moves: &[Move]) -> usize {
    moves
        .iter()
        .filter_map(|m| m.event)
        .min()
        .unwrap_or(usize::MAX)
}

///
/// Order in which ready shards are preferred
///
/// Shard `j` follows shard `i` if the last move of `i` equals the first move of `j`. Shards
/// without predecessor come first (ordered by their earliest event), followed by their
/// successors breadth-first. Shards left over are ordered by a pairwise-swap pass over the
/// successor relation.
///
fn priority(shards: &[ShardMoves]) -> Vec<usize> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<(NodeIndex, &[Move])> = shards
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.moves.is_empty())
        .map(|(i, s)| (graph.add_node(i), s.moves.as_slice()))
        .collect();
    for (a, moves_a) in &nodes {
        for (b, moves_b) in &nodes {
            if a == b {
                continue;
            }
            if let (Some(last), Some(first)) = (moves_a.last(), moves_b.first()) {
                if last.key() == first.key() {
                    graph.add_edge(*a, *b, ());
                }
            }
        }
    }
    let moves_of: HashMap<NodeIndex, &[Move]> = nodes.iter().copied().collect();
    let sort_key = |n: &NodeIndex| (min_event(moves_of[n]), graph[*n]);

    let mut entries: Vec<NodeIndex> = nodes
        .iter()
        .map(|(n, _)| *n)
        .filter(|n| {
            graph
                .neighbors_directed(*n, Direction::Incoming)
                .next()
                .is_none()
        })
        .collect();
    entries.sort_by_key(sort_key);

    let mut order: Vec<usize> = Vec::with_capacity(shards.len());
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<NodeIndex> = entries.into_iter().collect();
    while let Some(n) = queue.pop_front() {
        if !visited.insert(n) {
            continue;
        }
        order.push(graph[n]);
        let mut successors: Vec<NodeIndex> = graph
            .neighbors_directed(n, Direction::Outgoing)
            .filter(|s| !visited.contains(s))
            .collect();
        successors.sort_by_key(sort_key);
        queue.extend(successors);
    }

    let mut remaining: Vec<NodeIndex> = nodes
        .iter()
        .map(|(n, _)| *n)
        .filter(|n| !visited.contains(n))
        .collect();
    remaining.sort_by_key(sort_key);
    let mut swapped = true;
    while swapped {
        swapped = false;
        for k in 1..remaining.len() {
            let (a, b) = (remaining[k - 1], remaining[k]);
            if graph.contains_edge(b, a) && !graph.contains_edge(a, b) {
                remaining.swap(k - 1, k);
                swapped = true;
            }
        }
    }
    order.extend(remaining.into_iter().map(|n| graph[n]));
    order
}

///
/// Stitch the alignments of several shards into one alignment
///
/// Shard alignments are interleaved keeping the order of each of them. A move on an event or on
/// a transition owned by several shards is emitted once, when it is the next move of all of
/// them, and events are emitted in trace order. Among shards that can move, [`priority`] decides.
///
/// Fails if some shard alignment cannot be completed this way.
///
pub fn recompose(shards: &[ShardMoves]) -> Result<Vec<Move>, StitchConflict> {
    let mut by_event: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut by_transition: HashMap<TransitionID, Vec<usize>> = HashMap::new();
    for (i, s) in shards.iter().enumerate() {
        for e in &s.events {
            by_event.entry(*e).or_default().push(i);
        }
        for t in &s.transitions {
            by_transition.entry(*t).or_default().push(i);
        }
    }
    let participants = |s: usize, mv: &Move| -> Vec<usize> {
        let owners = match (mv.event, mv.transition) {
            (Some(e), _) => by_event.get(&e),
            (None, Some(t)) => by_transition.get(&t),
            (None, None) => None,
        };
        let mut ret = owners.cloned().unwrap_or_default();
        if !ret.contains(&s) {
            ret.push(s);
        }
        ret
    };

    let order = priority(shards);
    let mut cursor = vec![0usize; shards.len()];
    let mut pending: BTreeSet<usize> = shards
        .iter()
        .flat_map(|s| s.moves.iter().filter_map(|m| m.event))
        .collect();
    let head = |cursor: &[usize], s: usize| shards[s].moves.get(cursor[s]);
    let mut out: Vec<Move> = Vec::new();

    loop {
        let ready = order.iter().copied().find_map(|s| {
            let mv = head(&cursor, s)?;
            if mv.event.is_some_and(|e| pending.first() != Some(&e)) {
                return None;
            }
            let owners = participants(s, mv);
            owners
                .iter()
                .all(|o| head(&cursor, *o).is_some_and(|m| m.key() == mv.key()))
                .then_some((s, owners))
        });
        let Some((s, owners)) = ready else {
            break;
        };
        let mv = shards[s].moves[cursor[s]].clone();
        if let Some(e) = mv.event {
            pending.remove(&e);
        }
        for o in owners {
            cursor[o] += 1;
        }
        out.push(mv);
    }

    let mut blocked: BTreeSet<usize> = BTreeSet::new();
    for (s, shard) in shards.iter().enumerate() {
        if let Some(mv) = shard.moves.get(cursor[s]) {
            blocked.extend(participants(s, mv));
        }
    }
    if blocked.is_empty() {
        Ok(out)
    } else {
        Err(StitchConflict {
            shards: blocked.into_iter().collect(),
        })
    }
}
