use proptest::prelude::*;

use super::alignments::decomposition::{
    align_activities_decomposed, align_activities_decomposed_with_context, DecompositionContext,
    DecompositionParameters,
};
use super::alignments::{
    align_activities, align_log, replay_alignment, AlignmentParameters, AlignmentResult,
    MoveKind, SimplexSolver, SKIP, STD_MODEL_LOG_MOVE_COST as K, STD_TAU_COST,
};
use super::token_based_replay::{apply_log, replay_activities, TokenReplayParameters};
use crate::core::event_data::case_centric::EventLog;
use crate::core::process_models::case_centric::petri_net::{
    ArcType, Marking, PetriNet, PlaceID, TransitionID,
};

/// p_0 -> l_0 -> p_1 -> ... -> p_n, labels starting with "tau" are invisible
fn chain(labels: &[&str]) -> (PetriNet, Marking, Marking, Vec<TransitionID>, Vec<PlaceID>) {
    let mut net = PetriNet::new();
    let places: Vec<PlaceID> = (0..=labels.len()).map(|_| net.add_place(None)).collect();
    let mut transitions = Vec::new();
    for (i, l) in labels.iter().enumerate() {
        let label = (!l.starts_with("tau")).then_some(*l);
        let t = net.add_named_transition(l, label);
        net.add_arc(ArcType::place_to_transition(places[i], t), None);
        net.add_arc(ArcType::transition_to_place(t, places[i + 1]), None);
        transitions.push(t);
    }
    let im: Marking = [(places[0], 1)].into_iter().collect();
    let fm: Marking = [(places[labels.len()], 1)].into_iter().collect();
    (net, im, fm, transitions, places)
}

/// p0 -> split -> (pa -> A -> qa || pb -> B -> qb) -> join -> pc -> C -> pd
fn parallel_net() -> (PetriNet, Marking, Marking) {
    let mut net = PetriNet::new();
    let [p0, pa, pb, qa, qb, pc, pd] = [(); 7].map(|_| net.add_place(None));
    let split = net.add_named_transition("split", None);
    let a = net.add_named_transition("A", Some("A"));
    let b = net.add_named_transition("B", Some("B"));
    let join = net.add_named_transition("join", None);
    let c = net.add_named_transition("C", Some("C"));
    net.add_arc(ArcType::place_to_transition(p0, split), None);
    net.add_arc(ArcType::transition_to_place(split, pa), None);
    net.add_arc(ArcType::transition_to_place(split, pb), None);
    net.add_arc(ArcType::place_to_transition(pa, a), None);
    net.add_arc(ArcType::transition_to_place(a, qa), None);
    net.add_arc(ArcType::place_to_transition(pb, b), None);
    net.add_arc(ArcType::transition_to_place(b, qb), None);
    net.add_arc(ArcType::place_to_transition(qa, join), None);
    net.add_arc(ArcType::place_to_transition(qb, join), None);
    net.add_arc(ArcType::transition_to_place(join, pc), None);
    net.add_arc(ArcType::place_to_transition(pc, c), None);
    net.add_arc(ArcType::transition_to_place(c, pd), None);
    let im: Marking = [(p0, 1)].into_iter().collect();
    let fm: Marking = [(pd, 1)].into_iter().collect();
    (net, im, fm)
}

/// p0 -> A -> p1 -> B -> p3, with the loop p1 -> X -> p2 -> Y -> p1
fn loop_net() -> (PetriNet, Marking, Marking, TransitionID) {
    let mut net = PetriNet::new();
    let [p0, p1, p2, p3] = [(); 4].map(|_| net.add_place(None));
    let a = net.add_named_transition("A", Some("A"));
    let x = net.add_named_transition("X", Some("X"));
    let y = net.add_named_transition("Y", Some("Y"));
    let b = net.add_named_transition("B", Some("B"));
    net.add_arc(ArcType::place_to_transition(p0, a), None);
    net.add_arc(ArcType::transition_to_place(a, p1), None);
    net.add_arc(ArcType::place_to_transition(p1, x), None);
    net.add_arc(ArcType::transition_to_place(x, p2), None);
    net.add_arc(ArcType::place_to_transition(p2, y), None);
    net.add_arc(ArcType::transition_to_place(y, p1), None);
    net.add_arc(ArcType::place_to_transition(p1, b), None);
    net.add_arc(ArcType::transition_to_place(b, p3), None);
    let im: Marking = [(p0, 1)].into_iter().collect();
    let fm: Marking = [(p3, 1)].into_iter().collect();
    (net, im, fm, y)
}

fn labels(res: &AlignmentResult) -> Vec<(String, Option<String>)> {
    res.alignment
        .iter()
        .map(|s| {
            let (l, m) = s.labels();
            (l.to_string(), m.map(String::from))
        })
        .collect()
}

fn step(log: &str, model: Option<&str>) -> (String, Option<String>) {
    (log.to_string(), model.map(String::from))
}

#[test]
fn perfect_fit() {
    let (net, im, fm, _, _) = chain(&["A", "B"]);
    let res = align_activities(&["A", "B"], &net, &im, &fm, &AlignmentParameters::default())
        .unwrap();
    assert_eq!(res.cost, 0);
    assert_eq!(
        labels(&res),
        vec![step("A", Some("A")), step("B", Some("B"))]
    );
    assert_eq!(res.fitness, 1.0);
    assert!(res.is_fit());
    assert!(replay_alignment(&net, &im, &fm, &["A", "B"], &res.moves).is_ok());
}

#[test]
fn log_move() {
    let (net, im, fm, _, _) = chain(&["A", "B"]);
    let trace = ["A", "X", "B"];
    let res = align_activities(&trace, &net, &im, &fm, &AlignmentParameters::default()).unwrap();
    assert_eq!(res.cost, K);
    assert_eq!(
        labels(&res),
        vec![step("A", Some("A")), step("X", Some(SKIP)), step("B", Some("B"))]
    );
    assert_eq!(res.bwc, 3 * K + 2 * K);
    assert!((res.fitness - (1.0 - 1.0 / 5.0)).abs() < 1e-9);
    assert!(replay_alignment(&net, &im, &fm, &trace, &res.moves).is_ok());
}

#[test]
fn model_move() {
    let (net, im, fm, _, _) = chain(&["A", "B"]);
    let res = align_activities(&["A"], &net, &im, &fm, &AlignmentParameters::default()).unwrap();
    assert_eq!(res.cost, K);
    assert_eq!(
        labels(&res),
        vec![step("A", Some("A")), step(SKIP, Some("B"))]
    );
    assert!((res.fitness - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
}

#[test]
fn silent_skip() {
    let (net, im, fm, ts, _) = chain(&["A", "tau", "B"]);
    let res = align_activities(&["A", "B"], &net, &im, &fm, &AlignmentParameters::default())
        .unwrap();
    assert_eq!(
        labels(&res),
        vec![step("A", Some("A")), step(SKIP, None), step("B", Some("B"))]
    );
    assert_eq!(res.moves[1].kind, MoveKind::Silent);
    assert_eq!(res.cost, STD_TAU_COST);
    assert_eq!(res.deviation_cost(), 0);
    assert_eq!(res.fitness, 1.0);

    let free_tau = AlignmentParameters {
        model_cost_function: Some([(ts[1], 0)].into_iter().collect()),
        ..Default::default()
    };
    let res = align_activities(&["A", "B"], &net, &im, &fm, &free_tau).unwrap();
    assert_eq!(res.cost, 0);
    assert_eq!(res.fitness, 1.0);
}

#[test]
fn reset_arc_clears_place_during_alignment() {
    let (mut net, _, fm, ts, places) = chain(&["A"]);
    let p_r = net.add_place(None);
    net.add_reset_arc(p_r, ts[0]);
    let im: Marking = [(places[0], 1), (p_r, 3)].into_iter().collect();
    let res = align_activities(&["A"], &net, &im, &fm, &AlignmentParameters::default()).unwrap();
    assert_eq!(res.cost, 0);
    assert!(replay_alignment(&net, &im, &fm, &["A"], &res.moves).is_ok());
}

#[test]
fn inhibitor_arc_forces_model_move() {
    let (mut net, _, fm, ts, places) = chain(&["A", "B"]);
    let p_i = net.add_place(None);
    let c = net.add_named_transition("C", Some("C"));
    net.add_arc(ArcType::place_to_transition(p_i, c), None);
    net.add_inhibitor_arc(p_i, ts[1]);
    let im: Marking = [(places[0], 1), (p_i, 1)].into_iter().collect();

    let res = align_activities(&["A", "B"], &net, &im, &fm, &AlignmentParameters::default())
        .unwrap();
    assert_eq!(res.cost, K);
    assert_eq!(res.bwc, 2 * K + 3 * K);
    let position = |t: TransitionID| res.moves.iter().position(|m| m.transition == Some(t));
    assert!(position(c).unwrap() < position(ts[1]).unwrap());
    assert!(replay_alignment(&net, &im, &fm, &["A", "B"], &res.moves).is_ok());
}

/// p0 -> A -> p1 -> X -> p2, aligning [X, A] where skipping A is expensive
#[test]
fn decomposition_repairs_border_disagreements() {
    let (net, im, fm, _, _) = chain(&["A", "X"]);
    let trace = ["X", "A"];
    let base = AlignmentParameters {
        trace_cost_function: Some(vec![K, 3 * K]),
        ..Default::default()
    };
    let monolithic = align_activities(&trace, &net, &im, &fm, &base).unwrap();
    assert_eq!(monolithic.cost, 2 * K);

    let params = DecompositionParameters {
        base,
        ..Default::default()
    };
    let mut ctx = DecompositionContext::new();
    let decomposed = align_activities_decomposed_with_context(
        &trace,
        &net,
        &im,
        &fm,
        &params,
        &mut ctx,
        &SimplexSolver::default(),
    )
    .unwrap();
    assert!(decomposed.merges >= 1);
    assert_eq!(decomposed.result.cost, monolithic.cost);
    assert_eq!(
        labels(&decomposed.result),
        vec![step("X", Some(SKIP)), step("A", Some("A")), step(SKIP, Some("X"))]
    );
    assert!(replay_alignment(&net, &im, &fm, &trace, &decomposed.result.moves).is_ok());
    assert_eq!(decomposed.result.fitness, monolithic.fitness);
    assert!(ctx.cached_alignments() > 0);
    assert_eq!(ctx.cached_merges(), decomposed.merges);
}

#[test]
fn fitting_traces_decompose_exactly() {
    let (net, im, fm, ts, _) = chain(&["A", "tau", "B"]);
    let trace = ["A", "B"];
    let monolithic =
        align_activities(&trace, &net, &im, &fm, &AlignmentParameters::default()).unwrap();
    let decomposed =
        align_activities_decomposed(&trace, &net, &im, &fm, &DecompositionParameters::default())
            .unwrap();
    assert_eq!(decomposed.merges, 0);
    assert_eq!(decomposed.shards, 3);
    assert_eq!(decomposed.result.cost, monolithic.cost);
    let fired: Vec<TransitionID> = decomposed
        .result
        .moves
        .iter()
        .filter_map(|m| m.transition)
        .collect();
    assert_eq!(fired, ts);
    assert!(replay_alignment(&net, &im, &fm, &trace, &decomposed.result.moves).is_ok());
}

#[test]
fn decomposed_alignments_replay_on_concurrent_nets() {
    let (net, im, fm) = parallel_net();
    let traces: [Vec<&str>; 4] = [
        vec![],
        vec!["A", "C"],
        vec!["B", "A", "C"],
        vec!["A", "X", "C"],
    ];
    for trace in traces {
        let monolithic =
            align_activities(&trace, &net, &im, &fm, &AlignmentParameters::default()).unwrap();
        let decomposed =
            align_activities_decomposed(&trace, &net, &im, &fm, &DecompositionParameters::default())
                .unwrap();
        assert_eq!(
            replay_alignment(&net, &im, &fm, &trace, &decomposed.result.moves),
            Ok(())
        );
        assert_eq!(decomposed.result.cost, monolithic.cost);
        assert_eq!(
            decomposed.result.cost,
            decomposed.result.moves.iter().map(|m| m.cost).sum::<u64>()
        );
        if trace.is_empty() {
            assert_eq!(decomposed.result.cost, 3 * K + 2 * STD_TAU_COST);
            assert!(decomposed.merges >= 1);
        }
    }
}

#[test]
fn loops_through_shared_transitions_keep_every_firing() {
    let (net, im, fm, y) = loop_net();
    let trace = ["A", "X", "X", "B"];
    let base = AlignmentParameters {
        trace_cost_function: Some(vec![K, 5 * K, 5 * K, K]),
        ..Default::default()
    };
    let monolithic = align_activities(&trace, &net, &im, &fm, &base).unwrap();
    assert_eq!(monolithic.cost, 2 * K);
    let params = DecompositionParameters {
        base,
        ..Default::default()
    };
    let decomposed = align_activities_decomposed(&trace, &net, &im, &fm, &params).unwrap();
    assert_eq!(
        replay_alignment(&net, &im, &fm, &trace, &decomposed.result.moves),
        Ok(())
    );
    assert_eq!(decomposed.result.cost, 2 * K);
    let loops_back = decomposed
        .result
        .moves
        .iter()
        .filter(|m| m.transition == Some(y))
        .count();
    assert_eq!(loops_back, 2);

    let fitting = ["A", "X", "Y", "X", "Y", "B"];
    let decomposed =
        align_activities_decomposed(&fitting, &net, &im, &fm, &DecompositionParameters::default())
            .unwrap();
    assert_eq!(decomposed.merges, 0);
    assert_eq!(decomposed.result.cost, 0);
    assert_eq!(decomposed.result.moves.len(), 6);
    assert!(replay_alignment(&net, &im, &fm, &fitting, &decomposed.result.moves).is_ok());
}

#[test]
fn fitting_traces_are_fit_in_both_methods() {
    let (net, im, fm, _, _) = chain(&["A", "tau", "B"]);
    let alignment =
        align_activities(&["A", "B"], &net, &im, &fm, &AlignmentParameters::default()).unwrap();
    let replay =
        replay_activities(&["A", "B"], &net, &im, &fm, &TokenReplayParameters::default()).unwrap();
    assert_eq!(alignment.fitness, 1.0);
    assert!(replay.trace_is_fit);
    assert_eq!(replay.trace_fitness, 1.0);
}

#[test]
fn variant_order_does_not_matter() {
    let (net, im, fm, _, _) = chain(&["A", "B"]);
    let traces = vec![vec!["A"], vec!["A", "B"], vec!["X"], vec!["A"]];
    let reversed: Vec<Vec<&str>> = traces.iter().rev().cloned().collect();
    let params = AlignmentParameters {
        cores: Some(2),
        ..Default::default()
    };
    let forward = align_log(
        &EventLog::from_activity_sequences(&traces),
        &net,
        &im,
        &fm,
        &params,
    )
    .unwrap();
    let mut backward = align_log(
        &EventLog::from_activity_sequences(&reversed),
        &net,
        &im,
        &fm,
        &params,
    )
    .unwrap();
    backward.reverse();
    let costs = |r: &[Option<AlignmentResult>]| {
        r.iter()
            .map(|a| a.as_ref().map(|a| a.cost))
            .collect::<Vec<_>>()
    };
    assert_eq!(costs(&forward), costs(&backward));

    let replay_forward = apply_log(
        &EventLog::from_activity_sequences(&traces),
        &net,
        &im,
        &fm,
        &TokenReplayParameters::default(),
    )
    .unwrap();
    let mut replay_backward = apply_log(
        &EventLog::from_activity_sequences(&reversed),
        &net,
        &im,
        &fm,
        &TokenReplayParameters::default(),
    )
    .unwrap();
    replay_backward.reverse();
    assert_eq!(replay_forward, replay_backward);
}

fn trace_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::collection::vec(proptest::sample::select(vec!["A", "B", "X"]), 0..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn alignments_replay_and_sum_up(trace in trace_strategy()) {
        let (net, im, fm, _, _) = chain(&["A", "tau", "B"]);
        let res = align_activities(&trace, &net, &im, &fm, &AlignmentParameters::default()).unwrap();
        prop_assert!(replay_alignment(&net, &im, &fm, &trace, &res.moves).is_ok());
        prop_assert_eq!(res.cost, res.moves.iter().map(|m| m.cost).sum::<u64>());
        prop_assert!((0.0..=1.0).contains(&res.fitness));
        prop_assert_eq!(res.alignment.len(), res.moves.len());
    }

    #[test]
    fn decomposed_alignments_are_valid_and_never_cheaper(
        trace in proptest::collection::vec(
            proptest::sample::select(vec!["A", "B", "C", "X", "Y"]),
            0..5,
        ),
        looped in any::<bool>(),
    ) {
        let (net, im, fm) = if looped {
            let (net, im, fm, _) = loop_net();
            (net, im, fm)
        } else {
            parallel_net()
        };
        let monolithic = align_activities(&trace, &net, &im, &fm, &AlignmentParameters::default()).unwrap();
        prop_assert!(replay_alignment(&net, &im, &fm, &trace, &monolithic.moves).is_ok());
        let decomposed = align_activities_decomposed(&trace, &net, &im, &fm, &DecompositionParameters::default()).unwrap();
        prop_assert!(replay_alignment(&net, &im, &fm, &trace, &decomposed.result.moves).is_ok());
        prop_assert!(decomposed.result.cost >= monolithic.cost);
        prop_assert_eq!(decomposed.result.cost, decomposed.result.moves.iter().map(|m| m.cost).sum::<u64>());
    }

    #[test]
    fn token_counters_are_bounded(trace in trace_strategy()) {
        let (net, im, fm, _, _) = chain(&["A", "tau", "B"]);
        let res = replay_activities(&trace, &net, &im, &fm, &TokenReplayParameters::default()).unwrap();
        prop_assert!(res.missing_tokens <= res.consumed_tokens);
        prop_assert!(res.remaining_tokens <= res.produced_tokens);
        prop_assert!((0.0..=1.0).contains(&res.trace_fitness));
        prop_assert_eq!(res.trace_is_fit, res.missing_tokens == 0 && res.remaining_tokens == 0);
    }
}
