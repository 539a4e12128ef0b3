//! Token-based Replay
//!
//! Traces are replayed on a [`PetriNet`] by firing the transition of each event, inserting the
//! tokens it lacks. Invisible transitions are fired to enable blocked transitions and to reach
//! the final marking. Missing, consumed, remaining and produced tokens yield the fitness of a
//! trace.
pub mod caches;
pub mod hidden;
pub mod parameters;
pub mod replay;
pub mod result;
pub mod s_components;

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

pub use caches::ReplayCaches;
pub use parameters::TokenReplayParameters;
pub use replay::ReplayModel;
pub use result::{
    token_fitness, TokenBasedReplayResult, TokenReplayError, TokenReplayLogFitness,
    TokenReplayTraceResult,
};

use crate::core::event_data::case_centric::{EventLog, EventLogClassifier, Trace, VariantIndex};
use crate::core::process_models::case_centric::petri_net::{Marking, PetriNet};

///
/// Replay one activity sequence
///
pub fn replay_activities<S: AsRef<str>>(
    trace: &[S],
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &TokenReplayParameters,
) -> Result<TokenReplayTraceResult, TokenReplayError> {
    let model = ReplayModel::new(net, initial_marking, final_marking, params)?;
    Ok(model.replay(trace, params, &mut ReplayCaches::new()))
}

///
/// Replay one trace, classifying events by `params.activity_key`
///
pub fn replay_trace(
    trace: &Trace,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &TokenReplayParameters,
) -> Result<TokenReplayTraceResult, TokenReplayError> {
    let classifier = EventLogClassifier::from_activity_key(&params.activity_key);
    let activities: Vec<String> = trace
        .events
        .iter()
        .map(|e| classifier.get_class_identity(e))
        .collect();
    replay_activities(&activities, net, initial_marking, final_marking, params)
}

///
/// Replay every trace of an event log
///
/// Each variant is replayed once and its result is copied to all of its traces, in the trace
/// order of `log`. Without `params.cores`, variants are replayed one after another sharing one
/// set of [`ReplayCaches`]; otherwise every worker thread has its own caches.
///
/// Traces not covered by a given `params.variants_idx` are left out.
///
pub fn apply_log(
    log: &EventLog,
    net: &PetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    params: &TokenReplayParameters,
) -> Result<Vec<TokenReplayTraceResult>, TokenReplayError> {
    let model = ReplayModel::new(net, initial_marking, final_marking, params)?;
    let variants = match &params.variants_idx {
        Some(v) => v.clone(),
        None => VariantIndex::from_log(
            log,
            &EventLogClassifier::from_activity_key(&params.activity_key),
        ),
    };
    debug!(
        traces = log.traces.len(),
        variants = variants.len(),
        "replaying log"
    );

    let total = variants.len();
    let done = AtomicUsize::new(0);
    let replay = |acts: &[String], caches: &mut ReplayCaches| {
        let res = model.replay(acts, params, caches);
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if params.show_progress_bar {
            info!(finished, total, "replayed variant");
        }
        res
    };
    let sequential = || {
        let mut caches = ReplayCaches::new();
        variants
            .iter()
            .map(|(acts, _)| replay(acts, &mut caches))
            .collect::<Vec<_>>()
    };
    let per_variant = match params.cores {
        Some(n) if n > 1 && total > 1 => match ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(|| {
                variants
                    .variants
                    .par_iter()
                    .map_init(ReplayCaches::new, |caches, (acts, _)| {
                        replay(acts.as_slice(), caches)
                    })
                    .collect::<Vec<_>>()
            }),
            Err(e) => {
                warn!(error = %e, "could not build thread pool, replaying sequentially");
                sequential()
            }
        },
        _ => sequential(),
    };
    Ok(variants
        .fan_out(per_variant.into_iter().map(Some).collect())
        .into_iter()
        .flatten()
        .collect())
}

///
/// Computes token-based replay of all traces using the accepting markings stored in the net
///
/// Counters are summed over all traces. Invisible and duplicate transitions are supported.
///
pub fn token_based_replay(
    petri_net: &PetriNet,
    event_log: &EventLog,
) -> Result<TokenBasedReplayResult, TokenReplayError> {
    let initial_marking = petri_net
        .initial_marking
        .as_ref()
        .ok_or(TokenReplayError::NoInitialMarking)?;
    let final_marking = match petri_net.final_markings.as_deref() {
        None | Some([]) => return Err(TokenReplayError::NoFinalMarking),
        Some([fm]) => fm,
        Some(_) => return Err(TokenReplayError::TooManyFinalMarkings),
    };
    let results = apply_log(
        event_log,
        petri_net,
        initial_marking,
        final_marking,
        &TokenReplayParameters::default(),
    )?;
    Ok(TokenBasedReplayResult::from_traces(&results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_data::case_centric::Event;
    use crate::core::process_models::case_centric::petri_net::{ArcType, PlaceID, TransitionID};

    /// p_0 -> t_0 -> p_1 -> t_1 -> ... -> p_n
    fn chain(labels: &[&str]) -> (PetriNet, Marking, Marking, Vec<TransitionID>) {
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
        (net, im, fm, transitions)
    }

    #[test]
    fn token_based_replay_test() {
        let mut net = PetriNet::new();
        let p1 = net.add_place(None);
        let p2 = net.add_place(None);
        let p3 = net.add_place(None);
        let t1 = net.add_transition(Some("a".into()), None);
        let t2 = net.add_transition(Some("b".into()), None);
        let t3 = net.add_transition(Some("c".into()), None);
        let t4 = net.add_transition(Some("d".into()), None);
        net.add_arc(ArcType::place_to_transition(p1, t1), None);
        net.add_arc(ArcType::place_to_transition(p1, t2), None);
        net.add_arc(ArcType::transition_to_place(t1, p2), None);
        net.add_arc(ArcType::transition_to_place(t2, p2), None);
        net.add_arc(ArcType::place_to_transition(p2, t3), None);
        net.add_arc(ArcType::transition_to_place(t3, p3), None);
        net.add_arc(ArcType::transition_to_place(t4, p2), None);
        net.add_arc(ArcType::place_to_transition(p2, t4), None);

        net.initial_marking = Some([(p1, 1)].into_iter().collect());
        net.final_markings = Some(vec![[(p3, 1)].into_iter().collect()]);

        let mut trace_1 = Trace::new();
        trace_1.events.push(Event::new("a".to_string()));
        trace_1.events.push(Event::new("b".to_string()));
        trace_1.events.push(Event::new("c".to_string()));
        trace_1.events.push(Event::new("c".to_string()));
        trace_1.events.push(Event::new("d".to_string()));

        let mut event_log = EventLog::new();
        event_log.traces.push(trace_1);

        let result = token_based_replay(&net, &event_log).unwrap();
        assert_eq!(result.produced, 6);
        assert_eq!(result.consumed, 6);
        assert_eq!(result.missing, 2);
        assert_eq!(result.remaining, 2);

        let mut trace_2 = Trace::new();
        trace_2.events.push(Event::new("b".to_string()));
        trace_2.events.push(Event::new("b".to_string()));
        trace_2.events.push(Event::new("d".to_string()));
        trace_2.events.push(Event::new("b".to_string()));

        event_log.traces.push(trace_2);

        let result_2 = token_based_replay(&net, &event_log).unwrap();
        assert_eq!(result_2.produced, 6 + 5);
        assert_eq!(result_2.consumed, 6 + 5);
        assert_eq!(result_2.missing, 2 + 3);
        assert_eq!(result_2.remaining, 2 + 3);
        let expected = 0.5 * (1.0 - 5.0 / 11.0) + 0.5 * (1.0 - 5.0 / 11.0);
        assert!((result_2.compute_fitness() - expected).abs() < 1e-9);
    }

    #[test]
    fn missing_markings_are_reported() {
        let (mut net, im, fm, _) = chain(&["a"]);
        let log = EventLog::from_activity_sequences(&[vec!["a"]]);
        assert_eq!(
            token_based_replay(&net, &log),
            Err(TokenReplayError::NoInitialMarking)
        );
        net.initial_marking = Some(im);
        net.final_markings = Some(vec![]);
        assert_eq!(
            token_based_replay(&net, &log),
            Err(TokenReplayError::NoFinalMarking)
        );
        net.final_markings = Some(vec![fm.clone(), fm]);
        assert_eq!(
            token_based_replay(&net, &log),
            Err(TokenReplayError::TooManyFinalMarkings)
        );
    }

    #[test]
    fn invisible_transitions_are_walked_through() {
        let (net, im, fm, ts) = chain(&["A", "tau", "B"]);
        let params = TokenReplayParameters::default();
        let res = replay_activities(&["A", "B"], &net, &im, &fm, &params).unwrap();
        assert!(res.trace_is_fit);
        assert_eq!(res.trace_fitness, 1.0);
        assert_eq!(res.activated_transitions, ts);
        assert_eq!((res.consumed_tokens, res.produced_tokens), (4, 4));
        assert_eq!(res.reached_marking, fm);
        assert!(res.enabled_transitions_in_marking.is_empty());

        let no_walk = TokenReplayParameters {
            walk_through_hidden_trans: false,
            ..Default::default()
        };
        let res = replay_activities(&["A", "B"], &net, &im, &fm, &no_walk).unwrap();
        assert!(!res.trace_is_fit);
        assert_eq!(res.transitions_with_problems, vec![ts[2]]);
        assert_eq!(res.missing_tokens, 1);
        assert_eq!(res.remaining_tokens, 1);
        assert_eq!((res.consumed_tokens, res.produced_tokens), (3, 3));
        assert!((res.trace_fitness - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn duplicate_labels_follow_the_next_activity() {
        let mut net = PetriNet::new();
        let [p0, pa, pb, pc, pe] = [(); 5].map(|_| net.add_place(None));
        let b1 = net.add_named_transition("B1", Some("B"));
        let b2 = net.add_named_transition("B2", Some("B"));
        let x = net.add_named_transition("X", Some("X"));
        let c = net.add_named_transition("C", Some("C"));
        let d = net.add_named_transition("D", Some("D"));
        net.add_arc(ArcType::place_to_transition(p0, b1), None);
        net.add_arc(ArcType::transition_to_place(b1, pa), None);
        net.add_arc(ArcType::place_to_transition(p0, b2), None);
        net.add_arc(ArcType::transition_to_place(b2, pb), None);
        net.add_arc(ArcType::place_to_transition(pa, x), None);
        net.add_arc(ArcType::transition_to_place(x, pe), None);
        net.add_arc(ArcType::place_to_transition(pb, c), None);
        net.add_arc(ArcType::transition_to_place(c, pc), None);
        net.add_arc(ArcType::place_to_transition(pc, d), None);
        net.add_arc(ArcType::transition_to_place(d, pe), None);
        let im: Marking = [(p0, 1)].into_iter().collect();
        let fm: Marking = [(pe, 1)].into_iter().collect();
        let params = TokenReplayParameters::default();

        let res = replay_activities(&["B", "C", "D"], &net, &im, &fm, &params).unwrap();
        assert!(res.trace_is_fit);
        assert_eq!(res.trace_fitness, 1.0);
        assert_eq!(res.activated_transitions, vec![b2, c, d]);

        let res = replay_activities(&["B", "X"], &net, &im, &fm, &params).unwrap();
        assert!(res.trace_is_fit);
        assert_eq!(res.activated_transitions, vec![b1, x]);

        let mut caches = ReplayCaches::new();
        let model = ReplayModel::new(&net, &im, &fm, &params).unwrap();
        assert!(model.replay(&["B", "X"], &params, &mut caches).trace_is_fit);
        let res = model.replay(&["B", "C", "D"], &params, &mut caches);
        assert_eq!(res.activated_transitions, vec![b2, c, d]);
    }

    #[test]
    fn final_marking_is_reached_through_invisible_transitions() {
        let (net, im, fm, ts) = chain(&["A", "tau"]);
        let res =
            replay_activities(&["A"], &net, &im, &fm, &TokenReplayParameters::default()).unwrap();
        assert!(res.trace_is_fit);
        assert_eq!(res.activated_transitions, ts);

        let params = TokenReplayParameters {
            try_to_reach_final_marking_through_hidden: false,
            ..Default::default()
        };
        let res = replay_activities(&["A"], &net, &im, &fm, &params).unwrap();
        assert!(!res.trace_is_fit);
        assert_eq!((res.missing_tokens, res.remaining_tokens), (1, 1));
        assert_eq!(res.enabled_transitions_in_marking, vec![ts[1]]);
    }

    #[test]
    fn activities_outside_the_model() {
        let (net, im, fm, _) = chain(&["A", "B"]);
        let trace = ["A", "Z", "B", "Z"];
        let res =
            replay_activities(&trace, &net, &im, &fm, &TokenReplayParameters::default()).unwrap();
        assert!(res.trace_is_fit);
        assert_eq!(res.activities_not_in_model, vec!["Z".to_string()]);

        let strict = TokenReplayParameters {
            consider_activities_not_in_model_in_fitness: true,
            ..Default::default()
        };
        let res = replay_activities(&trace, &net, &im, &fm, &strict).unwrap();
        assert!(!res.trace_is_fit);
        assert_eq!(res.trace_fitness, 1.0);
    }

    #[test]
    fn stopping_at_the_first_problem() {
        let (net, im, fm, ts) = chain(&["A", "B"]);
        let params = TokenReplayParameters {
            stop_immediately_unfit: true,
            ..Default::default()
        };
        let res = replay_activities(&["B", "A"], &net, &im, &fm, &params).unwrap();
        assert!(!res.trace_is_fit);
        assert!(res.activated_transitions.is_empty());
        assert_eq!(res.transitions_with_problems, vec![ts[1]]);
        assert_eq!(res.missing_tokens, 2);
        assert_eq!(res.remaining_tokens, 1);
        assert_eq!(res.reached_marking, im);
    }

    #[test]
    fn caches_are_filled_by_fitting_traces_only() {
        let (net, im, fm, _) = chain(&["A", "B"]);
        let params = TokenReplayParameters {
            enable_postfix_cache: true,
            enable_marktoact_cache: true,
            ..Default::default()
        };
        let model = ReplayModel::new(&net, &im, &fm, &params).unwrap();
        let mut caches = ReplayCaches::new();
        let first = model.replay(&["A", "B"], &params, &mut caches);
        assert!(first.trace_is_fit);
        assert_eq!(caches.postfix_entries(), 2);
        assert_eq!(caches.marking_to_activity_entries(), 2);

        let again = model.replay(&["A", "B"], &params, &mut caches);
        assert_eq!(again, first);

        let unfit = model.replay(&["B"], &params, &mut caches);
        assert!(!unfit.trace_is_fit);
        assert_eq!(caches.postfix_entries(), 2);
        assert_eq!(caches.marking_to_activity_entries(), 2);

        let uncached = model.replay(&["A", "B"], &params, &mut ReplayCaches::new());
        assert_eq!(uncached, first);
        caches.clear();
        assert_eq!(caches.postfix_entries(), 0);
    }

    #[test]
    fn token_flood_is_cleaned_within_s_components() {
        let (net, im, fm, _) = chain(&["a", "b", "c"]);
        let res =
            replay_activities(&["a", "c"], &net, &im, &fm, &TokenReplayParameters::default())
                .unwrap();
        assert_eq!((res.missing_tokens, res.remaining_tokens), (1, 1));

        let params = TokenReplayParameters {
            cleaning_token_flood: true,
            ..Default::default()
        };
        let res = replay_activities(&["a", "c"], &net, &im, &fm, &params).unwrap();
        assert_eq!((res.missing_tokens, res.remaining_tokens), (1, 0));
        assert!(!res.trace_is_fit);
    }

    #[test]
    fn log_replay_is_independent_of_workers() {
        let (net, im, fm, _) = chain(&["A", "tau", "B"]);
        let log = EventLog::from_activity_sequences(&[
            vec!["A", "B"],
            vec!["B"],
            vec!["A", "B"],
            vec!["A", "A", "B"],
        ]);
        let sequential =
            apply_log(&log, &net, &im, &fm, &TokenReplayParameters::default()).unwrap();
        let parallel = apply_log(
            &log,
            &net,
            &im,
            &fm,
            &TokenReplayParameters {
                cores: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 4);
        assert_eq!(sequential[0], sequential[2]);

        let summary = TokenReplayLogFitness::from_results(&sequential);
        assert_eq!(summary.perc_fit_traces, 50.0);
        let mean = sequential.iter().map(|r| r.trace_fitness).sum::<f64>() / 4.0;
        assert!((summary.average_trace_fitness - mean).abs() < 1e-9);
        assert!(summary.log_fitness < 1.0);
    }

    #[test]
    fn parameters_roundtrip_json() {
        let params = TokenReplayParameters::from_json("{\"cores\": 2}").unwrap();
        assert_eq!(params.cores, Some(2));
        assert!(params.consider_remaining_in_fitness);
        assert!(params.walk_through_hidden_trans);
        let back = TokenReplayParameters::from_json(&params.to_json().unwrap()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn fitness_with_empty_denominators() {
        assert_eq!(token_fitness(0, 0, 0, 0), 1.0);
        assert_eq!(TokenBasedReplayResult::new().compute_fitness(), 1.0);
    }
}
