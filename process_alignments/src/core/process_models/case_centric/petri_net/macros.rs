//! Convenient Macros for creating Petri nets
///
/// Creates a [`PetriNet`](crate::core::process_models::case_centric::petri_net::PetriNet).
///
/// Each parenthesized group creates one place: the labels before `;` produce into it, the labels
/// after `;` consume from it. Transitions are shared by name. Names starting with `tau`
/// (e.g. `"tau"`, `"tau1"`) create invisible transitions.
///
/// # Examples
///
/// ```rust
/// use process_alignments::{petri_net, PetriNet};
/// let petri_net: PetriNet = petri_net!(("a", "b", "c"; "c", "d"), ("f"; "e", "g"));
/// assert_eq!(petri_net.places.len(), 2);
/// assert_eq!(petri_net.transitions.len(), 7);
/// ```
#[macro_export]
macro_rules! petri_net {
    ( $( ($($x:expr),* ; $($y:expr),* ) ),* ) => {{
        #[allow(unused_imports)]
        use std::collections::HashMap;
        #[allow(unused_imports)]
        use $crate::core::process_models::case_centric::petri_net::{
            ArcType,
            PetriNet,
            PlaceID,
            TransitionID,
        };

        let mut result = PetriNet::new();
        #[allow(unused_mut)]
        let mut transition_id_dict: HashMap<String, TransitionID> = HashMap::new();

        #[allow(unused_mut, unused_variables)]
        let mut lookup = |net: &mut PetriNet, name: String| -> TransitionID {
            *transition_id_dict.entry(name.clone()).or_insert_with(|| {
                let label = if name.starts_with("tau") { None } else { Some(name.as_str()) };
                net.add_named_transition(&name, label)
            })
        };

        let mut counter: u64 = 0;

        $(
            counter += 1;
            let place_id: PlaceID = result.add_named_place(&format!("p_{}", counter));

            $(
                let t_in = lookup(&mut result, $x.to_string());
                result.add_arc(ArcType::transition_to_place(t_in, place_id), None);
            )*
            $(
                let t_out = lookup(&mut result, $y.to_string());
                result.add_arc(ArcType::place_to_transition(place_id, t_out), None);
            )*
        )*

        let _ = counter;
        result
    }}
}
