#![warn(
    clippy::doc_markdown,
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs
)]
#![allow(clippy::needless_doctest_main)]
#![doc = include_str!("../README.md")]

pub mod conformance;
pub mod core;

#[doc(inline)]
pub use crate::core::event_data::case_centric::{Event, EventLog, Trace, VariantIndex};

#[doc(inline)]
pub use crate::core::process_models::case_centric::petri_net::{Marking, PetriNet, Semantics};

#[doc(inline)]
pub use conformance::case_centric::alignments::{
    align_activities, align_log, align_trace, AlignmentParameters, AlignmentResult,
};

#[doc(inline)]
pub use conformance::case_centric::alignments::decomposition::{
    align_activities_decomposed, align_log_decomposed, DecompositionParameters,
};

#[doc(inline)]
pub use conformance::case_centric::token_based_replay::{
    apply_log as token_replay_log, token_based_replay, TokenReplayParameters,
};

///
/// Serialize a [`PetriNet`] as a JSON [`String`]
///
pub fn petrinet_to_json(net: &PetriNet) -> Result<String, serde_json::Error> {
    serde_json::to_string(net)
}

///
/// Deserialize a [`PetriNet`] from a JSON [`String`]
///
pub fn json_to_petrinet(net_json: &str) -> Result<PetriNet, serde_json::Error> {
    serde_json::from_str(net_json)
}
