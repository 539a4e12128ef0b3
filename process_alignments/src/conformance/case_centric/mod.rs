//! Case-centric conformance checking on Petri nets
pub mod alignments;
pub mod token_based_replay;

#[cfg(test)]
mod tests;
