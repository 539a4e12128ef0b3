//! Case-centric process models
pub mod petri_net;
