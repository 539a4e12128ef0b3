//! Event Data
//!
//! Traces and event logs consumed by conformance checking
pub mod case_centric;

#[doc(inline)]
pub use case_centric::EventLog;
