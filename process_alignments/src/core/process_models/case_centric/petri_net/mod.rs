//! Petri nets
pub mod macros;
pub(crate) mod marking;
pub(crate) mod petri_net_struct;
pub mod semantics;
pub use marking::Marking;
pub use petri_net_struct::*;
pub use semantics::Semantics;
