//! Case-centric Event Data
pub mod constants;
#[doc(hidden)]
pub(crate) mod event_log_struct;
pub mod variants;
#[doc(inline)]
pub use event_log_struct::*;
#[doc(inline)]
pub use variants::VariantIndex;
