/// Common identifying field for event identities (i.e., activities)
///
/// _Note_: While the concept XES extension is the de-facto standard for identifying activity names,
/// some logs might use another attribute. Alignment and replay parameters therefore carry a configurable `activity_key`.
pub const ACTIVITY_NAME: &str = "concept:name";
