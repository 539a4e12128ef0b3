use chrono::{DateTime, FixedOffset};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use super::constants::ACTIVITY_NAME;

///
/// Possible attribute values according to the XES Standard
///
/// Activity names are read through [`AttributeValue::try_as_string`]
///
/// ```rust
/// use process_alignments::core::event_data::case_centric::AttributeValue;
/// let v = AttributeValue::from("register request");
///
/// assert_eq!(v.try_as_string().map(String::as_str), Some("register request"));
/// assert_eq!(AttributeValue::Int(42).try_as_string(), None);
/// assert_eq!(AttributeValue::Int(42).to_string(), "42");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "type", content = "content")]
pub enum AttributeValue {
    /// String values
    String(String),
    /// `DateTime` values
    Date(DateTime<FixedOffset>),
    /// Integer values
    Int(i64),
    /// Float values
    Float(f64),
    /// Boolean values
    Boolean(bool),
    /// IDs (UUIDs)
    ID(Uuid),
    /// Used to represent invalid values (e.g., `DateTime` which could not be parsed)
    None(),
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::Date(date_time) => write!(f, "{}", date_time),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::ID(uuid) => write!(f, "{}", uuid),
            AttributeValue::None() => write!(f, "None"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T> From<DateTime<T>> for AttributeValue
where
    T: chrono::TimeZone,
{
    fn from(value: DateTime<T>) -> Self {
        Self::Date(value.fixed_offset())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl AttributeValue {
    ///
    /// Try to get attribute value as String
    ///
    /// Returns `Some()` of inner value if value is of variant [`AttributeValue::String`] and `None` otherwise
    ///
    pub fn try_as_string(&self) -> Option<&String> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
///
/// Attribute made up of the key and value
///
pub struct Attribute {
    /// Attribute key
    pub key: String,
    /// Attribute value
    pub value: AttributeValue,
}

impl Attribute {
    ///
    /// Helper to create a new attribute
    ///
    pub fn new(key: String, attribute_val: AttributeValue) -> Self {
        Self {
            key,
            value: attribute_val,
        }
    }
}

///
/// Attributes are [`Vec`]s of [`Attribute`]s
///
/// See the [`XESEditableAttribute`] trait for convenient functions to add or look up attributes by key.
pub type Attributes = Vec<Attribute>;

///
/// Trait to easily add and look up attributes
///
pub trait XESEditableAttribute {
    ///
    /// Add a new attribute (with key and value)
    ///
    /// Note: Does _not_ check if attribute was already present.
    ///
    fn add_to_attributes(&mut self, key: String, value: AttributeValue);
    ///
    /// Get an attribute by key
    ///
    /// _Complexity_: Does linear lookup (i.e., in O(n)).
    fn get_by_key(&self, key: &str) -> Option<&Attribute>;
    ///
    /// Get an attribute by key or the default value provided by global attributes
    ///
    fn get_by_key_or_global<'a>(
        &'a self,
        key: &str,
        global_attrs: &'a Option<Attributes>,
    ) -> Option<&'a Attribute>;
}

impl XESEditableAttribute for Attributes {
    fn add_to_attributes(&mut self, key: String, value: AttributeValue) {
        self.push(Attribute::new(key, value));
    }

    fn get_by_key(&self, key: &str) -> Option<&Attribute> {
        self.iter().find(|attr| attr.key == key)
    }

    fn get_by_key_or_global<'a>(
        &'a self,
        key: &str,
        global_attrs: &'a Option<Attributes>,
    ) -> Option<&'a Attribute> {
        self.get_by_key(key)
            .or_else(|| global_attrs.as_ref().and_then(|g| g.get_by_key(key)))
    }
}

///
/// An event consists of multiple (event) attributes ([Attributes])
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Event {
    /// Event attributes
    pub attributes: Attributes,
}
impl Event {
    /// Create a new event with the provided activity
    ///
    /// Implicitly assumes usage of the concept XES extension (i.e., uses [`ACTIVITY_NAME`] as key)
    pub fn new(activity: String) -> Self {
        Event {
            attributes: vec![Attribute::new(
                ACTIVITY_NAME.to_string(),
                AttributeValue::String(activity),
            )],
        }
    }
}

///
/// A trace consists of a list of events and trace attributes (See also [`Event`] and [`Attributes`])
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct Trace {
    /// Trace-level attributes
    pub attributes: Attributes,
    /// Events contained in trace
    pub events: Vec<Event>,
}

impl Trace {
    /// Initializes a new trace with no attributes and events
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace with one [`Event::new`] per activity
    pub fn from_activities<S: AsRef<str>>(activities: &[S]) -> Self {
        Self {
            attributes: Attributes::new(),
            events: activities
                .iter()
                .map(|a| Event::new(a.as_ref().to_string()))
                .collect(),
        }
    }
}

///
/// Event log consisting of a list of [`Trace`]s and log [`Attributes`]
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct EventLog {
    /// Top-level attributes
    pub attributes: Attributes,
    /// Traces contained in log
    pub traces: Vec<Trace>,
    /// XES Event classifiers
    pub classifiers: Option<Vec<EventLogClassifier>>,
    ///  Global event attributes
    pub global_event_attrs: Option<Attributes>,
}

impl EventLog {
    /// Initializes a new event log with no attributes, an empty trace list, no
    /// classifiers and no global event attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Event log with one trace per activity sequence
    pub fn from_activity_sequences<S: AsRef<str>>(sequences: &[Vec<S>]) -> Self {
        Self {
            traces: sequences
                .iter()
                .map(|s| Trace::from_activities(s.as_slice()))
                .collect(),
            ..Default::default()
        }
    }

    ///
    /// Project every trace onto its sequence of class identities
    ///
    /// Uses the global event attributes of the log (if any) as fallback.
    ///
    pub fn activity_sequences(&self, classifier: &EventLogClassifier) -> Vec<Vec<String>> {
        self.traces
            .iter()
            .map(|t| {
                t.events
                    .iter()
                    .map(|e| classifier.get_class_identity_with_globals(e, &self.global_event_attrs))
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
/// Event classifier
///
/// Enables classifying events by a set of attributes to consider for the _class identity_
pub struct EventLogClassifier {
    /// Name of the classifier
    pub name: String,
    /// List of attribute keys to consider for the _class identity_
    ///
    pub keys: Vec<String>,
}

impl Default for EventLogClassifier {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            keys: vec![ACTIVITY_NAME.to_string()],
        }
    }
}
impl EventLogClassifier {
    /// Delimiter for combining the values defined by the classifer to form a single class identity string
    pub const DELIMITER: &'static str = "+";

    /// Classifier using a single attribute key (e.g., the `activity_key` parameter)
    pub fn from_activity_key(key: &str) -> Self {
        Self {
            name: key.to_string(),
            keys: vec![key.to_string()],
        }
    }
    ///
    /// Get the class identity (joined with [`EventLogClassifier::DELIMITER`])
    ///
    /// Missing attributes are represented by an empty String, non-string attributes by their [`Display`] value.
    ///
    pub fn get_class_identity(&self, ev: &Event) -> String {
        self.get_class_identity_with_globals(ev, &None)
    }
    ///
    /// Get the class identity (joined with [`EventLogClassifier::DELIMITER`]) using the global event attributes for default values
    ///
    pub fn get_class_identity_with_globals(
        &self,
        ev: &Event,
        global_attrs: &Option<Vec<Attribute>>,
    ) -> String {
        self.keys
            .iter()
            .map(|k| match ev.attributes.get_by_key_or_global(k, global_attrs) {
                Some(Attribute {
                    value: AttributeValue::None(),
                    ..
                })
                | None => String::new(),
                Some(a) => a
                    .value
                    .try_as_string()
                    .cloned()
                    .unwrap_or_else(|| a.value.to_string()),
            })
            .collect::<Vec<_>>()
            .join(EventLogClassifier::DELIMITER)
    }
}
