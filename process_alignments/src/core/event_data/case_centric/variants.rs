use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::event_log_struct::{EventLog, EventLogClassifier};

///
/// Grouping of trace indices by their activity sequence (_variant_)
///
/// Variants are kept in order of their first occurrence in the log, and trace indices within a
/// variant are ascending.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VariantIndex {
    /// Variants with the indices of all traces following them
    pub variants: Vec<(Vec<String>, Vec<usize>)>,
}

impl VariantIndex {
    /// Group activity sequences (one per trace) into variants
    pub fn from_sequences(sequences: &[Vec<String>]) -> Self {
        let mut position: HashMap<&[String], usize> = HashMap::new();
        let mut variants: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for (trace_index, seq) in sequences.iter().enumerate() {
            match position.get(seq.as_slice()) {
                Some(&v) => variants[v].1.push(trace_index),
                None => {
                    position.insert(seq.as_slice(), variants.len());
                    variants.push((seq.clone(), vec![trace_index]));
                }
            }
        }
        Self { variants }
    }

    /// Group the traces of an event log using the given classifier
    pub fn from_log(log: &EventLog, classifier: &EventLogClassifier) -> Self {
        Self::from_sequences(&log.activity_sequences(classifier))
    }

    /// Number of variants
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Whether there are no variants (i.e., the log has no traces)
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Number of traces covered by this index
    pub fn trace_count(&self) -> usize {
        self.variants.iter().map(|(_, idx)| idx.len()).sum()
    }

    /// Iterate over (activities, trace indices)
    pub fn iter(&self) -> impl Iterator<Item = (&[String], &[usize])> {
        self.variants
            .iter()
            .map(|(acts, idx)| (acts.as_slice(), idx.as_slice()))
    }

    ///
    /// Replicate one value per variant to one value per trace (in trace order)
    ///
    /// Trace indices not covered by any variant stay [`None`].
    ///
    pub fn fan_out<T: Clone>(&self, per_variant: Vec<Option<T>>) -> Vec<Option<T>> {
        let mut ret: Vec<Option<T>> = vec![None; self.trace_count()];
        for ((_, indices), value) in self.variants.iter().zip(per_variant) {
            for &i in indices {
                if i >= ret.len() {
                    ret.resize(i + 1, None);
                }
                ret[i] = value.clone();
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|t| t.iter().map(|a| a.to_string()).collect())
            .collect()
    }

    #[test]
    fn variants_keep_first_occurrence_order() {
        let idx = VariantIndex::from_sequences(&seqs(&[&["a", "b"], &["c"], &["a", "b"], &[]]));
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.variants[0].1, vec![0, 2]);
        assert_eq!(idx.variants[1].0, vec!["c".to_string()]);
        assert!(idx.variants[2].0.is_empty());
        assert_eq!(idx.trace_count(), 4);
    }

    #[test]
    fn fan_out_restores_trace_order() {
        let idx = VariantIndex::from_sequences(&seqs(&[&["x"], &["y"], &["x"]]));
        let out = idx.fan_out(vec![Some(1), None]);
        assert_eq!(out, vec![Some(1), None, Some(1)]);
    }

    #[test]
    fn from_log_uses_classifier() {
        let log = EventLog::from_activity_sequences(&[vec!["a"], vec!["a"], vec!["b"]]);
        let idx = VariantIndex::from_log(&log, &EventLogClassifier::default());
        assert_eq!(idx.len(), 2);
    }
}
