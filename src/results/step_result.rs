use std::collections::HashMap;
use std::collections::hash_map;

use super::{RecordSet, Row};
use crate::types::SqlValue;

/// Record sets of one step: flattened to the first set, or all of them in
/// statement order when the step asked for `multiple`.
#[derive(Debug, Clone)]
pub enum StepData {
    Single(RecordSet),
    Multiple(Vec<RecordSet>),
}

/// Normalized outcome of one step.
#[derive(Debug, Clone)]
pub struct StepResult {
    data: StepData,
    return_value: Option<i32>,
    output_params: HashMap<String, SqlValue>,
}

impl StepResult {
    #[must_use]
    pub fn single(set: RecordSet) -> Self {
        Self {
            data: StepData::Single(set),
            return_value: None,
            output_params: HashMap::new(),
        }
    }

    #[must_use]
    pub fn multiple(sets: Vec<RecordSet>) -> Self {
        Self {
            data: StepData::Multiple(sets),
            return_value: None,
            output_params: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_return_value(mut self, return_value: i32) -> Self {
        self.return_value = Some(return_value);
        self
    }

    #[must_use]
    pub fn with_output_params(mut self, output_params: HashMap<String, SqlValue>) -> Self {
        self.output_params = output_params;
        self
    }

    #[must_use]
    pub fn data(&self) -> &StepData {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> StepData {
        self.data
    }

    #[must_use]
    pub fn is_multiple(&self) -> bool {
        matches!(self.data, StepData::Multiple(_))
    }

    /// Rows of a single-set result, or the number of record sets of a
    /// multiple-set result.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            StepData::Single(set) => set.len(),
            StepData::Multiple(sets) => sets.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows of the first record set (the whole result in single mode).
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        match &self.data {
            StepData::Single(set) => set.rows(),
            StepData::Multiple(sets) => match sets.first() {
                Some(set) => set.rows(),
                None => &[],
            },
        }
    }

    #[must_use]
    pub fn record_sets(&self) -> &[RecordSet] {
        match &self.data {
            StepData::Single(set) => std::slice::from_ref(set),
            StepData::Multiple(sets) => sets,
        }
    }

    #[must_use]
    pub fn record_set(&self, index: usize) -> Option<&RecordSet> {
        self.record_sets().get(index)
    }

    /// Return code of a procedure call; `None` for queries and prepared statements.
    #[must_use]
    pub fn return_value(&self) -> Option<i32> {
        self.return_value
    }

    /// Final value of a procedure output parameter.
    #[must_use]
    pub fn output_param(&self, name: &str) -> Option<&SqlValue> {
        self.output_params.get(name.trim_start_matches('@'))
    }

    #[must_use]
    pub fn output_params(&self) -> &HashMap<String, SqlValue> {
        &self.output_params
    }
}

/// Results of a chain keyed by step name.
#[derive(Debug, Clone, Default)]
pub struct StepResults {
    sets: HashMap<String, StepResult>,
}

impl StepResults {
    pub(crate) fn insert(&mut self, name: &str, result: StepResult) {
        self.sets.insert(name.to_string(), result);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepResult> {
        self.sets.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<StepResult> {
        self.sets.remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, StepResult> {
        self.sets.iter()
    }

    #[must_use]
    pub fn into_inner(self) -> HashMap<String, StepResult> {
        self.sets
    }
}

impl std::ops::Index<&str> for StepResults {
    type Output = StepResult;

    /// # Panics
    /// Panics if no step with that name completed.
    fn index(&self, name: &str) -> &Self::Output {
        match self.sets.get(name) {
            Some(result) => result,
            None => panic!("no result for step `{name}`"),
        }
    }
}

impl IntoIterator for StepResults {
    type Item = (String, StepResult);
    type IntoIter = hash_map::IntoIter<String, StepResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.sets.into_iter()
    }
}
