use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::triage::jurisdiction::Jurisdiction;

/// Key under which the derived jurisdiction is stored.
pub const JURISDICTION_KEY: &str = "jurisdiction";

/// Accumulated answers for one questionnaire run: question id -> value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet {
    values: BTreeMap<String, String>,
}

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question_id: impl Into<String>, value: impl Into<String>) {
        self.values.insert(question_id.into(), value.into());
    }

    pub fn get(&self, question_id: &str) -> Option<&str> {
        self.values.get(question_id).map(String::as_str)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.values.contains_key(question_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The derived jurisdiction, if a postcode has been answered.
    pub fn jurisdiction(&self) -> Option<Jurisdiction> {
        self.get(JURISDICTION_KEY).and_then(|v| v.parse().ok())
    }

    pub(crate) fn set_jurisdiction(&mut self, jurisdiction: Jurisdiction) {
        self.insert(JURISDICTION_KEY, jurisdiction.as_str());
    }
}
