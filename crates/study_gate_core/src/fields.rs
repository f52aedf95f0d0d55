//! crates/study_gate_core/src/fields.rs
//!
//! Adapters over the free-form string fields submitted by the student.
//!
//! Registration, schedule and answer forms carry arbitrary keys. They are kept
//! as a `FieldMap` so nothing upstream is rejected, and the rest of the core only
//! reads them through the typed views below.

use chrono::Weekday;
use std::collections::BTreeMap;

/// An unvalidated mapping of submitted field names to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(BTreeMap<String, String>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for FieldMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

//=========================================================================================
// Registration Profile
//=========================================================================================

/// The student's registration data. Known keys are `name`, `grade` and `stage`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile(FieldMap);

impl Profile {
    pub fn new(fields: FieldMap) -> Self {
        Self(fields)
    }

    pub fn name(&self) -> Option<&str> {
        self.non_blank("name")
    }

    pub fn grade(&self) -> Option<&str> {
        self.non_blank("grade")
    }

    /// The school stage (primary, preparatory, secondary...).
    pub fn stage(&self) -> Option<&str> {
        self.non_blank("stage")
    }

    pub fn fields(&self) -> &FieldMap {
        &self.0
    }

    fn non_blank(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(str::trim).filter(|v| !v.is_empty())
    }
}

//=========================================================================================
// Weekly Routine
//=========================================================================================

const ROUTINE_PREFIX: &str = "routine_";

/// Weekday keys accepted by the schedule form, by English and Arabic day name.
const WEEKDAY_NAMES: [(Weekday, &str, &str); 7] = [
    (Weekday::Sat, "Saturday", "السبت"),
    (Weekday::Sun, "Sunday", "الأحد"),
    (Weekday::Mon, "Monday", "الاثنين"),
    (Weekday::Tue, "Tuesday", "الثلاثاء"),
    (Weekday::Wed, "Wednesday", "الأربعاء"),
    (Weekday::Thu, "Thursday", "الخميس"),
    (Weekday::Fri, "Friday", "الجمعة"),
];

/// The student's weekly commitments, keyed `routine_<Day>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routine(FieldMap);

impl Routine {
    pub fn new(fields: FieldMap) -> Self {
        Self(fields)
    }

    /// Returns the free-text entry recorded for `day`, if any.
    pub fn entry_for(&self, day: Weekday) -> Option<&str> {
        let (_, english, arabic) = WEEKDAY_NAMES.iter().find(|(d, _, _)| *d == day)?;
        [english, arabic]
            .iter()
            .filter_map(|name| self.0.get(&format!("{ROUTINE_PREFIX}{name}")))
            .map(str::trim)
            .find(|entry| !entry.is_empty())
    }

    pub fn fields(&self) -> &FieldMap {
        &self.0
    }
}

//=========================================================================================
// Answer Sheet
//=========================================================================================

const ELAPSED_KEY: &str = "time_taken";

/// Answers extracted from submitted fields: `q0`, `q1`, ... plus `time_taken`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    pub answers: Vec<Option<String>>,
    pub elapsed_seconds: u64,
}

impl AnswerSheet {
    /// Reads one answer slot per question. Missing slots stay `None`, and an
    /// unparsable elapsed time is treated as zero.
    pub fn from_fields(fields: &FieldMap, question_count: usize) -> Self {
        let answers = (0..question_count)
            .map(|i| fields.get(&format!("q{i}")).map(str::to_string))
            .collect();
        let elapsed_seconds = fields
            .get(ELAPSED_KEY)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
            .unwrap_or(0);
        Self {
            answers,
            elapsed_seconds,
        }
    }
}
