//! crates/study_gate_core/src/scoring.rs
//!
//! Pure scoring of an assessment. No I/O and no store dependency.

use crate::domain::{AssessmentResult, Question, Rating};
use std::collections::BTreeSet;

/// Band thresholds, expressed as tenths of the question count.
const EXCELLENT_TENTHS: usize = 9;
const VERY_GOOD_TENTHS: usize = 7;

/// Scores `answers` against `questions` by index.
///
/// Comparison is exact string equality. An index with no answer counts as
/// incorrect, and answers beyond the question count are ignored.
pub fn score(questions: &[Question], answers: &[Option<String>]) -> AssessmentResult {
    let mut correct = 0;
    let mut weaknesses = BTreeSet::new();

    for (i, question) in questions.iter().enumerate() {
        match answers.get(i).and_then(Option::as_deref) {
            Some(answer) if answer == question.correct => correct += 1,
            _ => {
                weaknesses.insert(question.subject.clone());
            }
        }
    }

    AssessmentResult {
        score: correct,
        total: questions.len(),
        rating: rate(correct, questions.len()),
        weaknesses,
    }
}

/// Maps a score to its band, proportionally to `total`.
pub fn rate(score: usize, total: usize) -> Rating {
    if total == 0 {
        return Rating::NeedsEffort;
    }
    let scaled = score.saturating_mul(10);
    if scaled >= EXCELLENT_TENTHS * total {
        Rating::Excellent
    } else if scaled >= VERY_GOOD_TENTHS * total {
        Rating::VeryGood
    } else {
        Rating::NeedsEffort
    }
}
