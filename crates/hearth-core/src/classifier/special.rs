//! SpecialCaseClassifier: situational flags orthogonal to concern tags.
//!
//! Each flag reads a named set from `patterns`; weather and cultural adjustment share their sets
//! with the concern rules of the same name.

use serde::{Deserialize, Serialize};

use super::patterns::{self, PatternSets};
use super::similarity::similarity;

/// How many earlier user turns the feedback-loop check inspects.
const FEEDBACK_LOOKBACK: usize = 3;
/// A complaint about going in circles needs this many earlier turns to look back on.
const FEEDBACK_MIN_PREVIOUS: usize = 2;
const NEAR_DUPLICATE: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialCases {
    pub is_inpatient_question: bool,
    pub is_weather_related: bool,
    pub is_cultural_adjustment: bool,
    pub is_sarcasm_or_frustration: bool,
    pub is_feedback_loop_complaint: bool,
    pub is_identity_question: bool,
}

impl SpecialCases {
    /// Any of the flags handled by the situational template handler.
    pub fn is_situational(&self) -> bool {
        self.is_inpatient_question || self.is_weather_related || self.is_cultural_adjustment
    }
}

/// Two or more shouted words of three letters or more.
fn has_shouting(text: &str) -> bool {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()))
        .filter(|w| w.chars().count() >= 3 && w.chars().all(|c| c.is_uppercase()))
        .count()
        >= 2
}

fn has_escalation(sets: &PatternSets, text: &str) -> bool {
    has_shouting(text) || sets.get(patterns::ESCALATION).is_match(text)
}

/// True when at least two of the previous turns are near-duplicates of each other.
fn previous_turns_repeat(previous: &[&str]) -> bool {
    previous.iter().enumerate().any(|(i, a)| {
        previous[i + 1..]
            .iter()
            .any(|b| similarity(a, b) >= NEAR_DUPLICATE)
    })
}

/// Complaint wording now, backed by the earlier turns: they repeat each other or already carry
/// escalation. The current message's own tone does not count.
fn is_feedback_loop(sets: &PatternSets, text: &str, previous: &[&str]) -> bool {
    let previous = &previous[..previous.len().min(FEEDBACK_LOOKBACK)];
    if previous.len() < FEEDBACK_MIN_PREVIOUS
        || !sets.get(patterns::FEEDBACK_COMPLAINT).is_match(text)
    {
        return false;
    }
    previous.iter().any(|p| has_escalation(sets, p)) || previous_turns_repeat(previous)
}

/// Computes all special-case flags. `previous` holds earlier user turns, most recent first.
pub fn classify_special_cases(sets: &PatternSets, text: &str, previous: &[&str]) -> SpecialCases {
    let matches = |name: &str| sets.get(name).is_match(text);
    let cases = SpecialCases {
        is_inpatient_question: matches(patterns::INPATIENT) && matches(patterns::QUESTION),
        is_weather_related: matches(patterns::WEATHER),
        is_cultural_adjustment: matches(patterns::CULTURAL),
        is_sarcasm_or_frustration: matches(patterns::SARCASM),
        is_feedback_loop_complaint: is_feedback_loop(sets, text, previous),
        is_identity_question: matches(patterns::IDENTITY),
    };
    if cases != SpecialCases::default() {
        tracing::debug!(target: "hearth::special", ?cases, "Special cases detected");
    }
    cases
}
