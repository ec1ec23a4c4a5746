//! Severity sub-detectors: substance-use and PTSD tiers, grief severity, trauma intensity.
//!
//! Grief severity reads the current message only. Substance-use, PTSD and trauma also look at
//! the three most recent earlier turns, which can raise (never lower) a score by one step. All
//! markers come from the shared pattern sets, so the concern rules and the scores agree on wording.

use serde::{Deserialize, Serialize};

use super::patterns::{self, PatternSet, PatternSets};
use crate::shared::{ConcernTag, Severity};

/// How many earlier turns the severity detectors consult.
pub const SEVERITY_WINDOW: usize = 3;

/// Grief signal strength for the current message (0 = none, 3 = acute).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GriefSignals {
    pub severity: u8,
}

/// Trauma signal strength (0 = none, 3 = intense).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraumaSignals {
    pub intensity: u8,
}

fn window_mentions(window: &[&str], sets: &[&PatternSet]) -> bool {
    window
        .iter()
        .take(SEVERITY_WINDOW)
        .any(|t| sets.iter().any(|s| s.is_match(t)))
}

/// Trigger weights plus the extra tier markers.
fn tier_score(trigger: &PatternSet, extra: &PatternSet, text: &str) -> u8 {
    trigger.score(text).saturating_add(extra.score(text))
}

/// Three-tier substance-use severity. Earlier turns that also mention substances add one point.
pub fn substance_severity(sets: &PatternSets, text: &str, window: &[&str]) -> Severity {
    let mention = sets.get(patterns::SUBSTANCE);
    let mut score = tier_score(mention, sets.get(patterns::SUBSTANCE_SEVERITY), text);
    if window_mentions(window, &[mention]) {
        score = score.saturating_add(1);
    }
    Severity::from_score(score)
}

/// Three-tier PTSD severity. Earlier turns with PTSD markers add one point.
pub fn ptsd_severity(sets: &PatternSets, text: &str, window: &[&str]) -> Severity {
    let trigger = sets.get(patterns::PTSD);
    let extra = sets.get(patterns::PTSD_SEVERITY);
    let mut score = tier_score(trigger, extra, text);
    if window_mentions(window, &[trigger, extra]) {
        score = score.saturating_add(1);
    }
    Severity::from_score(score)
}

/// Tier for concern tags that carry one.
pub fn concern_severity(
    sets: &PatternSets,
    tag: ConcernTag,
    text: &str,
    window: &[&str],
) -> Option<Severity> {
    match tag {
        ConcernTag::SubstanceUse => Some(substance_severity(sets, text, window)),
        ConcernTag::Ptsd => Some(ptsd_severity(sets, text, window)),
        _ => None,
    }
}

/// Grief severity from the current message only.
pub fn grief_signals(sets: &PatternSets, text: &str) -> GriefSignals {
    let hits = sets.get(patterns::GRIEF).hits(text);
    GriefSignals {
        severity: hits.min(3) as u8,
    }
}

/// Trauma intensity: distinct trauma and PTSD markers in the current message, plus one when the
/// window has any.
pub fn trauma_signals(sets: &PatternSets, text: &str, window: &[&str]) -> TraumaSignals {
    let markers = [sets.get(patterns::TRAUMA), sets.get(patterns::PTSD)];
    let hits: usize = markers.iter().map(|s| s.hits(text)).sum();
    if hits == 0 {
        return TraumaSignals::default();
    }
    let bonus = usize::from(window_mentions(window, &markers));
    TraumaSignals {
        intensity: (hits + bonus).min(3) as u8,
    }
}
