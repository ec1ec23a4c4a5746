//! ComplianceFilter: repetition avoidance, disclosure budget, required acknowledgment and the
//! one-time concern alert.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classifier::similarity::max_similarity;
use crate::config::ComplianceConfig;
use crate::memory::MemoryStore;
use crate::shared::{ConcernTag, ConversationState, ReplyCandidate};
use crate::templates::{TemplateProvider, REFOCUS_FALLBACK, SAFETY_FALLBACK};

/// First-person autobiographical phrases that count as self-disclosure.
pub const DISCLOSURE_MARKERS: &[&str] = &[
    "i remember",
    "in my own experience",
    "in my own life",
    "my own experience",
    "i've been through",
    "i have been through",
    "when i was",
    "personally, i",
    "i once",
];

/// Phrases that already acknowledge what the user shared.
pub const ACKNOWLEDGMENT_MARKERS: &[&str] = &[
    "thank you",
    "thanks for",
    "i hear",
    "i'm glad you",
    "i'm really glad",
    "i'm sorry",
    "i'm so sorry",
    "that sounds",
    "it makes sense",
    "i appreciate",
];

const DEFAULT_ACKNOWLEDGMENT: &str = "Thank you for telling me.";

pub fn contains_disclosure(text: &str) -> bool {
    let lower = text.to_lowercase();
    DISCLOSURE_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn has_acknowledgment(text: &str) -> bool {
    let lower = text.to_lowercase();
    ACKNOWLEDGMENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Splits after `.`, `!` or `?`, keeping the punctuation.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Removes every sentence carrying a disclosure marker.
pub fn strip_disclosure(text: &str) -> String {
    sentences(text)
        .into_iter()
        .filter(|s| !contains_disclosure(s))
        .collect::<Vec<_>>()
        .join(" ")
}

fn needs_acknowledgment(candidate: &ReplyCandidate) -> bool {
    candidate
        .concern
        .is_some_and(|c| c.tag.is_safety() || c.tag.is_clinical())
}

/// Result of enforcing compliance on one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceOutcome {
    pub candidate: ReplyCandidate,
    /// The candidate's concern was newly marked shown and should be announced.
    pub alerted: Option<ConcernTag>,
    pub used_fallback: bool,
    pub redraws: usize,
    pub disclosed: bool,
}

/// Summary counters, serialisable for the chat front-end's JSON output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub redraws: usize,
    pub used_fallback: bool,
    pub disclosed: bool,
}

impl From<&ComplianceOutcome> for ComplianceStats {
    fn from(o: &ComplianceOutcome) -> Self {
        Self {
            redraws: o.redraws,
            used_fallback: o.used_fallback,
            disclosed: o.disclosed,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceFilter {
    cfg: ComplianceConfig,
}

impl ComplianceFilter {
    pub fn new(cfg: ComplianceConfig) -> Self {
        Self { cfg }
    }

    /// True when `text` is at least `similarity_threshold` similar to a reply in the window.
    pub fn is_repetitive(&self, text: &str, memory: &MemoryStore) -> bool {
        let recent = memory.recent_replies().take(self.cfg.repetition_window);
        max_similarity(text, recent) >= self.cfg.similarity_threshold
    }

    fn acknowledged<R: Rng + ?Sized>(
        &self,
        mut candidate: ReplyCandidate,
        templates: &dyn TemplateProvider,
        rng: &mut R,
    ) -> ReplyCandidate {
        if needs_acknowledgment(&candidate) && !has_acknowledgment(&candidate.text) {
            let opener = templates
                .templates("acknowledgment")
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ACKNOWLEDGMENT.to_string());
            candidate.text = format!("{} {}", opener.trim(), candidate.text);
        }
        candidate
    }

    fn exhaustion_fallback<R: Rng + ?Sized>(
        &self,
        last: &ReplyCandidate,
        memory: &MemoryStore,
        templates: &dyn TemplateProvider,
        rng: &mut R,
    ) -> ReplyCandidate {
        let is_safety = last.concern.is_some_and(|c| c.tag.is_safety());
        let text = if is_safety {
            SAFETY_FALLBACK.to_string()
        } else {
            let mut pool = templates.templates("refocus");
            pool.shuffle(rng);
            pool.into_iter()
                .map(|t| t.trim().to_string())
                .find(|t| !t.is_empty() && !self.is_repetitive(t, memory))
                .unwrap_or_else(|| REFOCUS_FALLBACK.to_string())
        };
        let mut candidate = ReplyCandidate::new(text, last.handler, "refocus")
            .with_concern(last.concern)
            .with_timing_multiplier(last.timing_multiplier);
        candidate.fallback = true;
        candidate
    }

    /// Runs every check in order. `redraw` asks the generator for another draw of the same plan,
    /// excluding the raw texts already tried.
    pub fn enforce<R, F>(
        &self,
        candidate: ReplyCandidate,
        memory: &MemoryStore,
        state: &mut ConversationState,
        templates: &dyn TemplateProvider,
        rng: &mut R,
        mut redraw: F,
    ) -> ComplianceOutcome
    where
        R: Rng + ?Sized,
        F: FnMut(&mut R, &[String]) -> Option<ReplyCandidate>,
    {
        // 1. Repetition
        let mut tried = vec![candidate.text.clone()];
        let mut current = self.acknowledged(candidate, templates, rng);
        let mut redraws = 0;
        while self.is_repetitive(&current.text, memory) && redraws < self.cfg.max_redraws {
            redraws += 1;
            match redraw(rng, &tried) {
                Some(next) => {
                    tried.push(next.text.clone());
                    current = self.acknowledged(next, templates, rng);
                }
                None => break,
            }
        }
        let mut used_fallback = current.fallback;
        if self.is_repetitive(&current.text, memory) {
            tracing::info!(target: "hearth::compliance", handler = %current.handler, redraws, "Repetition budget exhausted, using refocus fallback");
            current = self.exhaustion_fallback(&current, memory, templates, rng);
            used_fallback = true;
        }

        // 2. Disclosure budget
        let mut disclosed = false;
        if let Some(clause) = current.disclosure.take() {
            let allowed = state.message_count() >= self.cfg.disclosure_after
                && rng.gen_bool(self.cfg.disclosure_probability);
            if allowed {
                let combined = format!("{} {}", current.text, clause.trim());
                if !self.is_repetitive(&combined, memory) {
                    current.text = combined;
                    disclosed = true;
                }
            }
        }
        if !disclosed && contains_disclosure(&current.text) {
            let stripped = strip_disclosure(&current.text);
            if !stripped.is_empty() {
                current.text = stripped;
            }
        }

        // 3. One-time concern alert
        let alerted = match current.concern {
            Some(c) if c.is_alert_eligible() && state.mark_concern_shown(c.tag) => Some(c.tag),
            _ => None,
        };
        if let Some(tag) = alerted {
            tracing::info!(target: "hearth::compliance", concern = %tag, "Concern surfaced for the first time");
        }

        ComplianceOutcome {
            candidate: current,
            alerted,
            used_fallback,
            redraws,
            disclosed,
        }
    }
}
