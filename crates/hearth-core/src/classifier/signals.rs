//! Router-level turn signals that are neither concerns nor special cases.
//!
//! Keyword batteries come from the shared pattern sets; only the stated-feeling capture is local.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::entities::Entities;
use super::patterns::{self, PatternSets};
use crate::shared::Stage;

/// Small-talk score at which the small-talk handler is eligible.
pub const SMALL_TALK_THRESHOLD: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSignals {
    /// Feeling word from an explicit "I feel / I'm ..." statement.
    pub stated_feeling: Option<String>,
    pub defensive_reaction: bool,
    pub greeting: bool,
    pub personal_sharing: bool,
    pub small_talk_score: u8,
    pub reflection_trigger: bool,
    pub political_emotion: bool,
}

impl TurnSignals {
    pub fn is_small_talk(&self) -> bool {
        self.small_talk_score >= SMALL_TALK_THRESHOLD
    }
}

static STATED_FEELING_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bi(?:'m| am| feel| have been feeling| am feeling|'m feeling|'ve been feeling)\s+(?:so\s+|really\s+|very\s+|just\s+|pretty\s+|kind of\s+|kinda\s+)?(sad|down|depressed|anxious|nervous|worried|scared|afraid|angry|furious|frustrated|lonely|alone|isolated|overwhelmed|stressed|exhausted|drained|hopeless|helpless|hurt|numb|empty|guilty|ashamed|miserable|awful|terrible|lost)\b",
    )
    .ok()
});

fn stated_feeling(text: &str) -> Option<String> {
    let re = STATED_FEELING_RE.as_ref()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Small talk weighs more early in the conversation.
pub fn small_talk_score(sets: &PatternSets, text: &str, stage: Stage, entities: &Entities) -> u8 {
    let mut hits = sets.get(patterns::SMALL_TALK).hits(text);
    if entities.team.is_some() {
        hits += 1;
    }
    let weight = match stage {
        Stage::Opening => 3,
        Stage::Exploration => 2,
        Stage::Deepening => 1,
    };
    (hits * weight).min(u8::MAX as usize) as u8
}

/// Detects all turn signals. `last_reply` is the agent's previous reply, if any.
pub fn detect_signals(
    sets: &PatternSets,
    text: &str,
    last_reply: Option<&str>,
    stage: Stage,
    entities: &Entities,
) -> TurnSignals {
    let matches = |name: &str| sets.get(name).is_match(text);
    let defensive_reaction = last_reply.is_some_and(|r| sets.get(patterns::SUGGESTION).is_match(r))
        && matches(patterns::DEFENSIVE);
    TurnSignals {
        stated_feeling: stated_feeling(text),
        defensive_reaction,
        greeting: matches(patterns::GREETING) && word_count(text) <= 6,
        personal_sharing: matches(patterns::PERSONAL_SHARING) && word_count(text) >= 5,
        small_talk_score: small_talk_score(sets, text, stage, entities),
        reflection_trigger: entities.feeling.is_some() || matches(patterns::REFLECTION),
        political_emotion: matches(patterns::POLITICAL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::entities::extract_entities;

    fn signals(text: &str, last_reply: Option<&str>, stage: Stage) -> TurnSignals {
        let entities = extract_entities(text).unwrap();
        detect_signals(&PatternSets::builtin(), text, last_reply, stage, &entities)
    }

    #[test]
    fn stated_feeling_pattern_compiles() {
        assert!(STATED_FEELING_RE.is_some());
    }

    #[test]
    fn stated_feeling_captures_the_word() {
        let s = signals("Honestly I'm so overwhelmed right now", None, Stage::Exploration);
        assert_eq!(s.stated_feeling.as_deref(), Some("overwhelmed"));
        assert!(signals("I just lost my dog", None, Stage::Opening).stated_feeling.is_none());
    }

    #[test]
    fn defensive_needs_a_prior_suggestion() {
        let text = "I already tried that, it doesn't work";
        assert!(!signals(text, None, Stage::Exploration).defensive_reaction);
        assert!(
            signals(text, Some("Have you tried going for a short walk?"), Stage::Exploration)
                .defensive_reaction
        );
    }

    #[test]
    fn greeting_is_short() {
        assert!(signals("hi", None, Stage::Opening).greeting);
        assert!(!signals("hi, so I wanted to talk about everything going on at work", None, Stage::Opening).greeting);
    }

    #[test]
    fn small_talk_weighs_more_early() {
        let text = "did you watch the game?";
        assert!(signals(text, None, Stage::Opening).is_small_talk());
        assert!(signals(text, None, Stage::Exploration).is_small_talk());
        assert!(!signals(text, None, Stage::Deepening).is_small_talk());
    }

    #[test]
    fn political_emotion() {
        assert!(signals("the election has me so angry", None, Stage::Exploration).political_emotion);
    }

    #[test]
    fn greeting_follows_an_overridden_set() {
        let overrides = toml::from_str(r#"greeting = ['^\s*(kia ora|aloha)\b']"#).unwrap();
        let sets = PatternSets::builtin().with_overrides(&overrides).unwrap();
        let entities = Entities::default();
        assert!(detect_signals(&sets, "kia ora", None, Stage::Opening, &entities).greeting);
        assert!(!detect_signals(&sets, "hello", None, Stage::Opening, &entities).greeting);
    }
}
