//! Shared types: utterances, concern tags, conversation state, reply candidates and replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::StageConfig;

/// Default capacity of the rolling user-utterance history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

// ---------------------------------------------------------------------------
// Utterance
// ---------------------------------------------------------------------------

/// One user submission. Created once per turn and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    text: String,
    timestamp: DateTime<Utc>,
    turn_index: u64,
}

impl Utterance {
    pub fn new(text: impl Into<String>, turn_index: u64) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            turn_index,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 1-based index of the turn that produced this utterance.
    pub fn turn_index(&self) -> u64 {
        self.turn_index
    }

    /// Length in characters (not bytes); the pacing formula is defined over characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

// ---------------------------------------------------------------------------
// Concerns
// ---------------------------------------------------------------------------

/// Safety, clinical or situational category detected in an utterance.
/// Absence of a concern is `Option::None` wherever a tag is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcernTag {
    Crisis,
    TentativeHarm,
    Medical,
    MentalHealth,
    EatingDisorder,
    SubstanceUse,
    Ptsd,
    TraumaResponse,
    PetIllness,
    WeatherRelated,
    CulturalAdjustment,
    MildGambling,
    Grief,
}

impl ConcernTag {
    pub const ALL: [ConcernTag; 13] = [
        ConcernTag::Crisis,
        ConcernTag::TentativeHarm,
        ConcernTag::Medical,
        ConcernTag::MentalHealth,
        ConcernTag::EatingDisorder,
        ConcernTag::SubstanceUse,
        ConcernTag::Ptsd,
        ConcernTag::TraumaResponse,
        ConcernTag::PetIllness,
        ConcernTag::WeatherRelated,
        ConcernTag::CulturalAdjustment,
        ConcernTag::MildGambling,
        ConcernTag::Grief,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConcernTag::Crisis => "crisis",
            ConcernTag::TentativeHarm => "tentative-harm",
            ConcernTag::Medical => "medical",
            ConcernTag::MentalHealth => "mental-health",
            ConcernTag::EatingDisorder => "eating-disorder",
            ConcernTag::SubstanceUse => "substance-use",
            ConcernTag::Ptsd => "ptsd",
            ConcernTag::TraumaResponse => "trauma-response",
            ConcernTag::PetIllness => "pet-illness",
            ConcernTag::WeatherRelated => "weather-related",
            ConcernTag::CulturalAdjustment => "cultural-adjustment",
            ConcernTag::MildGambling => "mild-gambling",
            ConcernTag::Grief => "grief",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase().replace('_', "-");
        ConcernTag::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Crisis and tentative-harm: routed to the safety handler with zero pacing.
    #[inline]
    pub fn is_safety(&self) -> bool {
        matches!(self, ConcernTag::Crisis | ConcernTag::TentativeHarm)
    }

    /// Tags handled by the clinical-concern handler (or its softer sub-handlers).
    pub fn is_clinical(&self) -> bool {
        matches!(
            self,
            ConcernTag::Medical
                | ConcernTag::MentalHealth
                | ConcernTag::EatingDisorder
                | ConcernTag::SubstanceUse
                | ConcernTag::Ptsd
                | ConcernTag::TraumaResponse
                | ConcernTag::MildGambling
        )
    }

    pub fn supports_severity(&self) -> bool {
        matches!(self, ConcernTag::SubstanceUse | ConcernTag::Ptsd)
    }
}

impl std::fmt::Display for ConcernTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-tier severity attached to tags that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Maps a marker score onto a tier: 0–1 mild, 2–3 moderate, 4+ severe.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=1 => Severity::Mild,
            2..=3 => Severity::Moderate,
            _ => Severity::Severe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

/// The single best-fit concern for an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concern {
    pub tag: ConcernTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Number of distinct theme patterns that matched.
    #[serde(default)]
    pub theme_intensity: u8,
}

impl Concern {
    pub fn new(tag: ConcernTag) -> Self {
        Self {
            tag,
            severity: None,
            theme_intensity: 1,
        }
    }

    /// Attaches a tier; ignored for tags that have none.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        if self.tag.supports_severity() {
            self.severity = Some(severity);
        }
        self
    }

    /// `ptsd-mild`, `substance-use-mild` and `mild-gambling` surface but never alert.
    pub fn is_mild_variant(&self) -> bool {
        self.tag == ConcernTag::MildGambling || self.severity == Some(Severity::Mild)
    }

    /// Whether surfacing this concern should fire the one-time external notification.
    pub fn is_alert_eligible(&self) -> bool {
        if self.is_mild_variant() {
            return false;
        }
        matches!(
            self.tag,
            ConcernTag::Crisis
                | ConcernTag::TentativeHarm
                | ConcernTag::Medical
                | ConcernTag::MentalHealth
                | ConcernTag::EatingDisorder
                | ConcernTag::SubstanceUse
                | ConcernTag::Ptsd
        )
    }

    /// Label with severity suffix, e.g. `ptsd-mild`.
    pub fn label(&self) -> String {
        match self.severity {
            Some(sev) => format!("{}-{}", self.tag.as_str(), sev.as_str()),
            None => self.tag.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation stage & state
// ---------------------------------------------------------------------------

/// Coarse conversational phase. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Opening,
    Exploration,
    Deepening,
}

impl Stage {
    /// Stage implied by a message count under the configured thresholds.
    pub fn for_count(message_count: u64, thresholds: &StageConfig) -> Self {
        if message_count >= thresholds.deepening_at {
            Stage::Deepening
        } else if message_count >= thresholds.exploration_at {
            Stage::Exploration
        } else {
            Stage::Opening
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Opening => "opening",
            Stage::Exploration => "exploration",
            Stage::Deepening => "deepening",
        }
    }
}

/// Per-session conversation state. Mutated only by the pipeline, one turn at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    stage: Stage,
    message_count: u64,
    introduction_made: bool,
    history: VecDeque<Utterance>,
    history_capacity: usize,
    shown_concerns: BTreeSet<ConcernTag>,
    client_preferences: BTreeMap<String, String>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stage: Stage::Opening,
            message_count: 0,
            introduction_made: false,
            history: VecDeque::with_capacity(capacity),
            history_capacity: capacity,
            shown_concerns: BTreeSet::new(),
            client_preferences: BTreeMap::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn introduction_made(&self) -> bool {
        self.introduction_made
    }

    /// Recent user utterances, oldest first. Includes the current turn once `begin_turn` ran.
    pub fn history(&self) -> &VecDeque<Utterance> {
        &self.history
    }

    pub fn shown_concerns(&self) -> &BTreeSet<ConcernTag> {
        &self.shown_concerns
    }

    pub fn has_shown(&self, tag: ConcernTag) -> bool {
        self.shown_concerns.contains(&tag)
    }

    pub fn client_preferences(&self) -> &BTreeMap<String, String> {
        &self.client_preferences
    }

    /// Counts the turn and appends it to history. Runs before anything else in a turn.
    pub(crate) fn begin_turn(&mut self, text: &str) -> Utterance {
        self.message_count += 1;
        let utterance = Utterance::new(text, self.message_count);
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(utterance.clone());
        utterance
    }

    /// Re-evaluates the stage from the message count; never regresses.
    pub(crate) fn advance_stage(&mut self, thresholds: &StageConfig) -> bool {
        let next = Stage::for_count(self.message_count, thresholds).max(self.stage);
        let changed = next != self.stage;
        self.stage = next;
        changed
    }

    pub(crate) fn mark_introduced(&mut self) {
        self.introduction_made = true;
    }

    /// Returns true only the first time a tag is marked.
    pub(crate) fn mark_concern_shown(&mut self, tag: ConcernTag) -> bool {
        self.shown_concerns.insert(tag)
    }

    pub(crate) fn remember_preference(&mut self, key: &str, value: &str) {
        self.client_preferences
            .insert(key.to_string(), value.to_string());
    }
}

// ---------------------------------------------------------------------------
// Handlers, candidates and replies
// ---------------------------------------------------------------------------

/// Identifier of the handler that produced a reply, in router precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerId {
    IdentityRedirect,
    Deescalation,
    FeedbackLoop,
    Validation,
    Safety,
    Situational,
    PetIllness,
    Grief,
    Clinical,
    SoftReflection,
    DefensiveDeescalation,
    Introduction,
    PersonalSharing,
    SmallTalk,
    Reflection,
    Adaptive,
}

impl HandlerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerId::IdentityRedirect => "identity_redirect",
            HandlerId::Deescalation => "deescalation",
            HandlerId::FeedbackLoop => "feedback_loop",
            HandlerId::Validation => "validation",
            HandlerId::Safety => "safety",
            HandlerId::Situational => "situational",
            HandlerId::PetIllness => "pet_illness",
            HandlerId::Grief => "grief",
            HandlerId::Clinical => "clinical",
            HandlerId::SoftReflection => "soft_reflection",
            HandlerId::DefensiveDeescalation => "defensive_deescalation",
            HandlerId::Introduction => "introduction",
            HandlerId::PersonalSharing => "personal_sharing",
            HandlerId::SmallTalk => "small_talk",
            HandlerId::Reflection => "reflection",
            HandlerId::Adaptive => "adaptive",
        }
    }

    /// Precedence level (1 = evaluated first).
    pub fn level(&self) -> u8 {
        match self {
            HandlerId::IdentityRedirect => 1,
            HandlerId::Deescalation => 2,
            HandlerId::FeedbackLoop => 3,
            HandlerId::Validation => 4,
            HandlerId::Safety => 5,
            HandlerId::Situational => 6,
            HandlerId::PetIllness | HandlerId::Grief => 7,
            HandlerId::Clinical | HandlerId::SoftReflection => 8,
            HandlerId::DefensiveDeescalation => 9,
            HandlerId::Introduction => 10,
            HandlerId::PersonalSharing => 11,
            HandlerId::SmallTalk => 12,
            HandlerId::Reflection => 13,
            HandlerId::Adaptive => 14,
        }
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Draft reply produced by a handler, before compliance resolves it into a `Reply`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyCandidate {
    pub text: String,
    pub handler: HandlerId,
    pub concern: Option<Concern>,
    /// Applied on top of the estimated delay. 0.0 means "send immediately".
    pub timing_multiplier: f32,
    /// Pool the text was drawn from (`composed` for algorithmic replies).
    pub pool_key: String,
    /// Optional self-referential clause; the compliance filter decides whether it survives.
    pub disclosure: Option<String>,
    /// True when the text is a compliance or error fallback rather than a handler draw.
    pub fallback: bool,
}

impl ReplyCandidate {
    pub fn new(text: impl Into<String>, handler: HandlerId, pool_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handler,
            concern: None,
            timing_multiplier: 1.0,
            pool_key: pool_key.into(),
            disclosure: None,
            fallback: false,
        }
    }

    pub fn with_concern(mut self, concern: Option<Concern>) -> Self {
        self.concern = concern;
        self
    }

    pub fn with_timing_multiplier(mut self, multiplier: f32) -> Self {
        self.timing_multiplier = multiplier;
        self
    }

    pub fn with_disclosure(mut self, disclosure: Option<String>) -> Self {
        self.disclosure = disclosure;
        self
    }
}

/// Final emitted reply. Owned by the caller once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub text: String,
    pub concern_tag: Option<ConcernTag>,
    pub delay_ms: u64,
    pub handler: HandlerId,
    /// True when the text came from a fallback path (compliance exhaustion or error recovery).
    pub fallback: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>, concern_tag: Option<ConcernTag>, delay_ms: u64, handler: HandlerId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            concern_tag,
            delay_ms,
            handler,
            fallback: false,
        }
    }
}
