//! Reply handlers, one per precedence level.
//!
//! A handler inspects the turn and either returns `NoMatch` (so the router moves on) or a
//! `ReplyPlan` naming the pools to draw from and how to compose the reply.

use std::collections::BTreeMap;

use crate::classifier::{Classification, Entities, SpecialCases, TurnSignals};
use crate::config::ReflectionConfig;
use crate::memory::MemoryStore;
use crate::shared::{Concern, ConcernTag, ConversationState, HandlerId, Severity, Stage};

/// Everything a handler may look at for one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub text: &'a str,
    pub classification: &'a Classification,
    pub special: &'a SpecialCases,
    pub signals: &'a TurnSignals,
    pub entities: &'a Entities,
    pub state: &'a ConversationState,
    pub memory: &'a MemoryStore,
    pub reflection: &'a ReflectionConfig,
}

impl TurnContext<'_> {
    fn safety_present(&self) -> bool {
        self.classification.is_safety()
    }

    fn concern(&self) -> Option<Concern> {
        self.classification.concern
    }

    /// Placeholder values: current entities, the stated feeling, then persistent memory.
    pub fn placeholder_values(&self) -> BTreeMap<String, String> {
        let mut values: BTreeMap<String, String> = self
            .entities
            .pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(feeling) = &self.signals.stated_feeling {
            values.insert("feeling".into(), feeling.clone());
        }
        if !values.contains_key("feeling") {
            if let Some(f) = self.memory.dominant_feeling() {
                values.insert("feeling".into(), f.to_string());
            }
        }
        if !values.contains_key("topic") {
            if let Some(t) = self.memory.dominant_topic() {
                values.insert("topic".into(), t.to_string());
            }
        }
        values
    }
}

/// How the generator builds text for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// Uniform draw from the first usable pool.
    Template,
    /// Entity clause + emotion clause + follow-up question.
    Reflection,
}

/// What the selected handler wants generated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPlan {
    pub handler: HandlerId,
    /// Pool keys, most specific first. `generic` is always tried last by the generator.
    pub pools: Vec<String>,
    pub composition: Composition,
    pub concern: Option<Concern>,
    pub timing_multiplier: f32,
    /// Whether a disclosure clause may be offered to the compliance filter.
    pub allow_disclosure: bool,
    pub values: BTreeMap<String, String>,
}

impl ReplyPlan {
    pub fn template(handler: HandlerId, pools: &[&str], ctx: &TurnContext<'_>) -> Self {
        Self {
            handler,
            pools: pools.iter().map(|p| p.to_string()).collect(),
            composition: Composition::Template,
            concern: None,
            timing_multiplier: 1.0,
            allow_disclosure: false,
            values: ctx.placeholder_values(),
        }
    }

    pub fn with_concern(mut self, concern: Option<Concern>) -> Self {
        self.concern = concern;
        self
    }

    fn with_disclosure(mut self) -> Self {
        self.allow_disclosure = true;
        self
    }
}

/// Tagged result of evaluating one handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    Matched(ReplyPlan),
    NoMatch,
}

impl HandlerResult {
    fn when(condition: bool, plan: impl FnOnce() -> ReplyPlan) -> Self {
        if condition {
            HandlerResult::Matched(plan())
        } else {
            HandlerResult::NoMatch
        }
    }
}

pub trait Handler: Send + Sync {
    fn id(&self) -> HandlerId;
    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult;
}

// Levels 1–4 stand down while a safety concern is present, so crisis language always reaches
// the safety handler.

pub struct IdentityRedirect;

impl Handler for IdentityRedirect {
    fn id(&self) -> HandlerId {
        HandlerId::IdentityRedirect
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(ctx.special.is_identity_question && !ctx.safety_present(), || {
            ReplyPlan::template(self.id(), &["identity"], ctx)
        })
    }
}

pub struct Deescalation;

impl Handler for Deescalation {
    fn id(&self) -> HandlerId {
        HandlerId::Deescalation
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(
            ctx.special.is_sarcasm_or_frustration && !ctx.safety_present(),
            || ReplyPlan::template(self.id(), &["deescalation"], ctx),
        )
    }
}

pub struct FeedbackLoop;

impl Handler for FeedbackLoop {
    fn id(&self) -> HandlerId {
        HandlerId::FeedbackLoop
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(
            ctx.special.is_feedback_loop_complaint && !ctx.safety_present(),
            || ReplyPlan::template(self.id(), &["feedback_loop"], ctx),
        )
    }
}

pub struct Validation;

impl Handler for Validation {
    fn id(&self) -> HandlerId {
        HandlerId::Validation
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(
            ctx.signals.stated_feeling.is_some() && !ctx.safety_present(),
            || ReplyPlan::template(self.id(), &["validation"], ctx).with_concern(ctx.concern()),
        )
    }
}

pub struct Safety;

impl Handler for Safety {
    fn id(&self) -> HandlerId {
        HandlerId::Safety
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let pool = match ctx.classification.tag() {
            Some(ConcernTag::Crisis) => "safety.crisis",
            Some(ConcernTag::TentativeHarm) => "safety.tentative",
            _ => return HandlerResult::NoMatch,
        };
        let mut plan = ReplyPlan::template(self.id(), &[pool], ctx).with_concern(ctx.concern());
        plan.timing_multiplier = 0.0;
        HandlerResult::Matched(plan)
    }
}

pub struct Situational;

impl Handler for Situational {
    fn id(&self) -> HandlerId {
        HandlerId::Situational
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let tag = ctx.classification.tag();
        let pool = if ctx.special.is_inpatient_question {
            "situational.inpatient"
        } else if ctx.special.is_weather_related || tag == Some(ConcernTag::WeatherRelated) {
            "situational.weather"
        } else if ctx.special.is_cultural_adjustment || tag == Some(ConcernTag::CulturalAdjustment) {
            "situational.cultural"
        } else {
            return HandlerResult::NoMatch;
        };
        let concern = ctx.concern().filter(|c| {
            matches!(
                c.tag,
                ConcernTag::WeatherRelated | ConcernTag::CulturalAdjustment
            )
        });
        HandlerResult::Matched(ReplyPlan::template(self.id(), &[pool], ctx).with_concern(concern))
    }
}

pub struct PetIllness;

impl Handler for PetIllness {
    fn id(&self) -> HandlerId {
        HandlerId::PetIllness
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(
            ctx.classification.tag() == Some(ConcernTag::PetIllness),
            || ReplyPlan::template(self.id(), &["pet_illness"], ctx).with_concern(ctx.concern()),
        )
    }
}

/// Grief-aware handler. Also fires on strong grief signals when no concern tag was assigned.
pub struct Grief;

impl Handler for Grief {
    fn id(&self) -> HandlerId {
        HandlerId::Grief
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let tagged = ctx.classification.tag() == Some(ConcernTag::Grief);
        let signalled = ctx.concern().is_none() && ctx.classification.grief.severity >= 2;
        HandlerResult::when(tagged || signalled, || {
            ReplyPlan::template(self.id(), &["grief"], ctx).with_concern(ctx.concern())
        })
    }
}

fn clinical_pool(tag: ConcernTag) -> Option<&'static str> {
    match tag {
        ConcernTag::Medical => Some("clinical.medical"),
        ConcernTag::MentalHealth => Some("clinical.mental_health"),
        ConcernTag::EatingDisorder => Some("clinical.eating_disorder"),
        ConcernTag::SubstanceUse => Some("clinical.substance_use"),
        ConcernTag::Ptsd => Some("clinical.ptsd"),
        _ => None,
    }
}

fn soft_pool(concern: &Concern) -> Option<&'static str> {
    match (concern.tag, concern.severity) {
        (ConcernTag::MildGambling, _) => Some("soft.gambling"),
        (ConcernTag::TraumaResponse, _) => Some("soft.trauma"),
        (ConcernTag::Ptsd, Some(Severity::Mild)) => Some("soft.ptsd"),
        (ConcernTag::SubstanceUse, Some(Severity::Mild)) => Some("soft.substance"),
        _ => None,
    }
}

pub struct Clinical;

impl Handler for Clinical {
    fn id(&self) -> HandlerId {
        HandlerId::Clinical
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let Some(concern) = ctx.concern() else {
            return HandlerResult::NoMatch;
        };
        if soft_pool(&concern).is_some() {
            return HandlerResult::NoMatch;
        }
        match clinical_pool(concern.tag) {
            Some(pool) => HandlerResult::Matched(
                ReplyPlan::template(self.id(), &[pool], ctx).with_concern(Some(concern)),
            ),
            None => HandlerResult::NoMatch,
        }
    }
}

/// Softer, non-alerting reflection for mild variants and trauma responses.
pub struct SoftReflection;

impl Handler for SoftReflection {
    fn id(&self) -> HandlerId {
        HandlerId::SoftReflection
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let Some(concern) = ctx.concern() else {
            return HandlerResult::NoMatch;
        };
        match soft_pool(&concern) {
            Some(pool) => HandlerResult::Matched(
                ReplyPlan::template(self.id(), &[pool], ctx).with_concern(Some(concern)),
            ),
            None => HandlerResult::NoMatch,
        }
    }
}

pub struct DefensiveDeescalation;

impl Handler for DefensiveDeescalation {
    fn id(&self) -> HandlerId {
        HandlerId::DefensiveDeescalation
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(ctx.signals.defensive_reaction, || {
            ReplyPlan::template(self.id(), &["defensive"], ctx)
        })
    }
}

pub struct Introduction;

impl Handler for Introduction {
    fn id(&self) -> HandlerId {
        HandlerId::Introduction
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(
            ctx.signals.greeting && !ctx.state.introduction_made(),
            || ReplyPlan::template(self.id(), &["introduction"], ctx),
        )
    }
}

pub struct PersonalSharing;

impl Handler for PersonalSharing {
    fn id(&self) -> HandlerId {
        HandlerId::PersonalSharing
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(ctx.signals.personal_sharing, || {
            ReplyPlan::template(self.id(), &["personal_sharing"], ctx).with_disclosure()
        })
    }
}

pub struct SmallTalk;

impl Handler for SmallTalk {
    fn id(&self) -> HandlerId {
        HandlerId::SmallTalk
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        HandlerResult::when(ctx.signals.is_small_talk(), || {
            let pools: &[&str] = if ctx.entities.team.is_some() {
                &["small_talk.sports", "small_talk"]
            } else {
                &["small_talk"]
            };
            ReplyPlan::template(self.id(), pools, ctx).with_disclosure()
        })
    }
}

/// Early in the conversation reflection is tried every turn; later only every
/// `late_interval`-th message.
pub fn reflection_window_open(message_count: u64, cfg: &ReflectionConfig) -> bool {
    message_count < cfg.early_threshold || message_count % cfg.late_interval.max(1) == 0
}

pub struct Reflection;

impl Handler for Reflection {
    fn id(&self) -> HandlerId {
        HandlerId::Reflection
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let open = reflection_window_open(ctx.state.message_count(), ctx.reflection);
        HandlerResult::when(open && ctx.signals.reflection_trigger, || {
            let mut plan =
                ReplyPlan::template(self.id(), &["clause.topic", "clause.emotion", "follow_up"], ctx)
                    .with_disclosure();
            plan.composition = Composition::Reflection;
            plan
        })
    }
}

/// Always matches.
pub struct Adaptive;

impl Handler for Adaptive {
    fn id(&self) -> HandlerId {
        HandlerId::Adaptive
    }

    fn evaluate(&self, ctx: &TurnContext<'_>) -> HandlerResult {
        let stage_pool = match ctx.state.stage() {
            Stage::Opening => "adaptive.opening",
            Stage::Exploration => "adaptive.exploration",
            Stage::Deepening => "adaptive.deepening",
        };
        HandlerResult::Matched(
            ReplyPlan::template(self.id(), &[stage_pool, "adaptive"], ctx).with_disclosure(),
        )
    }
}

/// The full handler list in precedence order.
pub fn standard_handlers() -> Vec<Box<dyn Handler>> {
    vec![
        Box::new(IdentityRedirect),
        Box::new(Deescalation),
        Box::new(FeedbackLoop),
        Box::new(Validation),
        Box::new(Safety),
        Box::new(Situational),
        Box::new(PetIllness),
        Box::new(Grief),
        Box::new(Clinical),
        Box::new(SoftReflection),
        Box::new(DefensiveDeescalation),
        Box::new(Introduction),
        Box::new(PersonalSharing),
        Box::new(SmallTalk),
        Box::new(Reflection),
        Box::new(Adaptive),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_list_is_in_level_order() {
        let levels: Vec<u8> = standard_handlers().iter().map(|h| h.id().level()).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(levels.first(), Some(&1));
        assert_eq!(levels.last(), Some(&14));
    }

    #[test]
    fn reflection_window() {
        let cfg = ReflectionConfig {
            early_threshold: 10,
            late_interval: 3,
        };
        assert!(reflection_window_open(1, &cfg));
        assert!(reflection_window_open(9, &cfg));
        assert!(!reflection_window_open(10, &cfg));
        assert!(!reflection_window_open(11, &cfg));
        assert!(reflection_window_open(12, &cfg));
    }

    #[test]
    fn soft_and_clinical_pools_are_disjoint() {
        let mild = Concern::new(ConcernTag::Ptsd).with_severity(Severity::Mild);
        let severe = Concern::new(ConcernTag::Ptsd).with_severity(Severity::Severe);
        assert_eq!(soft_pool(&mild), Some("soft.ptsd"));
        assert_eq!(soft_pool(&severe), None);
        assert_eq!(clinical_pool(severe.tag), Some("clinical.ptsd"));
        assert_eq!(soft_pool(&Concern::new(ConcernTag::TraumaResponse)), Some("soft.trauma"));
    }
}
