//! Turn orchestration: classify → route → generate → comply → pace.
//!
//! - `router`: PriorityRouter over the handler list
//! - `handlers`: one handler per precedence level
//! - `generator`: ResponseCandidateGenerator
//! - `compliance`: ComplianceFilter
//! - `timing`: TimingEstimator
//!
//! `Pipeline::process_utterance` is the only entry point a host needs. It never fails: any stage
//! that panics (host-supplied detectors, corpora and alert sinks included) is contained and the
//! turn ends with a fallback reply. Classification runs before the rest of the turn, so a crisis
//! or tentative-harm message that hits a failure still gets the safety fallback, unpaced, with its
//! one-time alert.

pub mod compliance;
pub mod generator;
pub mod handlers;
pub mod router;
pub mod timing;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::alerts::{ConcernAlert, ConcernAlertSink, NoopAlertSink};
use crate::classifier::severity::SEVERITY_WINDOW;
use crate::classifier::signals::detect_signals;
use crate::classifier::{
    classify_special_cases, extract_entities, Classification, ConcernClassifier, Entities,
    SpecialCases, TurnSignals,
};
use crate::config::HearthConfig;
use crate::error::HearthResult;
use crate::memory::MemoryStore;
use crate::shared::{Concern, ConcernTag, ConversationState, HandlerId, Reply, Utterance};
use crate::templates::{
    BuiltinCorpus, LayeredCorpus, TemplateProvider, TomlCorpus, GENERIC_FALLBACK, SAFETY_FALLBACK,
};

pub use compliance::{ComplianceFilter, ComplianceOutcome, ComplianceStats};
pub use generator::ResponseGenerator;
pub use handlers::{Composition, Handler, HandlerResult, ReplyPlan, TurnContext};
pub use router::PriorityRouter;
pub use timing::{PacingHints, TimingBreakdown, TimingEstimator};

/// Earlier user turns the feedback-loop check looks at.
const SPECIAL_CASE_LOOKBACK: usize = 3;

/// One conversation: state, memory and its own random source. Sessions never share anything.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    state: ConversationState,
    memory: MemoryStore,
    rng: StdRng,
}

impl Session {
    fn new(id: String, config: &HearthConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            state: ConversationState::with_history_capacity(config.history_capacity),
            memory: MemoryStore::with_capacities(
                config.compliance.repetition_window,
                config.history_capacity,
            ),
            rng,
        }
    }

    /// Replaces the random source with a seeded one (reproducible template draws).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }
}

/// Everything decided during one turn. `reply` is what the host shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReport {
    pub reply: Reply,
    pub handler: HandlerId,
    pub classification: Classification,
    pub special_cases: SpecialCases,
    pub signals: TurnSignals,
    pub entities: Entities,
    pub compliance: ComplianceStats,
    pub alerted: Option<ConcernTag>,
    pub timing: Option<TimingBreakdown>,
}

/// The message-orchestration pipeline. Immutable once built; shared across sessions.
pub struct Pipeline {
    config: HearthConfig,
    classifier: ConcernClassifier,
    router: PriorityRouter,
    generator: ResponseGenerator,
    compliance: ComplianceFilter,
    timing: TimingEstimator,
    alerts: Arc<dyn ConcernAlertSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("classifier", &self.classifier)
            .field("router", &self.router)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Resolves every capability once: detector registry, template corpus, estimators.
    pub fn new(config: HearthConfig) -> HearthResult<Self> {
        let templates: Arc<dyn TemplateProvider> = match &config.corpus_path {
            Some(path) => Arc::new(LayeredCorpus::over_builtin(Arc::new(
                TomlCorpus::load_from_path(path)?,
            ))),
            None => Arc::new(BuiltinCorpus),
        };
        let classifier = ConcernClassifier::from_config(&config.detectors)?;
        tracing::info!(
            target: "hearth::pipeline",
            detectors = classifier.registry().len(),
            corpus = templates.name(),
            "Pipeline ready"
        );
        Ok(Self {
            classifier,
            router: PriorityRouter::new(),
            generator: ResponseGenerator::new(templates),
            compliance: ComplianceFilter::new(config.compliance.clone()),
            timing: TimingEstimator::new(config.timing.clone()),
            alerts: Arc::new(NoopAlertSink),
            config,
        })
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateProvider>) -> Self {
        self.generator = ResponseGenerator::new(templates);
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn ConcernAlertSink>) -> Self {
        self.alerts = sink;
        self
    }

    pub fn with_classifier(mut self, classifier: ConcernClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &HearthConfig {
        &self.config
    }

    pub fn timing(&self) -> &TimingEstimator {
        &self.timing
    }

    pub fn new_session(&self) -> Session {
        self.session_with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn session_with_id(&self, id: impl Into<String>) -> Session {
        Session::new(id.into(), &self.config)
    }

    /// Processes one utterance and returns the reply to show.
    pub fn process_utterance(&self, text: &str, session: &mut Session) -> Reply {
        self.process_turn(text, session).reply
    }

    /// Like `process_utterance`, with every intermediate decision attached.
    pub fn process_turn(&self, text: &str, session: &mut Session) -> TurnReport {
        let utterance = session.state.begin_turn(text);
        session.memory.record_utterance(text);
        let classification = self.classify(&utterance, session);

        let report = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_turn(&utterance, classification, session)
        })) {
            Ok(report) => report,
            Err(_) => {
                tracing::error!(target: "hearth::pipeline", session = %session.id, turn = utterance.turn_index(), "Turn failed, emitting fallback reply");
                self.fallback_turn(&utterance, classification, session)
            }
        };

        if session.state.advance_stage(&self.config.stages) {
            tracing::debug!(target: "hearth::pipeline", stage = session.state.stage().as_str(), "Stage advanced");
        }
        report
    }

    /// Classification runs on its own guard so a failure later in the turn still knows the concern.
    fn classify(&self, utterance: &Utterance, session: &Session) -> Classification {
        let window = session.memory.previous_utterances(SEVERITY_WINDOW);
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.classifier.classify(utterance.text(), &window)
        }))
        .unwrap_or_else(|_| {
            tracing::error!(target: "hearth::classifier", session = %session.id, turn = utterance.turn_index(), "Classification failed; treating the turn as unclassified");
            Classification::default()
        })
    }

    fn run_turn(
        &self,
        utterance: &Utterance,
        classification: Classification,
        session: &mut Session,
    ) -> TurnReport {
        let text = utterance.text();

        let patterns = self.classifier.patterns();
        let previous = session.memory.previous_utterances(SPECIAL_CASE_LOOKBACK);
        let special = classify_special_cases(patterns, text, &previous);

        let (entities, entities_ok) = match extract_entities(text) {
            Ok(entities) => (entities, true),
            Err(e) => {
                tracing::warn!(target: "hearth::generator", error = %e, "Entity extraction failed, using the generic pool");
                (Entities::default(), false)
            }
        };
        for (key, value) in entities.pairs() {
            session.state.remember_preference(key, value);
        }
        session.memory.record_entities(&entities);

        let signals = detect_signals(
            patterns,
            text,
            session.memory.last_reply(),
            session.state.stage(),
            &entities,
        );

        let mut plan = {
            let ctx = TurnContext {
                text,
                classification: &classification,
                special: &special,
                signals: &signals,
                entities: &entities,
                state: &session.state,
                memory: &session.memory,
                reflection: &self.config.reflection,
            };
            self.router.dispatch(&ctx)
        };
        if !entities_ok && plan.handler != HandlerId::Safety {
            plan.pools.clear();
        }

        let candidate = self.generator.generate(&plan, &mut session.rng);
        let generator = &self.generator;
        let outcome = self.compliance.enforce(
            candidate,
            &session.memory,
            &mut session.state,
            generator.templates(),
            &mut session.rng,
            |rng, tried| generator.redraw(&plan, rng, tried),
        );

        if let (Some(_), Some(concern)) = (outcome.alerted, outcome.candidate.concern) {
            self.dispatch_alert(&concern, &session.id);
        }

        let hints = PacingHints {
            political_emotion: signals.political_emotion,
            stated_feeling: signals.stated_feeling.is_some(),
        };
        let timing = self.timing.breakdown(
            text,
            classification.tag(),
            classification.grief,
            classification.trauma,
            hints,
        );
        let scale = f64::from(outcome.candidate.timing_multiplier.max(0.0));
        let delay_ms = (timing.delay_ms as f64 * scale).round() as u64;

        let candidate = &outcome.candidate;
        let mut reply = Reply::new(
            candidate.text.clone(),
            candidate.concern.map(|c| c.tag),
            delay_ms,
            candidate.handler,
        );
        reply.fallback = outcome.used_fallback;

        session.memory.record_reply(&reply.text);
        if plan.handler == HandlerId::Introduction {
            session.state.mark_introduced();
        }

        tracing::debug!(
            target: "hearth::pipeline",
            session = %session.id,
            turn = utterance.turn_index(),
            handler = %reply.handler,
            delay_ms = reply.delay_ms,
            fallback = reply.fallback,
            "Turn complete"
        );

        TurnReport {
            handler: reply.handler,
            reply,
            classification,
            special_cases: special,
            signals,
            entities,
            compliance: ComplianceStats::from(&outcome),
            alerted: outcome.alerted,
            timing: Some(timing),
        }
    }

    fn dispatch_alert(&self, concern: &Concern, session_id: &str) {
        if !self.config.alerts_enabled {
            tracing::debug!(target: "hearth::alerts", "Alerts disabled; concern recorded only");
            return;
        }
        let alert = ConcernAlert::new(concern, session_id);
        match panic::catch_unwind(AssertUnwindSafe(|| self.alerts.on_concern_alert(alert))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(target: "hearth::alerts", error = %e, "Alert sink rejected concern alert");
            }
            Err(_) => {
                tracing::error!(target: "hearth::alerts", concern = %concern.tag, "Alert sink panicked");
            }
        }
    }

    /// Reply for a failed turn. A safety concern still gets the safety fallback with no delay and
    /// its one-time alert; anything else gets the generic supportive line at default pacing.
    fn fallback_turn(
        &self,
        utterance: &Utterance,
        classification: Classification,
        session: &mut Session,
    ) -> TurnReport {
        let safety = classification.concern.filter(|c| c.tag.is_safety());
        let (mut reply, alerted) = match safety {
            Some(concern) => {
                let alerted = (concern.is_alert_eligible()
                    && session.state.mark_concern_shown(concern.tag))
                .then_some(concern.tag);
                if alerted.is_some() {
                    self.dispatch_alert(&concern, &session.id);
                }
                let reply =
                    Reply::new(SAFETY_FALLBACK, Some(concern.tag), 0, HandlerId::Safety);
                (reply, alerted)
            }
            None => {
                let delay_ms = self.timing.estimate(
                    utterance.text(),
                    None,
                    Default::default(),
                    Default::default(),
                );
                let reply = Reply::new(GENERIC_FALLBACK, None, delay_ms, HandlerId::Adaptive);
                (reply, None)
            }
        };
        reply.fallback = true;
        session.memory.record_reply(&reply.text);
        TurnReport {
            handler: reply.handler,
            reply,
            classification,
            special_cases: SpecialCases::default(),
            signals: TurnSignals::default(),
            entities: Entities::default(),
            compliance: ComplianceStats {
                used_fallback: true,
                ..Default::default()
            },
            alerted,
            timing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Severity, Stage};

    fn pipeline() -> Pipeline {
        Pipeline::new(HearthConfig::default()).unwrap()
    }

    #[test]
    fn greeting_introduces_and_advances_stage() {
        let p = pipeline();
        let mut session = p.new_session().with_seed(1);
        let report = p.process_turn("hi", &mut session);
        assert_eq!(report.handler, HandlerId::Introduction);
        assert!(session.state().introduction_made());
        assert_eq!(session.state().stage(), Stage::Exploration);
        assert_eq!(session.memory().last_reply(), Some(report.reply.text.as_str()));
    }

    #[test]
    fn safety_replies_are_not_paced() {
        let p = pipeline();
        let mut session = p.new_session().with_seed(2);
        let report = p.process_turn("I want to kill myself", &mut session);
        assert_eq!(report.handler, HandlerId::Safety);
        assert_eq!(report.reply.delay_ms, 0);
        assert_eq!(report.reply.concern_tag, Some(ConcernTag::Crisis));
        assert_eq!(report.alerted, Some(ConcernTag::Crisis));
        assert!(report.timing.is_some_and(|t| t.multiplier == 1.0));
    }

    #[test]
    fn preferences_are_remembered() {
        let p = pipeline();
        let mut session = p.new_session().with_seed(3);
        p.process_utterance("I moved to Denver for work", &mut session);
        let prefs = session.state().client_preferences();
        assert_eq!(prefs.get("location").map(String::as_str), Some("Denver"));
        assert_eq!(prefs.get("topic").map(String::as_str), Some("work"));
        assert_eq!(session.memory().dominant_topic(), Some("work"));
    }

    #[test]
    fn earlier_utterances_raise_the_severity_window() {
        let p = pipeline();
        let mut session = p.new_session().with_seed(4);
        let first = p.process_turn("I've been drinking daily", &mut session);
        assert_eq!(first.classification.concern.and_then(|c| c.severity), Some(Severity::Mild));

        let mut session = p.new_session().with_seed(4);
        p.process_utterance("I was drunk again on friday", &mut session);
        let second = p.process_turn("I've been drinking daily", &mut session);
        assert_eq!(
            second.classification.concern.and_then(|c| c.severity),
            Some(Severity::Moderate)
        );
    }

    #[test]
    fn panicking_provider_yields_the_fallback_reply() {
        struct Broken;
        impl TemplateProvider for Broken {
            fn templates(&self, _: &str) -> Vec<String> {
                panic!("corpus unavailable")
            }
        }
        let p = pipeline().with_templates(Arc::new(Broken));
        let mut session = p.new_session();
        let reply = p.process_utterance("hello there", &mut session);
        assert_eq!(reply.text, GENERIC_FALLBACK);
        assert!(reply.fallback);
        assert_eq!(reply.concern_tag, None);
        assert_eq!(session.state().message_count(), 1);
    }

    #[test]
    fn crisis_survives_a_panicking_provider() {
        struct Broken;
        impl TemplateProvider for Broken {
            fn templates(&self, _: &str) -> Vec<String> {
                panic!("corpus unavailable")
            }
        }
        let p = pipeline().with_templates(Arc::new(Broken));
        let mut session = p.new_session();
        let report = p.process_turn("I want to kill myself", &mut session);
        assert_eq!(report.reply.text, SAFETY_FALLBACK);
        assert_eq!(report.handler, HandlerId::Safety);
        assert_eq!(report.reply.concern_tag, Some(ConcernTag::Crisis));
        assert_eq!(report.reply.delay_ms, 0);
        assert!(report.reply.fallback);
        assert_eq!(report.alerted, Some(ConcernTag::Crisis));
        assert!(session.state().has_shown(ConcernTag::Crisis));

        // Already surfaced: the second failed crisis turn does not alert again.
        let again = p.process_turn("I still want to kill myself", &mut session);
        assert_eq!(again.reply.text, SAFETY_FALLBACK);
        assert_eq!(again.alerted, None);
    }
}
