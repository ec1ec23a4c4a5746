//! Integration test: end-to-end conversation scenarios through `Pipeline`.
//!
//! ## Scenarios
//! 1. Crisis language routes to safety and alerts exactly once across repeated turns.
//! 2. A first greeting introduces the agent and moves the stage to exploration.
//! 3. A corpus with only near-duplicate lines forces the refocus fallback.
//! 4. "I just lost my dog" is handled as pet illness.
//! 5. Message count and stage track the number of turns.
//! 6. A failing detector does not abort the turn.
//! 7. Alerts can be switched off while still being recorded.
//! 8. Crisis language that hits a failing template provider still gets the unpaced safety fallback
//!    and its alert.
//! 9. A panicking detector is skipped; crisis language behind it still routes to safety.

use hearth_core::classifier::{builtin_rules, PatternSets};
use hearth_core::{
    AlertChannel, Concern, ConcernClassifier, ConcernDetector, ConcernTag, DetectorRegistry,
    HandlerId, HearthConfig, HearthError, HearthResult, Pipeline, Stage, TemplateProvider,
    TomlCorpus, REFOCUS_FALLBACK, SAFETY_FALLBACK,
};
use std::sync::Arc;

fn seeded_config() -> HearthConfig {
    HearthConfig {
        rng_seed: Some(7),
        ..HearthConfig::default()
    }
}

#[test]
fn crisis_alerts_once_across_repeated_turns() {
    let (sink, mut rx) = AlertChannel::new();
    let pipeline = Pipeline::new(seeded_config())
        .unwrap()
        .with_alert_sink(Arc::new(sink));
    let mut session = pipeline.new_session();

    for text in [
        "I want to kill myself",
        "I still want to kill myself",
        "honestly I want to kill myself tonight",
        "I keep thinking I want to kill myself",
    ] {
        let reply = pipeline.process_utterance(text, &mut session);
        assert_eq!(reply.handler, HandlerId::Safety, "{}", text);
        assert_eq!(reply.concern_tag, Some(ConcernTag::Crisis));
        assert_eq!(reply.delay_ms, 0);
    }

    let first = rx.try_recv().unwrap();
    assert_eq!(first.tag, ConcernTag::Crisis);
    assert_eq!(first.session_id, session.id());
    assert!(rx.try_recv().is_err());
    assert!(session.state().has_shown(ConcernTag::Crisis));
}

#[test]
fn greeting_introduces_the_agent() {
    let pipeline = Pipeline::new(seeded_config()).unwrap();
    let mut session = pipeline.new_session();

    let reply = pipeline.process_utterance("hi", &mut session);
    assert_eq!(reply.handler, HandlerId::Introduction);
    assert!(!reply.text.is_empty());
    assert!(session.state().introduction_made());
    assert_eq!(session.state().stage(), Stage::Exploration);

    let again = pipeline.process_utterance("hi", &mut session);
    assert_ne!(again.handler, HandlerId::Introduction);
}

#[test]
fn near_duplicate_corpus_falls_back_to_refocus() {
    let corpus = TomlCorpus::parse(
        r#"
        generic = [
            "Tell me more about the bus schedule today.",
            "Tell me more about the bus schedule, today!",
        ]
        "#,
    )
    .unwrap();
    let pipeline = Pipeline::new(seeded_config())
        .unwrap()
        .with_templates(Arc::new(corpus));
    let mut session = pipeline.new_session();

    let first = pipeline.process_turn("ok", &mut session);
    assert!(first.reply.text.starts_with("Tell me more about the bus schedule"));

    let second = pipeline.process_turn("ok", &mut session);
    assert_eq!(second.reply.text, REFOCUS_FALLBACK);
    assert!(second.reply.fallback);
    assert!(second.compliance.used_fallback);
}

#[test]
fn lost_dog_is_pet_illness() {
    let pipeline = Pipeline::new(seeded_config()).unwrap();
    let mut session = pipeline.new_session();
    let report = pipeline.process_turn("I just lost my dog", &mut session);

    assert_eq!(report.handler, HandlerId::PetIllness);
    assert_eq!(report.classification.tag(), Some(ConcernTag::PetIllness));
    assert_eq!(report.reply.concern_tag, Some(ConcernTag::PetIllness));
    // Pet illness never raises an alert.
    assert_eq!(report.alerted, None);
    assert!(report.reply.delay_ms > 0);
}

#[test]
fn message_count_and_stage_follow_turns() {
    let pipeline = Pipeline::new(seeded_config()).unwrap();
    let mut session = pipeline.new_session();
    assert_eq!(session.state().stage(), Stage::Opening);

    let lines = [
        "work has been a lot lately",
        "my boss keeps moving deadlines",
        "I stay late most nights",
        "the commute is long too",
        "weekends feel short",
        "I used to paint a lot",
        "maybe I should pick it up again",
        "it used to calm me down",
    ];
    for (k, line) in lines.iter().enumerate() {
        pipeline.process_utterance(line, &mut session);
        assert_eq!(session.state().message_count(), k as u64 + 1);
        assert!(session.state().history().len() <= 15);
    }
    assert_eq!(session.state().stage(), Stage::Deepening);
    assert_eq!(session.memory().reply_count(), lines.len().min(5));
}

struct Exploding;

impl ConcernDetector for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn priority(&self) -> u16 {
        0
    }

    fn tag(&self) -> ConcernTag {
        ConcernTag::Medical
    }

    fn detect(&self, _text: &str, _window: &[&str]) -> HearthResult<Option<Concern>> {
        Err(HearthError::detector("exploding", "backend unavailable"))
    }
}

#[test]
fn failing_detector_is_skipped() {
    let mut registry =
        DetectorRegistry::from_rules(builtin_rules(), &PatternSets::builtin(), &Default::default())
            .unwrap();
    registry.register(Arc::new(Exploding));
    let pipeline = Pipeline::new(seeded_config())
        .unwrap()
        .with_classifier(ConcernClassifier::new(registry));
    let mut session = pipeline.new_session();

    let report = pipeline.process_turn("I want to kill myself", &mut session);
    assert_eq!(report.handler, HandlerId::Safety);
    assert_eq!(report.classification.tag(), Some(ConcernTag::Crisis));
}

#[test]
fn disabled_alerts_are_still_recorded() {
    let (sink, mut rx) = AlertChannel::new();
    let config = HearthConfig {
        alerts_enabled: false,
        ..seeded_config()
    };
    let pipeline = Pipeline::new(config).unwrap().with_alert_sink(Arc::new(sink));
    let mut session = pipeline.new_session();

    let report = pipeline.process_turn("my doctor found a tumor", &mut session);
    assert_eq!(report.alerted, Some(ConcernTag::Medical));
    assert!(session.state().has_shown(ConcernTag::Medical));
    assert!(rx.try_recv().is_err());
}

struct Unavailable;

impl TemplateProvider for Unavailable {
    fn templates(&self, _pool: &str) -> Vec<String> {
        panic!("template store unavailable")
    }
}

#[test]
fn crisis_with_failing_templates_gets_the_safety_fallback() {
    let (sink, mut rx) = AlertChannel::new();
    let pipeline = Pipeline::new(seeded_config())
        .unwrap()
        .with_templates(Arc::new(Unavailable))
        .with_alert_sink(Arc::new(sink));
    let mut session = pipeline.new_session();

    let report = pipeline.process_turn("I want to kill myself", &mut session);
    assert_eq!(report.reply.text, SAFETY_FALLBACK);
    assert_eq!(report.reply.concern_tag, Some(ConcernTag::Crisis));
    assert_eq!(report.reply.delay_ms, 0);
    assert_eq!(report.handler, HandlerId::Safety);
    assert!(session.state().has_shown(ConcernTag::Crisis));

    let alert = rx.try_recv().unwrap();
    assert_eq!(alert.tag, ConcernTag::Crisis);
    assert!(rx.try_recv().is_err());

    let report = pipeline.process_turn("I don't want to be here anymore", &mut session);
    assert_eq!(report.reply.text, SAFETY_FALLBACK);
    assert_eq!(report.reply.concern_tag, Some(ConcernTag::TentativeHarm));
    assert_eq!(report.reply.delay_ms, 0);
}

struct Panicking;

impl ConcernDetector for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn priority(&self) -> u16 {
        0
    }

    fn tag(&self) -> ConcernTag {
        ConcernTag::Medical
    }

    fn detect(&self, _text: &str, _window: &[&str]) -> HearthResult<Option<Concern>> {
        panic!("detector state corrupted")
    }
}

#[test]
fn panicking_detector_is_skipped() {
    let mut registry =
        DetectorRegistry::from_rules(builtin_rules(), &PatternSets::builtin(), &Default::default())
            .unwrap();
    registry.register(Arc::new(Panicking));
    let pipeline = Pipeline::new(seeded_config())
        .unwrap()
        .with_classifier(ConcernClassifier::new(registry));
    let mut session = pipeline.new_session();

    let report = pipeline.process_turn("I want to kill myself", &mut session);
    assert_eq!(report.classification.tag(), Some(ConcernTag::Crisis));
    assert_eq!(report.handler, HandlerId::Safety);
    assert!(!report.reply.fallback);

    let report = pipeline.process_turn("work has been rough lately", &mut session);
    assert_eq!(report.classification.tag(), None);
    assert!(!report.reply.fallback);
    assert_eq!(session.state().message_count(), 2);
}
