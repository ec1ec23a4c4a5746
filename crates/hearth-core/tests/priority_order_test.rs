//! Integration test: router precedence and pacing through the public API.

use hearth_core::orchestrator::timing::PacingHints;
use hearth_core::{ConcernTag, HandlerId, HearthConfig, Pipeline, PriorityRouter, TimingEstimator};

#[test]
fn router_order_follows_levels() {
    let order = PriorityRouter::new().order();
    assert_eq!(order.first(), Some(&HandlerId::IdentityRedirect));
    assert_eq!(order.last(), Some(&HandlerId::Adaptive));
    let levels: Vec<u8> = order.iter().map(|h| h.level()).collect();
    assert!(levels.windows(2).all(|w| w[0] <= w[1]), "{:?}", levels);
    assert_eq!(levels.first(), Some(&1));
    assert_eq!(levels.last(), Some(&14));
}

#[test]
fn safety_outranks_identity_and_sarcasm() {
    let pipeline = Pipeline::new(HearthConfig::default()).unwrap();
    for text in [
        "are you a real person? I want to kill myself",
        "wow, thanks for nothing, I'm going to kill myself",
    ] {
        let mut session = pipeline.new_session().with_seed(11);
        assert_eq!(
            pipeline.process_turn(text, &mut session).handler,
            HandlerId::Safety,
            "{}",
            text
        );
    }
}

#[test]
fn identity_question_wins_without_safety() {
    let pipeline = Pipeline::new(HearthConfig::default()).unwrap();
    let mut session = pipeline.new_session().with_seed(12);
    let report = pipeline.process_turn("are you a real person?", &mut session);
    assert_eq!(report.handler, HandlerId::IdentityRedirect);
    assert!(report.special_cases.is_identity_question);
}

#[test]
fn crisis_pacing_uses_the_lower_floor() {
    let estimator = TimingEstimator::new(HearthConfig::default().timing);
    let text = "I want to kill myself";
    let crisis = estimator.breakdown(
        text,
        Some(ConcernTag::Crisis),
        Default::default(),
        Default::default(),
        PacingHints::default(),
    );
    let medical = estimator.breakdown(
        text,
        Some(ConcernTag::Medical),
        Default::default(),
        Default::default(),
        PacingHints::default(),
    );
    assert_eq!(crisis.multiplier, 1.0);
    assert!(crisis.minimum_ms < medical.minimum_ms);
    assert!(crisis.delay_ms < medical.delay_ms);
}

#[test]
fn political_emotion_shortens_delay() {
    let estimator = TimingEstimator::new(HearthConfig::default().timing);
    let text = "the election news makes me so angry";
    let plain = estimator.breakdown(
        text,
        None,
        Default::default(),
        Default::default(),
        PacingHints::default(),
    );
    let political = estimator.breakdown(
        text,
        None,
        Default::default(),
        Default::default(),
        PacingHints {
            political_emotion: true,
            stated_feeling: false,
        },
    );
    assert!(political.delay_ms < plain.delay_ms);
}
