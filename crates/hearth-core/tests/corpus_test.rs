//! Integration test: data-driven template corpus and rule table.

use hearth_core::{
    ConcernTag, HandlerId, HearthConfig, HearthError, LayeredCorpus, Pipeline, TemplateProvider,
    TomlCorpus,
};
use std::io::Write;
use std::sync::Arc;

fn toml_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

#[test]
fn corpus_path_overrides_builtin_pools() {
    let corpus = toml_file(
        r#"
        introduction = ["Hello, I'm Hearth. What would you like to talk about today?"]
        "#,
    );
    let config = HearthConfig {
        corpus_path: Some(corpus.path().to_path_buf()),
        rng_seed: Some(1),
        ..HearthConfig::default()
    };
    let pipeline = Pipeline::new(config).unwrap();
    let mut session = pipeline.new_session();

    let reply = pipeline.process_utterance("hello", &mut session);
    assert_eq!(reply.handler, HandlerId::Introduction);
    assert_eq!(
        reply.text,
        "Hello, I'm Hearth. What would you like to talk about today?"
    );
}

#[test]
fn missing_corpus_file_fails_construction() {
    let config = HearthConfig {
        corpus_path: Some("/nonexistent/hearth/corpus.toml".into()),
        ..HearthConfig::default()
    };
    assert!(matches!(Pipeline::new(config), Err(HearthError::Io(_))));
}

#[test]
fn layered_corpus_falls_through_empty_pools() {
    let overrides = TomlCorpus::parse(r#"grief = []"#).unwrap();
    let layered = LayeredCorpus::over_builtin(Arc::new(overrides));
    assert!(!layered.templates("grief").is_empty());
}

#[test]
fn rule_table_replaces_builtin_detectors() {
    let rules = toml_file(
        r#"
        [[rule]]
        name = "migraine"
        tag = "medical"
        priority = 10
        any = ['\bmigraines?\b']
        "#,
    );
    let mut config = HearthConfig {
        rng_seed: Some(2),
        ..HearthConfig::default()
    };
    config.detectors.rules_path = Some(rules.path().to_path_buf());
    let pipeline = Pipeline::new(config).unwrap();

    let mut session = pipeline.new_session();
    let report = pipeline.process_turn("another migraine this morning", &mut session);
    assert_eq!(report.classification.tag(), Some(ConcernTag::Medical));
    assert_eq!(report.handler, HandlerId::Clinical);

    // Built-in rules are gone with a replacement table.
    let report = pipeline.process_turn("my doctor found a tumor", &mut session);
    assert_eq!(report.classification.tag(), None);
}

#[test]
fn invalid_rule_pattern_fails_construction() {
    let rules = toml_file(
        r#"
        [[rule]]
        name = "broken"
        tag = "medical"
        priority = 1
        any = ["(unclosed"]
        "#,
    );
    let mut config = HearthConfig::default();
    config.detectors.rules_path = Some(rules.path().to_path_buf());
    assert!(matches!(
        Pipeline::new(config),
        Err(HearthError::InvalidPattern { .. })
    ));
}

#[test]
fn pattern_override_reaches_rules_and_special_cases() {
    let rules = toml_file(
        r#"
        [patterns]
        weather = ['\bmonsoon\b']
        "#,
    );
    let mut config = HearthConfig {
        rng_seed: Some(3),
        ..HearthConfig::default()
    };
    config.detectors.rules_path = Some(rules.path().to_path_buf());
    let pipeline = Pipeline::new(config).unwrap();
    let mut session = pipeline.new_session();

    let report = pipeline.process_turn("the monsoon has us cooped up at home", &mut session);
    assert_eq!(report.classification.tag(), Some(ConcernTag::WeatherRelated));
    assert!(report.special_cases.is_weather_related);

    // Built-in rules stay in place when the file only overrides patterns.
    let report = pipeline.process_turn("my doctor found a tumor", &mut session);
    assert_eq!(report.classification.tag(), Some(ConcernTag::Medical));

    // The replaced set no longer carries the built-in wording, for either consumer.
    let report = pipeline.process_turn("we've been snowed in all week", &mut session);
    assert_ne!(report.classification.tag(), Some(ConcernTag::WeatherRelated));
    assert!(!report.special_cases.is_weather_related);
}
