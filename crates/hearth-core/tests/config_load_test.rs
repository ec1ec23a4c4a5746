//! Integration test: configuration layering (defaults → TOML file → environment).

use hearth_core::HearthConfig;
use std::io::Write;

#[test]
fn file_then_environment_layering() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
        rng_seed = 99

        [timing]
        base_ms = 1500
        per_char_ms = 3

        [detectors]
        disabled = ["weather-related"]
        "#
    )
    .unwrap();

    std::env::set_var("HEARTH_CONFIG", file.path());
    std::env::set_var("HEARTH_TIMING__BASE_MS", "800");
    std::env::set_var("HEARTH_STAGES__DEEPENING_AT", "12");
    // A double underscore straight after the prefix is not a section separator.
    std::env::set_var("HEARTH__COMPLIANCE__MAX_REDRAWS", "9");
    let cfg = HearthConfig::load().unwrap();
    std::env::remove_var("HEARTH_TIMING__BASE_MS");
    std::env::remove_var("HEARTH_STAGES__DEEPENING_AT");
    std::env::remove_var("HEARTH__COMPLIANCE__MAX_REDRAWS");
    std::env::remove_var("HEARTH_CONFIG");

    // Environment beats file, file beats defaults.
    assert_eq!(cfg.timing.base_ms, 800);
    assert_eq!(cfg.timing.per_char_ms, 3);
    assert_eq!(cfg.rng_seed, Some(99));
    assert!(cfg.detectors.is_disabled("weather-related"));
    assert_eq!(cfg.timing.safety_floor_ms, 400);
    assert_eq!(cfg.compliance.repetition_window, 5);
    assert_eq!(cfg.stages.deepening_at, 12);
    assert_eq!(cfg.compliance.max_redraws, 3);
}

#[test]
fn explicit_file_keeps_unset_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
        alerts_enabled = false

        [compliance]
        max_redraws = 5

        [reflection]
        late_interval = 4
        "#
    )
    .unwrap();

    let cfg = HearthConfig::load_from_path(file.path()).unwrap();
    assert!(!cfg.alerts_enabled);
    assert_eq!(cfg.compliance.max_redraws, 5);
    assert_eq!(cfg.compliance.similarity_threshold, 0.7);
    assert_eq!(cfg.reflection.late_interval, 4);
    assert_eq!(cfg.reflection.early_threshold, 10);
    assert_eq!(cfg.history_capacity, 15);
}

#[test]
fn malformed_file_is_an_error() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[timing\nbase_ms = ").unwrap();
    assert!(HearthConfig::load_from_path(file.path()).is_err());
}
