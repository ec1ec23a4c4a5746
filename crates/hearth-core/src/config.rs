//! Pipeline configuration: stage thresholds, pacing constants, compliance budgets and detector toggles.
//!
//! Loaded from defaults, then an optional TOML file, then `HEARTH_<SECTION>__<KEY>` environment
//! variables (e.g. `HEARTH_TIMING__BASE_MS`, or `HEARTH_RNG_SEED` for top-level keys), so tuning
//! does not require code edits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::HearthResult;
use crate::shared::DEFAULT_HISTORY_CAPACITY;

fn default_true() -> bool {
    true
}

/// Top-level configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | HEARTH_CONFIG | config/hearth.toml | Path of the TOML file layered over defaults (skipped when absent). |
/// | HEARTH_STAGES__EXPLORATION_AT | 1 | Message count at which the stage becomes exploration. |
/// | HEARTH_STAGES__DEEPENING_AT | 8 | Message count at which the stage becomes deepening. |
/// | HEARTH_TIMING__BASE_MS | 1000 | Base pacing delay. |
/// | HEARTH_COMPLIANCE__SIMILARITY_THRESHOLD | 0.7 | Jaccard similarity treated as a repeat. |
/// | HEARTH_RNG_SEED | unset | Fixed seed for template selection (tests, demos). |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearthConfig {
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    #[serde(default)]
    pub detectors: DetectorConfig,
    /// Capacity of the user-utterance history (ConversationState and MemoryStore).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Optional TOML template corpus layered over the built-in one.
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,
    /// When set, every new session's template draws are reproducible.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// When false, concern alerts are still recorded in `shownConcerns` but never sent.
    #[serde(default = "default_true")]
    pub alerts_enabled: bool,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            stages: StageConfig::default(),
            timing: TimingConfig::default(),
            compliance: ComplianceConfig::default(),
            reflection: ReflectionConfig::default(),
            detectors: DetectorConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            corpus_path: None,
            rng_seed: None,
            alerts_enabled: true,
        }
    }
}

/// Message-count thresholds for the stage progression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_exploration_at")]
    pub exploration_at: u64,
    #[serde(default = "default_deepening_at")]
    pub deepening_at: u64,
}

fn default_exploration_at() -> u64 {
    1
}

fn default_deepening_at() -> u64 {
    8
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            exploration_at: default_exploration_at(),
            deepening_at: default_deepening_at(),
        }
    }
}

/// Constants of the pacing formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_per_char_ms")]
    pub per_char_ms: u64,
    #[serde(default = "default_complexity_ms")]
    pub complexity_ms: u64,
    #[serde(default = "default_emotional_ms")]
    pub emotional_ms: u64,
    /// Floor for crisis/tentative-harm replies; lower than any clinical minimum.
    #[serde(default = "default_safety_floor_ms")]
    pub safety_floor_ms: u64,
    #[serde(default = "default_political_multiplier")]
    pub political_multiplier: f32,
    #[serde(default = "default_stated_feeling_multiplier")]
    pub stated_feeling_multiplier: f32,
    /// Cap on the multiplier once grief/trauma bonuses are added.
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f32,
}

fn default_base_ms() -> u64 {
    1000
}
fn default_per_char_ms() -> u64 {
    5
}
fn default_complexity_ms() -> u64 {
    300
}
fn default_emotional_ms() -> u64 {
    200
}
fn default_safety_floor_ms() -> u64 {
    400
}
fn default_political_multiplier() -> f32 {
    0.7
}
fn default_stated_feeling_multiplier() -> f32 {
    0.9
}
fn default_max_multiplier() -> f32 {
    1.5
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            per_char_ms: default_per_char_ms(),
            complexity_ms: default_complexity_ms(),
            emotional_ms: default_emotional_ms(),
            safety_floor_ms: default_safety_floor_ms(),
            political_multiplier: default_political_multiplier(),
            stated_feeling_multiplier: default_stated_feeling_multiplier(),
            max_multiplier: default_max_multiplier(),
        }
    }
}

/// Repetition and disclosure budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// How many emitted replies the repetition check looks back over.
    #[serde(default = "default_repetition_window")]
    pub repetition_window: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_redraws")]
    pub max_redraws: usize,
    #[serde(default = "default_disclosure_probability")]
    pub disclosure_probability: f64,
    /// Self-disclosure is only allowed once the message count reaches this value.
    #[serde(default = "default_disclosure_after")]
    pub disclosure_after: u64,
}

fn default_repetition_window() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_max_redraws() -> usize {
    3
}
fn default_disclosure_probability() -> f64 {
    0.15
}
fn default_disclosure_after() -> u64 {
    6
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            repetition_window: default_repetition_window(),
            similarity_threshold: default_similarity_threshold(),
            max_redraws: default_max_redraws(),
            disclosure_probability: default_disclosure_probability(),
            disclosure_after: default_disclosure_after(),
        }
    }
}

/// Gating for the reflection handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Below this message count reflection is attempted on every turn.
    #[serde(default = "default_early_threshold")]
    pub early_threshold: u64,
    /// At or above the threshold, reflection is attempted on every n-th message.
    #[serde(default = "default_late_interval")]
    pub late_interval: u64,
}

fn default_early_threshold() -> u64 {
    10
}
fn default_late_interval() -> u64 {
    3
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            early_threshold: default_early_threshold(),
            late_interval: default_late_interval(),
        }
    }
}

/// Which optional detectors are registered, and where the rule table comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Detector names to leave out of the registry (e.g. `["mild-gambling", "weather-related"]`).
    /// Safety detectors cannot be disabled.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// TOML rule table replacing the built-in one.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

impl DetectorConfig {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled
            .iter()
            .any(|d| d.trim().eq_ignore_ascii_case(name))
    }
}

impl HearthConfig {
    /// Load config from defaults, file and environment.
    /// Precedence: env `HEARTH_<SECTION>__<KEY>` > file at `HEARTH_CONFIG` (default
    /// `config/hearth.toml`) > defaults.
    pub fn load() -> HearthResult<Self> {
        let config_path =
            std::env::var("HEARTH_CONFIG").unwrap_or_else(|_| "config/hearth.toml".to_string());
        let path = Path::new(&config_path);
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };
        let built = builder
            .add_source(
                config::Environment::with_prefix("HEARTH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg: HearthConfig = built.try_deserialize()?;
        tracing::debug!(target: "hearth::config", path = %config_path, "Configuration loaded");
        Ok(cfg.normalized())
    }

    /// Load a single TOML file over the defaults (no environment layering).
    pub fn load_from_path(path: &Path) -> HearthResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: HearthConfig = toml::from_str(&content)?;
        Ok(cfg.normalized())
    }

    /// Clamp values that would break invariants (e.g. a deepening threshold below exploration).
    fn normalized(mut self) -> Self {
        if self.stages.deepening_at < self.stages.exploration_at {
            self.stages.deepening_at = self.stages.exploration_at;
        }
        self.history_capacity = self.history_capacity.max(3);
        self.compliance.repetition_window = self.compliance.repetition_window.max(1);
        self.compliance.similarity_threshold = self.compliance.similarity_threshold.clamp(0.0, 1.0);
        self.compliance.disclosure_probability =
            self.compliance.disclosure_probability.clamp(0.0, 1.0);
        self.reflection.late_interval = self.reflection.late_interval.max(1);
        self.timing.max_multiplier = self.timing.max_multiplier.max(1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: HearthConfig = toml::from_str(
            r#"
            rng_seed = 7

            [timing]
            base_ms = 800
            "#,
        )
        .unwrap();
        assert_eq!(cfg.rng_seed, Some(7));
        assert_eq!(cfg.timing.base_ms, 800);
        assert_eq!(cfg.timing.per_char_ms, 5);
        assert_eq!(cfg.stages.deepening_at, 8);
        assert!((cfg.compliance.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert!(cfg.alerts_enabled);
    }

    #[test]
    fn normalization_repairs_inverted_thresholds() {
        let mut cfg = HearthConfig::default();
        cfg.stages.exploration_at = 5;
        cfg.stages.deepening_at = 2;
        cfg.reflection.late_interval = 0;
        let cfg = cfg.normalized();
        assert_eq!(cfg.stages.deepening_at, 5);
        assert_eq!(cfg.reflection.late_interval, 1);
    }

    #[test]
    fn disabled_detectors_match_case_insensitively() {
        let cfg = DetectorConfig {
            disabled: vec![" Mild-Gambling ".to_string()],
            rules_path: None,
        };
        assert!(cfg.is_disabled("mild-gambling"));
        assert!(!cfg.is_disabled("grief"));
    }
}
