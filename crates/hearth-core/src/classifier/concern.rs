//! ConcernClassifier: ordered battery of detectors over one utterance.
//!
//! The registry is resolved once at construction. At classification time detectors run in priority
//! order and the first positive one wins; a detector that errors or panics is logged and treated
//! as "not detected". The classifier owns the resolved pattern sets so the rest of the turn (special cases,
//! signals) matches against the same, possibly overridden, wording.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::patterns::PatternSets;
use super::rules::{CompiledRule, RuleSpec, RuleTable};
use super::severity::{self, GriefSignals, TraumaSignals};
use crate::config::DetectorConfig;
use crate::error::HearthResult;
use crate::shared::{Concern, ConcernTag};

/// A single concern detector.
pub trait ConcernDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> u16;

    fn tag(&self) -> ConcernTag;

    /// `window` holds up to three earlier user turns, most recent first.
    fn detect(&self, text: &str, window: &[&str]) -> HearthResult<Option<Concern>>;
}

/// Detector backed by one rule of the declarative table.
pub struct RuleDetector {
    rule: CompiledRule,
    patterns: Arc<PatternSets>,
}

impl RuleDetector {
    pub fn new(spec: RuleSpec, patterns: Arc<PatternSets>) -> HearthResult<Self> {
        Ok(Self {
            rule: CompiledRule::compile(spec, &patterns)?,
            patterns,
        })
    }
}

impl ConcernDetector for RuleDetector {
    fn name(&self) -> &str {
        &self.rule.spec.name
    }

    fn priority(&self) -> u16 {
        self.rule.spec.priority
    }

    fn tag(&self) -> ConcernTag {
        self.rule.spec.tag
    }

    fn detect(&self, text: &str, window: &[&str]) -> HearthResult<Option<Concern>> {
        let Some(intensity) = self.rule.evaluate(text) else {
            return Ok(None);
        };
        let tag = self.rule.spec.tag;
        let mut concern = Concern::new(tag);
        concern.theme_intensity = intensity;
        if let Some(tier) = severity::concern_severity(&self.patterns, tag, text, window) {
            concern = concern.with_severity(tier);
        }
        Ok(Some(concern))
    }
}

/// Ordered set of detectors, fixed for the lifetime of a pipeline.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn ConcernDetector>>,
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl DetectorRegistry {
    /// Builds the registry from rules, leaving out disabled optional rules. Safety rules are always
    /// kept.
    pub fn from_rules(
        specs: Vec<RuleSpec>,
        patterns: &Arc<PatternSets>,
        cfg: &DetectorConfig,
    ) -> HearthResult<Self> {
        let mut registry = Self::default();
        for spec in specs {
            if cfg.is_disabled(&spec.name) {
                if spec.optional && !spec.tag.is_safety() {
                    tracing::info!(target: "hearth::classifier", detector = %spec.name, "Detector disabled by configuration");
                    continue;
                }
                tracing::warn!(target: "hearth::classifier", detector = %spec.name, "Detector cannot be disabled; keeping it");
            }
            registry.register(Arc::new(RuleDetector::new(spec, Arc::clone(patterns))?));
        }
        Ok(registry)
    }

    /// Adds a detector, keeping priority order (stable for equal priorities).
    pub fn register(&mut self, detector: Arc<dyn ConcernDetector>) {
        let at = self
            .detectors
            .partition_point(|d| d.priority() <= detector.priority());
        self.detectors.insert(at, detector);
    }

    pub fn names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ConcernDetector>> {
        self.detectors.iter()
    }
}

/// Result of classifying one utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Single best-fit concern, if any.
    pub concern: Option<Concern>,
    pub grief: GriefSignals,
    pub trauma: TraumaSignals,
}

impl Classification {
    pub fn tag(&self) -> Option<ConcernTag> {
        self.concern.map(|c| c.tag)
    }

    pub fn is_safety(&self) -> bool {
        self.tag().is_some_and(|t| t.is_safety())
    }
}

/// Runs the registry over utterances.
#[derive(Clone)]
pub struct ConcernClassifier {
    registry: DetectorRegistry,
    patterns: Arc<PatternSets>,
}

impl std::fmt::Debug for ConcernClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcernClassifier")
            .field("registry", &self.registry)
            .field("pattern_sets", &self.patterns.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ConcernClassifier {
    /// Classifier over `registry` with the built-in pattern sets.
    pub fn new(registry: DetectorRegistry) -> Self {
        Self::with_patterns(registry, PatternSets::builtin())
    }

    pub fn with_patterns(registry: DetectorRegistry, patterns: Arc<PatternSets>) -> Self {
        Self { registry, patterns }
    }

    /// Resolves the rule table (`rules_path` or the built-in one) and its pattern overrides.
    pub fn from_config(cfg: &DetectorConfig) -> HearthResult<Self> {
        let table = match &cfg.rules_path {
            Some(path) => RuleTable::load(path)?,
            None => RuleTable::builtin(),
        };
        let patterns = Arc::new(table.pattern_sets()?);
        let registry = DetectorRegistry::from_rules(table.rules, &patterns, cfg)?;
        Ok(Self::with_patterns(registry, patterns))
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    pub fn patterns(&self) -> &PatternSets {
        &self.patterns
    }

    /// Classifies `text`; `window` is up to three earlier user turns, most recent first.
    pub fn classify(&self, text: &str, window: &[&str]) -> Classification {
        let window = &window[..window.len().min(severity::SEVERITY_WINDOW)];
        let concern = self.first_positive(text, window);
        let classification = Classification {
            concern,
            grief: severity::grief_signals(&self.patterns, text),
            trauma: severity::trauma_signals(&self.patterns, text, window),
        };
        tracing::debug!(
            target: "hearth::classifier",
            concern = ?classification.concern.map(|c| c.label()),
            grief = classification.grief.severity,
            trauma = classification.trauma.intensity,
            "Utterance classified"
        );
        classification
    }

    fn first_positive(&self, text: &str, window: &[&str]) -> Option<Concern> {
        for detector in self.registry.iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(text, window))) {
                Ok(Ok(Some(concern))) => return Some(concern),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(target: "hearth::classifier", detector = detector.name(), error = %e, "Detector failed; treating as not detected");
                }
                Err(_) => {
                    tracing::error!(target: "hearth::classifier", detector = detector.name(), "Detector panicked; treating as not detected");
                }
            }
        }
        None
    }
}
