//! TimingEstimator: converts message length, concern weight and signals into a reply delay.
//!
//! Pure and free of randomness:
//!
//! ```text
//! base    = base_ms + chars * per_char_ms
//! minimum = base_ms + complexity * complexity_ms + emotional * emotional_ms
//! delay   = max(base, minimum) * multiplier
//! ```
//!
//! Safety tags swap `base_ms` for the lowered `safety_floor_ms` and pin the multiplier to 1.0.

use serde::{Deserialize, Serialize};

use crate::classifier::{GriefSignals, TraumaSignals};
use crate::config::TimingConfig;
use crate::shared::ConcernTag;

/// Extra inputs that adjust the multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacingHints {
    pub political_emotion: bool,
    pub stated_feeling: bool,
}

/// Every intermediate value of one estimate, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub base_ms: u64,
    pub minimum_ms: u64,
    pub complexity: u8,
    pub emotional_weight: u8,
    pub multiplier: f32,
    pub delay_ms: u64,
}

/// (complexity, emotional weight) on a 1–9 scale.
fn tag_weights(tag: Option<ConcernTag>) -> (u8, u8) {
    match tag {
        None => (1, 1),
        Some(ConcernTag::Crisis) => (5, 9),
        Some(ConcernTag::TentativeHarm) => (5, 8),
        Some(ConcernTag::Medical) => (6, 7),
        Some(ConcernTag::MentalHealth) => (6, 8),
        Some(ConcernTag::EatingDisorder) => (7, 8),
        Some(ConcernTag::SubstanceUse) => (6, 7),
        Some(ConcernTag::Ptsd) => (7, 8),
        Some(ConcernTag::TraumaResponse) => (6, 7),
        Some(ConcernTag::PetIllness) => (3, 7),
        Some(ConcernTag::WeatherRelated) => (2, 3),
        Some(ConcernTag::CulturalAdjustment) => (4, 4),
        Some(ConcernTag::MildGambling) => (3, 3),
        Some(ConcernTag::Grief) => (4, 8),
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimingEstimator {
    cfg: TimingConfig,
}

impl TimingEstimator {
    pub fn new(cfg: TimingConfig) -> Self {
        Self { cfg }
    }

    /// Concern weights raised by grief severity and trauma intensity, clamped to 1–9.
    pub fn weights(
        &self,
        tag: Option<ConcernTag>,
        grief: GriefSignals,
        trauma: TraumaSignals,
    ) -> (u8, u8) {
        let (complexity, emotional) = tag_weights(tag);
        let complexity = complexity.saturating_add(trauma.intensity).clamp(1, 9);
        let emotional = emotional
            .saturating_add(grief.severity)
            .saturating_add(trauma.intensity)
            .clamp(1, 9);
        (complexity, emotional)
    }

    /// Multiplier: 1.0 for safety tags; otherwise political (0.7) or stated-feeling (0.9) base plus
    /// grief/trauma bonuses, capped at `max_multiplier`.
    pub fn multiplier(
        &self,
        tag: Option<ConcernTag>,
        grief: GriefSignals,
        trauma: TraumaSignals,
        hints: PacingHints,
    ) -> f32 {
        if tag.is_some_and(|t| t.is_safety()) {
            return 1.0;
        }
        let base = if hints.political_emotion {
            self.cfg.political_multiplier
        } else if hints.stated_feeling {
            self.cfg.stated_feeling_multiplier
        } else {
            1.0
        };
        let bonus = f32::from(grief.severity.min(3)) / 3.0 * 0.5
            + f32::from(trauma.intensity.min(3)) / 3.0 * 0.5;
        (base + bonus).min(self.cfg.max_multiplier)
    }

    /// Minimum delay floor for a tag before the multiplier.
    pub fn minimum_floor(&self, tag: Option<ConcernTag>, complexity: u8, emotional: u8) -> u64 {
        if tag.is_some_and(|t| t.is_safety()) {
            return self.cfg.safety_floor_ms;
        }
        self.cfg.base_ms
            + u64::from(complexity) * self.cfg.complexity_ms
            + u64::from(emotional) * self.cfg.emotional_ms
    }

    pub fn breakdown(
        &self,
        utterance: &str,
        tag: Option<ConcernTag>,
        grief: GriefSignals,
        trauma: TraumaSignals,
        hints: PacingHints,
    ) -> TimingBreakdown {
        let chars = utterance.chars().count() as u64;
        let start = if tag.is_some_and(|t| t.is_safety()) {
            self.cfg.safety_floor_ms
        } else {
            self.cfg.base_ms
        };
        let base_ms = start.saturating_add(chars.saturating_mul(self.cfg.per_char_ms));
        let (complexity, emotional_weight) = self.weights(tag, grief, trauma);
        let minimum_ms = self.minimum_floor(tag, complexity, emotional_weight);
        let multiplier = self.multiplier(tag, grief, trauma, hints);
        let delay_ms = (base_ms.max(minimum_ms) as f64 * f64::from(multiplier)).round() as u64;
        TimingBreakdown {
            base_ms,
            minimum_ms,
            complexity,
            emotional_weight,
            multiplier,
            delay_ms,
        }
    }

    /// Delay in milliseconds with no extra hints.
    pub fn estimate(
        &self,
        utterance: &str,
        tag: Option<ConcernTag>,
        grief: GriefSignals,
        trauma: TraumaSignals,
    ) -> u64 {
        self.breakdown(utterance, tag, grief, trauma, PacingHints::default())
            .delay_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TimingEstimator {
        TimingEstimator::new(TimingConfig::default())
    }

    #[test]
    fn neutral_message_uses_the_larger_of_base_and_minimum() {
        let t = estimator();
        // 10 chars: base 1050, minimum 1000 + 300 + 200 = 1500
        let b = t.breakdown("0123456789", None, GriefSignals::default(), TraumaSignals::default(), PacingHints::default());
        assert_eq!(b.base_ms, 1050);
        assert_eq!(b.minimum_ms, 1500);
        assert_eq!(b.delay_ms, 1500);

        let long = "x".repeat(400);
        assert_eq!(t.estimate(&long, None, GriefSignals::default(), TraumaSignals::default()), 3000);
    }

    #[test]
    fn safety_multiplier_is_one_and_floor_is_lowest() {
        let t = estimator();
        let grief = GriefSignals { severity: 3 };
        let trauma = TraumaSignals { intensity: 3 };
        let hints = PacingHints {
            political_emotion: true,
            stated_feeling: true,
        };
        for tag in [ConcernTag::Crisis, ConcernTag::TentativeHarm] {
            let b = t.breakdown("I want to kill myself", Some(tag), grief, trauma, hints);
            assert_eq!(b.multiplier, 1.0);
            for clinical in ConcernTag::ALL.iter().filter(|c| c.is_clinical()) {
                let c = t.breakdown("I want to kill myself", Some(*clinical), grief, trauma, hints);
                assert!(b.minimum_ms < c.minimum_ms);
            }
        }
    }

    #[test]
    fn political_and_stated_feeling_shorten_the_delay() {
        let t = estimator();
        let none = GriefSignals::default();
        let calm = TraumaSignals::default();
        let political = PacingHints {
            political_emotion: true,
            stated_feeling: false,
        };
        let feeling = PacingHints {
            political_emotion: false,
            stated_feeling: true,
        };
        assert!((t.multiplier(None, none, calm, political) - 0.7).abs() < 1e-6);
        assert!((t.multiplier(None, none, calm, feeling) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn grief_and_trauma_bonuses_are_capped() {
        let t = estimator();
        let m = t.multiplier(
            Some(ConcernTag::Grief),
            GriefSignals { severity: 3 },
            TraumaSignals { intensity: 3 },
            PacingHints::default(),
        );
        assert!((m - 1.5).abs() < 1e-6);
        let m = t.multiplier(
            Some(ConcernTag::Grief),
            GriefSignals { severity: 3 },
            TraumaSignals::default(),
            PacingHints::default(),
        );
        assert!((m - 1.5).abs() < 1e-6);
        let m = t.multiplier(
            None,
            GriefSignals { severity: 0 },
            TraumaSignals { intensity: 0 },
            PacingHints::default(),
        );
        assert_eq!(m, 1.0);
    }

    #[test]
    fn weights_stay_on_scale() {
        let t = estimator();
        let (c, e) = t.weights(
            Some(ConcernTag::EatingDisorder),
            GriefSignals { severity: 3 },
            TraumaSignals { intensity: 3 },
        );
        assert_eq!((c, e), (9, 9));
    }
}
