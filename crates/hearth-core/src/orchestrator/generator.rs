//! ResponseCandidateGenerator: turns a `ReplyPlan` into reply text.
//!
//! Template plans draw uniformly from the first pool (in plan order, then `generic`) that still
//! has usable entries once placeholders are filled. Reflection plans compose an optional entity
//! clause, an optional emotion clause and one follow-up question. All randomness comes from the
//! caller's RNG.

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

use super::handlers::{Composition, ReplyPlan};
use crate::error::{HearthError, HearthResult};
use crate::shared::{HandlerId, ReplyCandidate};
use crate::templates::{fill_placeholders, TemplateProvider, GENERIC_FALLBACK, SAFETY_FALLBACK};

pub const GENERIC_POOL: &str = "generic";
pub const COMPOSED_POOL: &str = "composed";
const FIXED_POOL: &str = "fixed";

#[derive(Clone)]
pub struct ResponseGenerator {
    templates: Arc<dyn TemplateProvider>,
}

impl std::fmt::Debug for ResponseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGenerator")
            .field("templates", &self.templates.name())
            .finish()
    }
}

impl ResponseGenerator {
    pub fn new(templates: Arc<dyn TemplateProvider>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &dyn TemplateProvider {
        self.templates.as_ref()
    }

    /// Usable (filled, non-blank) entries of one pool.
    fn filled_pool(&self, key: &str, plan: &ReplyPlan) -> Vec<String> {
        self.templates
            .templates(key)
            .iter()
            .filter_map(|t| fill_placeholders(t, |k| plan.values.get(k).map(String::as_str)))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Draws one entry, skipping texts in `exclude`. Falls through the plan's pools, then `generic`.
    fn draw_template<R: Rng + ?Sized>(
        &self,
        plan: &ReplyPlan,
        rng: &mut R,
        exclude: &[String],
    ) -> HearthResult<(String, String)> {
        let keys = plan
            .pools
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(GENERIC_POOL));
        for key in keys {
            let pool: Vec<String> = self
                .filled_pool(key, plan)
                .into_iter()
                .filter(|t| !exclude.contains(t))
                .collect();
            if let Some(text) = pool.choose(rng) {
                return Ok((key.to_string(), text.clone()));
            }
            tracing::trace!(target: "hearth::generator", pool = key, "Pool unusable, trying next");
        }
        Err(HearthError::EmptyPool(plan.pools.join(",")))
    }

    fn pick<R: Rng + ?Sized>(&self, key: &str, plan: &ReplyPlan, rng: &mut R) -> Option<String> {
        self.filled_pool(key, plan).choose(rng).cloned()
    }

    /// Entity clause + emotion clause + follow-up question.
    fn compose_reflection<R: Rng + ?Sized>(
        &self,
        plan: &ReplyPlan,
        rng: &mut R,
        exclude: &[String],
    ) -> HearthResult<String> {
        let follow_ups: Vec<String> = self.filled_pool("follow_up", plan);
        if follow_ups.is_empty() {
            return Err(HearthError::EmptyPool("follow_up".into()));
        }
        let entity_clause = if plan.values.contains_key("topic") {
            self.pick("clause.topic", plan, rng)
        } else if plan.values.contains_key("location") {
            self.pick("clause.location", plan, rng)
        } else {
            None
        };
        let emotion_clause = self.pick("clause.emotion", plan, rng);
        let prefix: Vec<String> = entity_clause.into_iter().chain(emotion_clause).collect();

        let mut options: Vec<String> = follow_ups
            .iter()
            .map(|q| {
                let mut parts = prefix.clone();
                parts.push(q.clone());
                parts.join(" ")
            })
            .filter(|t| !exclude.contains(t))
            .collect();
        options.shuffle(rng);
        options
            .into_iter()
            .next()
            .ok_or_else(|| HearthError::EmptyPool("follow_up".into()))
    }

    fn try_generate<R: Rng + ?Sized>(
        &self,
        plan: &ReplyPlan,
        rng: &mut R,
        exclude: &[String],
    ) -> HearthResult<ReplyCandidate> {
        let (pool_key, text) = match plan.composition {
            Composition::Template => self.draw_template(plan, rng, exclude)?,
            Composition::Reflection => match self.compose_reflection(plan, rng, exclude) {
                Ok(text) => (COMPOSED_POOL.to_string(), text),
                Err(e) => {
                    tracing::debug!(target: "hearth::generator", error = %e, "Reflection unavailable, drawing from generic");
                    let generic = ReplyPlan {
                        pools: Vec::new(),
                        composition: Composition::Template,
                        ..plan.clone()
                    };
                    self.draw_template(&generic, rng, exclude)?
                }
            },
        };
        let disclosure = if plan.allow_disclosure {
            self.pick("disclosure", plan, rng)
        } else {
            None
        };
        let mut candidate = ReplyCandidate::new(text, plan.handler, pool_key.clone())
            .with_concern(plan.concern)
            .with_timing_multiplier(plan.timing_multiplier)
            .with_disclosure(disclosure);
        candidate.fallback = pool_key == GENERIC_POOL;
        Ok(candidate)
    }

    /// Fixed text when no pool can produce anything. Safety plans get their own text.
    pub fn fixed_fallback(plan: &ReplyPlan) -> ReplyCandidate {
        let text = if plan.handler == HandlerId::Safety {
            SAFETY_FALLBACK
        } else {
            GENERIC_FALLBACK
        };
        let mut candidate = ReplyCandidate::new(text, plan.handler, FIXED_POOL)
            .with_concern(plan.concern)
            .with_timing_multiplier(plan.timing_multiplier);
        candidate.fallback = true;
        candidate
    }

    /// Generates a candidate. Never fails: unresolvable pools end at the fixed fallback text.
    pub fn generate<R: Rng + ?Sized>(&self, plan: &ReplyPlan, rng: &mut R) -> ReplyCandidate {
        match self.try_generate(plan, rng, &[]) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(target: "hearth::generator", handler = %plan.handler, error = %e, "Generation failed, using fixed fallback");
                Self::fixed_fallback(plan)
            }
        }
    }

    /// A different draw for the same plan, avoiding `exclude`. `None` once alternatives run out.
    pub fn redraw<R: Rng + ?Sized>(
        &self,
        plan: &ReplyPlan,
        rng: &mut R,
        exclude: &[String],
    ) -> Option<ReplyCandidate> {
        self.try_generate(plan, rng, exclude).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{BuiltinCorpus, TomlCorpus};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn plan(handler: HandlerId, pools: &[&str], values: &[(&str, &str)]) -> ReplyPlan {
        ReplyPlan {
            handler,
            pools: pools.iter().map(|p| p.to_string()).collect(),
            composition: Composition::Template,
            concern: None,
            timing_multiplier: 1.0,
            allow_disclosure: false,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn builtin() -> ResponseGenerator {
        ResponseGenerator::new(Arc::new(BuiltinCorpus))
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let g = builtin();
        let p = plan(HandlerId::Introduction, &["introduction"], &[]);
        let a = g.generate(&p, &mut StdRng::seed_from_u64(42));
        let b = g.generate(&p, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.text, b.text);
        assert_eq!(a.pool_key, "introduction");
        assert!(!a.fallback);
    }

    #[test]
    fn unfillable_templates_are_skipped() {
        let g = builtin();
        let mut rng = StdRng::seed_from_u64(1);
        // No {team} value: the sports pool is unusable, the plain pool is used.
        let p = plan(HandlerId::SmallTalk, &["small_talk.sports", "small_talk"], &[]);
        for _ in 0..10 {
            assert_eq!(g.generate(&p, &mut rng).pool_key, "small_talk");
        }
        let p = plan(HandlerId::SmallTalk, &["small_talk.sports"], &[("team", "Lakers")]);
        assert!(g.generate(&p, &mut rng).text.contains("Lakers"));
    }

    #[test]
    fn missing_pool_falls_back_to_generic() {
        let g = builtin();
        let p = plan(HandlerId::Adaptive, &["no.such.pool"], &[]);
        let c = g.generate(&p, &mut StdRng::seed_from_u64(3));
        assert_eq!(c.pool_key, GENERIC_POOL);
        assert!(c.fallback);
    }

    #[test]
    fn safety_has_its_own_innermost_fallback() {
        let empty = ResponseGenerator::new(Arc::new(TomlCorpus::default()));
        let p = plan(HandlerId::Safety, &["safety.crisis"], &[]);
        let c = empty.generate(&p, &mut StdRng::seed_from_u64(0));
        assert_eq!(c.text, SAFETY_FALLBACK);
        assert!(c.fallback);

        let p = plan(HandlerId::Adaptive, &["adaptive"], &[]);
        assert_eq!(empty.generate(&p, &mut StdRng::seed_from_u64(0)).text, GENERIC_FALLBACK);
    }

    #[test]
    fn reflection_composes_clauses_and_a_question() {
        let g = builtin();
        let mut p = plan(
            HandlerId::Reflection,
            &[],
            &[("topic", "work"), ("feeling", "stressed")],
        );
        p.composition = Composition::Reflection;
        let c = g.generate(&p, &mut StdRng::seed_from_u64(9));
        assert_eq!(c.pool_key, COMPOSED_POOL);
        assert!(c.text.contains("work"));
        assert!(c.text.contains("stressed"));
        assert!(c.text.ends_with('?'));
    }

    #[test]
    fn redraw_avoids_excluded_texts() {
        let g = builtin();
        let p = plan(HandlerId::Introduction, &["introduction"], &[]);
        let mut rng = StdRng::seed_from_u64(5);
        let all = BuiltinCorpus.templates("introduction");
        let c = g.redraw(&p, &mut rng, &all[..2]).unwrap();
        assert_eq!(c.text, all[2]);

        // Excluding every pool entry (introduction + generic) leaves nothing.
        let mut everything = all.clone();
        everything.extend(BuiltinCorpus.templates("generic"));
        assert!(g.redraw(&p, &mut rng, &everything).is_none());
    }
}
