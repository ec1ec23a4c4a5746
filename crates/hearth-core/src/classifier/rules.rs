//! Declarative concern rule table: pattern → tag → priority.
//!
//! One ordered table feeds the single evaluator in `concern`. Rules either list their own patterns
//! or name shared sets from `patterns`, which the special-case and severity checks read too. A TOML
//! file (`detectors.rules_path`) can replace the `[[rule]]` entries, override named sets under
//! `[patterns]`, or both; a file with only `[patterns]` keeps the built-in rules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::patterns::{self, compile_pattern, PatternEntry, PatternSets};
use crate::error::{HearthError, HearthResult};
use crate::shared::ConcernTag;

/// One rule as written in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Detector name, also used by `detectors.disabled`.
    pub name: String,
    pub tag: ConcernTag,
    /// Lower runs first.
    pub priority: u16,
    /// At least one of these, or of the named `sets`, must match.
    #[serde(default)]
    pub any: Vec<String>,
    /// Named pattern sets whose entries count as `any` patterns.
    #[serde(default)]
    pub sets: Vec<String>,
    /// When non-empty, at least one must also match.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Optional rules may be left out of the registry by configuration.
    #[serde(default)]
    pub optional: bool,
}

/// A rules file: ordered rules plus named pattern-set overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleTable {
    #[serde(rename = "rule", default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub patterns: BTreeMap<String, Vec<PatternEntry>>,
}

impl RuleTable {
    /// Built-in rules, no overrides.
    pub fn builtin() -> Self {
        Self {
            rules: builtin_rules(),
            patterns: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> HearthResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates a table; rules come back sorted by priority.
    pub fn parse(content: &str) -> HearthResult<Self> {
        let mut table: RuleTable = toml::from_str(content)?;
        if table.rules.is_empty() {
            table.rules = builtin_rules();
        }
        for rule in &table.rules {
            if rule.any.is_empty() && rule.sets.is_empty() {
                return Err(HearthError::detector(
                    &rule.name,
                    "rule has no `any` patterns or `sets`",
                ));
            }
        }
        table.rules.sort_by_key(|r| r.priority);
        Ok(table)
    }

    /// The built-in pattern sets with this table's overrides applied.
    pub fn pattern_sets(&self) -> HearthResult<PatternSets> {
        PatternSets::builtin().with_overrides(&self.patterns)
    }
}

struct BuiltinRule {
    name: &'static str,
    tag: ConcernTag,
    priority: u16,
    any: &'static [&'static str],
    sets: &'static [&'static str],
    requires: &'static [&'static str],
    optional: bool,
}

const BUILTIN: &[BuiltinRule] = &[
    BuiltinRule {
        name: "crisis",
        tag: ConcernTag::Crisis,
        priority: 10,
        any: &[
            r"\bkill(ing)? myself\b",
            r"\bsuicid(e|al)\b",
            r"\bend (my|it all|my own) life\b|\bend it all\b",
            r"\bwant(ed)? to die\b",
            r"\btake my (own )?life\b",
            r"\b(no reason to live|better off dead)\b",
        ],
        sets: &[],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "tentative-harm",
        tag: ConcernTag::TentativeHarm,
        priority: 20,
        any: &[
            r"\b(hurt|harm|cut|cutting) myself\b",
            r"\bself[- ]?harm\w*\b",
            r"\bdon'?t want to (be here|exist) anymore\b",
            r"\bwish i (wasn'?t|weren'?t|was never) (here|born|alive)\b",
            r"\b(not|never) wake up\b",
            r"\bwhat'?s the point (of|in) (living|going on|anything)\b",
            r"\bdisappear (forever|for good)\b",
        ],
        sets: &[],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "weather-related",
        tag: ConcernTag::WeatherRelated,
        priority: 30,
        any: &[],
        sets: &[patterns::WEATHER],
        requires: &[],
        optional: true,
    },
    BuiltinRule {
        name: "cultural-adjustment",
        tag: ConcernTag::CulturalAdjustment,
        priority: 40,
        any: &[],
        sets: &[patterns::CULTURAL],
        requires: &[],
        optional: true,
    },
    BuiltinRule {
        name: "pet-illness",
        tag: ConcernTag::PetIllness,
        priority: 50,
        any: &[
            r"\b(dogs?|pupp(y|ies)|cats?|kitt(en|y)|pets?|bird|parrot|hamster|rabbit|bunny|horse)\b",
            r"\bmy (dog|puppy|cat|kitten|pet|bird|parrot|hamster|rabbit|bunny|horse)\b",
        ],
        sets: &[],
        requires: &[
            r"\b(sick|ill|vet|lost|died|dying|passed|put down|put to sleep|cancer|tumou?r|surgery|missing|ran away)\b",
        ],
        optional: true,
    },
    BuiltinRule {
        name: "medical",
        tag: ConcernTag::Medical,
        priority: 60,
        any: &[
            r"\bchest pains?\b|\bcan'?t breathe\b",
            r"\bdiagnos(ed|is)\b",
            r"\b(cancer|tumou?r|seizures?|stroke|heart attack)\b",
            r"\b(bleeding|fainted|passing out)\b",
            r"\b(surgery|biopsy|chemo(therapy)?)\b",
            r"\bmy doctor (said|says|told)\b",
        ],
        sets: &[],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "mental-health",
        tag: ConcernTag::MentalHealth,
        priority: 70,
        any: &[
            r"\bdepress(ed|ion)\b",
            r"\b(anxiety|panic) disorder\b",
            r"\b(bipolar|schizo\w*|ocd|psychosis)\b",
            r"\b(psychiatrist|antidepressants?|therapist)\b",
            r"\bmental (health|illness)\b",
            r"\bhearing voices\b",
        ],
        sets: &[],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "eating-disorder",
        tag: ConcernTag::EatingDisorder,
        priority: 80,
        any: &[
            r"\b(anorexi\w*|bulimi\w*)\b",
            r"\bbinge?(ing)?( eating)?\b",
            r"\bpurg(e|ed|ing)\b",
            r"\bstarv(e|ing) myself\b",
            r"\bthrow(ing)? up after (eating|meals)\b",
            r"\bcount(ing)? every calorie\b",
        ],
        sets: &[],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "substance-use",
        tag: ConcernTag::SubstanceUse,
        priority: 90,
        any: &[],
        sets: &[patterns::SUBSTANCE],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "ptsd",
        tag: ConcernTag::Ptsd,
        priority: 100,
        any: &[],
        sets: &[patterns::PTSD],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "trauma-response",
        tag: ConcernTag::TraumaResponse,
        priority: 110,
        any: &[],
        sets: &[patterns::TRAUMA],
        requires: &[],
        optional: false,
    },
    BuiltinRule {
        name: "mild-gambling",
        tag: ConcernTag::MildGambling,
        priority: 120,
        any: &[
            r"\bgambl\w*\b",
            r"\b(betting|bets?|wager\w*)\b",
            r"\b(casino|slot machines?|poker|lottery tickets?)\b",
        ],
        sets: &[],
        requires: &[],
        optional: true,
    },
    BuiltinRule {
        name: "grief",
        tag: ConcernTag::Grief,
        priority: 130,
        any: &[],
        sets: &[patterns::GRIEF],
        requires: &[],
        optional: true,
    },
];

/// Built-in rule table in priority order.
pub fn builtin_rules() -> Vec<RuleSpec> {
    BUILTIN
        .iter()
        .map(|r| RuleSpec {
            name: r.name.to_string(),
            tag: r.tag,
            priority: r.priority,
            any: r.any.iter().map(|p| p.to_string()).collect(),
            sets: r.sets.iter().map(|p| p.to_string()).collect(),
            requires: r.requires.iter().map(|p| p.to_string()).collect(),
            optional: r.optional,
        })
        .collect()
}

/// A rule with its patterns and named sets compiled (case-insensitive).
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub spec: RuleSpec,
    any: Vec<Regex>,
    requires: Vec<Regex>,
}

impl CompiledRule {
    pub fn compile(spec: RuleSpec, sets: &PatternSets) -> HearthResult<Self> {
        let mut any = spec
            .any
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<HearthResult<Vec<_>>>()?;
        for name in &spec.sets {
            if !sets.contains(name) {
                return Err(HearthError::detector(
                    &spec.name,
                    format!("unknown pattern set `{}`", name),
                ));
            }
            any.extend(sets.get(name).regexes().cloned());
        }
        let requires = spec
            .requires
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<HearthResult<Vec<_>>>()?;
        Ok(Self {
            spec,
            any,
            requires,
        })
    }

    /// Number of distinct patterns that matched, or `None` when the rule does not fire.
    pub fn evaluate(&self, text: &str) -> Option<u8> {
        let any_hits = self.any.iter().filter(|p| p.is_match(text)).count();
        if any_hits == 0 {
            return None;
        }
        let required_hits = self.requires.iter().filter(|p| p.is_match(text)).count();
        if !self.requires.is_empty() && required_hits == 0 {
            return None;
        }
        Some((any_hits + required_hits).min(u8::MAX as usize) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> CompiledRule {
        let spec = builtin_rules()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap();
        CompiledRule::compile(spec, &PatternSets::builtin()).unwrap()
    }

    #[test]
    fn builtin_table_compiles_in_priority_order() {
        let rules = builtin_rules();
        assert_eq!(rules[0].tag, ConcernTag::Crisis);
        assert!(rules.windows(2).all(|w| w[0].priority < w[1].priority));
        let sets = PatternSets::builtin();
        for spec in rules {
            CompiledRule::compile(spec, &sets).unwrap();
        }
    }

    #[test]
    fn requires_gates_the_rule() {
        let pet = rule("pet-illness");
        assert_eq!(pet.evaluate("my dog is so cute"), None);
        assert!(pet.evaluate("I just lost my dog").unwrap() >= 2);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(rule("crisis").evaluate("I WANT TO KILL MYSELF").is_some());
    }

    #[test]
    fn shared_sets_feed_the_rules() {
        assert!(rule("weather-related").evaluate("the power went out last night").is_some());
        assert!(rule("weather-related").evaluate("grey skies for weeks").is_some());
        assert!(rule("grief").evaluate("she's not here anymore").is_some());
    }

    #[test]
    fn toml_table_parses_and_sorts() {
        let table = RuleTable::parse(
            r#"
            [[rule]]
            name = "late"
            tag = "grief"
            priority = 50
            any = ["funeral"]

            [[rule]]
            name = "early"
            tag = "crisis"
            priority = 1
            any = ["kill myself"]
            "#,
        )
        .unwrap();
        assert_eq!(table.rules[0].name, "early");
        assert_eq!(table.rules[1].tag, ConcernTag::Grief);
        assert!(table.patterns.is_empty());
    }

    #[test]
    fn pattern_overrides_keep_builtin_rules() {
        let table = RuleTable::parse(
            r#"
            [patterns]
            weather = ['\bmonsoon\b']
            "#,
        )
        .unwrap();
        assert_eq!(table.rules, builtin_rules());
        let sets = table.pattern_sets().unwrap();
        let spec = table
            .rules
            .into_iter()
            .find(|r| r.name == "weather-related")
            .unwrap();
        let weather = CompiledRule::compile(spec, &sets).unwrap();
        assert!(weather.evaluate("monsoon season again").is_some());
        assert!(weather.evaluate("we're snowed in").is_none());
    }

    #[test]
    fn rule_without_patterns_is_rejected() {
        let err = RuleTable::parse(
            r#"
            [[rule]]
            name = "empty"
            tag = "medical"
            priority = 1
            "#,
        );
        assert!(matches!(err, Err(HearthError::Detector { .. })));
    }

    #[test]
    fn unknown_set_is_reported() {
        let spec = RuleSpec {
            name: "typo".into(),
            tag: ConcernTag::WeatherRelated,
            priority: 1,
            any: vec![],
            sets: vec!["wether".into()],
            requires: vec![],
            optional: false,
        };
        assert!(matches!(
            CompiledRule::compile(spec, &PatternSets::builtin()),
            Err(HearthError::Detector { .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let spec = RuleSpec {
            name: "broken".into(),
            tag: ConcernTag::Medical,
            priority: 1,
            any: vec!["(unclosed".into()],
            sets: vec![],
            requires: vec![],
            optional: false,
        };
        assert!(matches!(
            CompiledRule::compile(spec, &PatternSets::builtin()),
            Err(HearthError::InvalidPattern { .. })
        ));
    }
}
