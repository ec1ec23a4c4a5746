//! Named pattern sets: every trigger list the classifiers use, defined once.
//!
//! The concern rule table references sets by name (`sets = ["weather"]`), and the special-case
//! flags, severity scoring and turn signals read the same sets, so a phrase added to `weather`
//! reaches both the weather concern and the weather special case. A rules file
//! (`detectors.rules_path`) can replace any set under `[patterns]`:
//!
//! ```toml
//! [patterns]
//! weather = ['\bmonsoon\b', '\bsnowed in\b']
//! ptsd = [{ pattern = '\bflash ?backs?\b', weight = 2 }, '\bptsd\b']
//! ```
//!
//! Matching is case-insensitive. Weights only matter to the severity scorers; a bare pattern
//! weighs 1.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{HearthError, HearthResult};

pub const WEATHER: &str = "weather";
pub const CULTURAL: &str = "cultural";
pub const GRIEF: &str = "grief";
/// PTSD triggers; weights feed the PTSD tier.
pub const PTSD: &str = "ptsd";
/// Extra PTSD tier markers that do not trigger the concern on their own.
pub const PTSD_SEVERITY: &str = "ptsd-severity";
pub const TRAUMA: &str = "trauma";
/// Substance mentions; weights feed the substance-use tier.
pub const SUBSTANCE: &str = "substance";
/// Extra substance-use tier markers that do not trigger the concern on their own.
pub const SUBSTANCE_SEVERITY: &str = "substance-severity";
pub const INPATIENT: &str = "inpatient";
pub const QUESTION: &str = "question";
pub const SARCASM: &str = "sarcasm";
pub const FEEDBACK_COMPLAINT: &str = "feedback-complaint";
pub const ESCALATION: &str = "escalation";
pub const IDENTITY: &str = "identity";
pub const SUGGESTION: &str = "suggestion";
pub const DEFENSIVE: &str = "defensive";
pub const GREETING: &str = "greeting";
pub const PERSONAL_SHARING: &str = "personal-sharing";
pub const SMALL_TALK: &str = "small-talk";
pub const REFLECTION: &str = "reflection";
pub const POLITICAL: &str = "political";

enum Builtin {
    Plain(&'static [&'static str]),
    Weighted(&'static [(&'static str, u8)]),
}

const BUILTIN: &[(&str, Builtin)] = &[
    (
        WEATHER,
        Builtin::Plain(&[
            r"\b(snowed|stuck|trapped) (in|inside|indoors)\b",
            r"\b(blizzard|hurricane|heat ?wave|storm|tornado|flood(ing)?)\b",
            r"\b(winter blues|gloomy (weather|days)|gr[ae]y skies)\b",
            r"\bpower (is |went )?out\b",
            r"\bcan'?t (go|get) out(side)? because of the (weather|snow|rain|storm)\b",
        ]),
    ),
    (
        CULTURAL,
        Builtin::Plain(&[
            r"\bculture shock\b",
            r"\b(new country|moved here from|immigra\w*|expat)\b",
            r"\bhomesick\b",
            r"\b(language barrier|my accent|don'?t fit in here)\b",
            r"\binternational student\b",
        ]),
    ),
    (
        GRIEF,
        Builtin::Plain(&[
            r"\b(passed away|died|death|dead now)\b",
            r"\bfuneral\b",
            r"\b(griev\w*|grief|mourning|bereave\w*)\b",
            r"\b(lost|losing) my (mom|mum|dad|mother|father|wife|husband|partner|son|daughter|brother|sister|friend|best friend|grandma|grandpa|grandmother|grandfather|baby|dog|cat|pet)\b",
            r"\bmiss (him|her|them) so much\b",
            r"\b(he|she|they)('s| is| are) (gone forever|not here anymore|never coming back)\b",
            r"\banniversary of (his|her|their|the) (death|passing)\b",
        ]),
    ),
    (
        PTSD,
        Builtin::Weighted(&[
            (r"\bptsd\b", 1),
            (r"\bflash ?backs?\b", 2),
            (r"\bpanic attacks?\b", 2),
            (r"\b(dissociat\w*|feels? unreal|out of my body)\b", 2),
            (r"\bnightmares? (about|of|from)\b", 1),
            (r"\bhypervigilan\w*\b", 1),
            (r"\btriggered\b", 1),
        ]),
    ),
    (
        PTSD_SEVERITY,
        Builtin::Weighted(&[
            (r"\bcan'?t (leave|go outside|leave the house)\b", 2),
            (r"\b(every night|can'?t sleep|no sleep)\b", 1),
            (r"\b(on edge|jumpy)\b", 1),
        ]),
    ),
    (
        TRAUMA,
        Builtin::Plain(&[
            r"\btrauma(tic|tized|tised)?\b",
            r"\b(was|got|been|being) (assaulted|attacked|abused)\b",
            r"\b(abusive|assault(ed)?)\b",
            r"\b(the|my|a|car) (accident|crash)\b",
            r"\bcan'?t stop thinking about what happened\b",
            r"\bnightmares?\b",
            r"\b(reliving|keeps? replaying)\b",
            r"\b(in combat|deployment)\b",
        ]),
    ),
    (
        SUBSTANCE,
        Builtin::Weighted(&[
            (r"\b(drinking|drunk|drinks|alcohol|booze|hungover|beers?|wine|vodka|whiskey)\b", 0),
            (r"\b(weed|marijuana|cannabis|getting high)\b", 0),
            (r"\b(pills|opioids?|oxy|cocaine|meth|heroin|fentanyl|xanax)\b", 0),
            (r"\b(sober|sobriety)\b", 0),
            (r"\b(relapsed?|using again|fell off the wagon)\b", 1),
            (r"\b(addicted|addiction)\b", 2),
            (r"\b(overdos(e|ed|ing)|od'?d)\b", 4),
        ]),
    ),
    (
        SUBSTANCE_SEVERITY,
        Builtin::Weighted(&[
            (r"\b(withdrawals?|the shakes|detox)\b", 2),
            (r"\b(black(ed)? ?outs?|can'?t remember last night)\b", 2),
            (r"\b(can'?t stop|cannot stop|out of control|dependent)\b", 2),
            (r"\b(every (day|night|morning)|daily|all day)\b", 1),
            (r"\b(hiding (it|bottles)|nobody knows how much)\b", 1),
        ]),
    ),
    (
        INPATIENT,
        Builtin::Plain(&[
            r"\b(inpatient|psych(iatric)? ward|mental hospital|residential (treatment|program))\b",
            r"\b(hospitali[sz]ed|admitted|committed)\b",
        ]),
    ),
    (
        QUESTION,
        Builtin::Plain(&[
            r"\?\s*$",
            r"^\s*(what|how|will|would|can|could|should|do|does|is|are)\b",
            r"\bwhat (is it|happens|would happen)\b",
        ]),
    ),
    (
        SARCASM,
        Builtin::Plain(&[
            r"\byou('re| are) (useless|not helping|no help|stupid|worthless|not listening)\b",
            r"\bwow,? (thanks|great|so helpful)\b",
            r"\bthanks for nothing\b",
            r"\b(oh|yeah),? (great|sure|right),? (that|like) (helps|will help|that helps)\b",
            r"\bare you even listening\b",
            r"\bwhat a (great|helpful|useful) (answer|response|reply)\b",
            r"\bthis is (pointless|useless)\b",
            r"\byou don'?t get it\b",
        ]),
    ),
    (
        FEEDBACK_COMPLAINT,
        Builtin::Plain(&[
            r"\byou (keep|always) (saying|asking|repeating)\b",
            r"\byou('ve| have)? already (said|asked)\b",
            r"\b(same (thing|question|answer) (again|over)|stop repeating)\b",
            r"\b(going (around )?in circles|broken record)\b",
            r"\byou (just )?said that\b",
            r"\bi already (told|said|answered)\b",
        ]),
    ),
    (
        ESCALATION,
        Builtin::Plain(&[r"!{2,}", r"\bi already told you\b"]),
    ),
    (
        IDENTITY,
        Builtin::Plain(&[
            r"\bare you (a |an )?(real|human|person|bot|robot|ai|machine|actually)\b",
            r"\bwho are you really\b",
            r"\bis this a (bot|real person|human)\b",
            r"\bam i (talking|speaking|chatting) (to|with) a (bot|person|human|machine|computer)\b",
            r"\bare you (someone|somebody) else\b",
            r"\bwhat are you\s*\?",
        ]),
    ),
    (
        SUGGESTION,
        Builtin::Plain(&[
            r"\bhave you (tried|considered|thought about)\b",
            r"\byou (could|might|should|may want to) (try|consider)\b",
            r"\b(maybe try|what if you|it might help to|it could help to)\b",
        ]),
    ),
    (
        DEFENSIVE,
        Builtin::Plain(&[
            r"\bi already (tried|do|did|have)\b",
            r"\bthat (won'?t|doesn'?t|wouldn'?t|will not|does not) (work|help)\b",
            r"\b(easy for you to say|stop telling me|i don'?t need advice|not helpful)\b",
            r"\byou don'?t understand\b",
            r"\b(that'?s not (it|the point)|yeah right)\b",
        ]),
    ),
    (
        GREETING,
        Builtin::Plain(&[
            r"^\s*(hi|hello|hey|hiya|howdy|greetings|yo|good (morning|afternoon|evening))\b",
        ]),
    ),
    (
        PERSONAL_SHARING,
        Builtin::Plain(&[
            r"\bmy (mom|mum|dad|wife|husband|partner|kids?|son|daughter|friend|boss|family|girlfriend|boyfriend)\b",
            r"\bi (went|started|finished|got|moved|used to|have been|was)\b",
            r"\b(yesterday|today|last (week|night|weekend)),? i\b",
        ]),
    ),
    (
        SMALL_TALK,
        Builtin::Plain(&[
            r"\b(how are you|how's it going|what'?s up|how was your day)\b",
            r"\b(sports?|game|match|playoffs?|season)\b",
            r"\b(movies?|tv|shows?|series|netflix|music|songs?|album|concert)\b",
            r"\b(weekend|vacation|holiday)\b",
            r"\b(food|dinner|lunch|breakfast|cook(ing)?|recipe)\b",
            r"\b(hobby|hobbies|hiking|gaming|reading)\b",
        ]),
    ),
    (
        REFLECTION,
        Builtin::Plain(&[
            r"\b(struggling|struggle|hard time|it'?s hard|difficult|been a lot)\b",
            r"\b(can'?t cope|tired of|worried about|stressed about|scared of)\b",
            r"\b(i feel|i'?ve been feeling|makes me feel)\b",
        ]),
    ),
    (
        POLITICAL,
        Builtin::Plain(&[
            r"\b(election|president|government|politic\w*|congress|senate|parliament)\b",
            r"\b(democrats?|republicans?|liberals?|conservatives?|vote|voting|protest\w*)\b",
        ]),
    ),
];

/// Compiles one table pattern, case-insensitive.
pub(crate) fn compile_pattern(pattern: &str) -> HearthResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| HearthError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn default_weight() -> u8 {
    1
}

/// One entry as written in a `[patterns]` table: a bare pattern or `{ pattern, weight }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternEntry {
    Plain(String),
    Weighted {
        pattern: String,
        #[serde(default = "default_weight")]
        weight: u8,
    },
}

impl PatternEntry {
    pub fn pattern(&self) -> &str {
        match self {
            PatternEntry::Plain(p) => p,
            PatternEntry::Weighted { pattern, .. } => pattern,
        }
    }

    pub fn weight(&self) -> u8 {
        match self {
            PatternEntry::Plain(_) => default_weight(),
            PatternEntry::Weighted { weight, .. } => *weight,
        }
    }
}

#[derive(Debug, Clone)]
struct Compiled {
    regex: Regex,
    weight: u8,
}

/// A compiled, weighted pattern list.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    entries: Vec<Compiled>,
}

static EMPTY: PatternSet = PatternSet {
    entries: Vec::new(),
};

impl PatternSet {
    pub fn compile(entries: &[PatternEntry]) -> HearthResult<Self> {
        let entries = entries
            .iter()
            .map(|e| {
                Ok(Compiled {
                    regex: compile_pattern(e.pattern())?,
                    weight: e.weight(),
                })
            })
            .collect::<HearthResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.entries.iter().any(|e| e.regex.is_match(text))
    }

    /// Number of distinct patterns that match.
    pub fn hits(&self, text: &str) -> usize {
        self.entries.iter().filter(|e| e.regex.is_match(text)).count()
    }

    /// Sum of the weights of the matching patterns.
    pub fn score(&self, text: &str) -> u8 {
        self.entries
            .iter()
            .filter(|e| e.regex.is_match(text))
            .fold(0u8, |acc, e| acc.saturating_add(e.weight))
    }

    pub fn regexes(&self) -> impl Iterator<Item = &Regex> {
        self.entries.iter().map(|e| &e.regex)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All named sets, resolved once per pipeline.
#[derive(Debug, Clone, Default)]
pub struct PatternSets {
    sets: BTreeMap<String, PatternSet>,
}

static BUILTIN_SETS: Lazy<Arc<PatternSets>> = Lazy::new(|| Arc::new(compile_builtin()));

/// Built-in entries are literals covered by unit tests, so one that fails to compile is dropped
/// rather than aborting (the tests assert none are dropped).
fn compile_builtin() -> PatternSets {
    let compile = |p: &str, weight: u8| {
        compile_pattern(p)
            .ok()
            .map(|regex| Compiled { regex, weight })
    };
    let sets = BUILTIN
        .iter()
        .map(|(name, entries)| {
            let entries = match entries {
                Builtin::Plain(ps) => ps.iter().filter_map(|p| compile(p, 1)).collect(),
                Builtin::Weighted(ws) => ws.iter().filter_map(|(p, w)| compile(p, *w)).collect(),
            };
            (name.to_string(), PatternSet { entries })
        })
        .collect();
    PatternSets { sets }
}

impl PatternSets {
    /// The built-in sets, compiled once per process.
    pub fn builtin() -> Arc<PatternSets> {
        Arc::clone(&BUILTIN_SETS)
    }

    /// Copy of these sets with each named override replacing the set of the same name. Names that
    /// are not built in become new sets that rules can reference.
    pub fn with_overrides(
        &self,
        overrides: &BTreeMap<String, Vec<PatternEntry>>,
    ) -> HearthResult<Self> {
        let mut sets = self.sets.clone();
        for (name, entries) in overrides {
            if !sets.contains_key(name) {
                tracing::debug!(target: "hearth::classifier", set = %name, "Adding custom pattern set");
            }
            if entries.is_empty() {
                tracing::info!(target: "hearth::classifier", set = %name, "Pattern set emptied by rule table");
            }
            sets.insert(name.clone(), PatternSet::compile(entries)?);
        }
        Ok(Self { sets })
    }

    /// The named set; an unknown name yields an empty set that never matches.
    pub fn get(&self, name: &str) -> &PatternSet {
        self.sets.get(name).unwrap_or(&EMPTY)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}
