//! Pattern-based classification of user utterances.
//!
//! - `patterns`: named pattern sets shared by every battery below
//! - `concern`: ConcernClassifier and the detector registry
//! - `rules`: declarative rule table (pattern → tag → priority)
//! - `severity`: substance-use/PTSD tiers, grief and trauma signals
//! - `special`: SpecialCaseClassifier flags
//! - `signals`: router-level turn signals (stated feeling, greeting, small talk, ...)
//! - `entities`: feeling/topic/location/team/pet extraction
//! - `similarity`: content-word Jaccard similarity

pub mod concern;
pub mod entities;
pub mod patterns;
pub mod rules;
pub mod severity;
pub mod signals;
pub mod similarity;
pub mod special;

pub use concern::{Classification, ConcernClassifier, ConcernDetector, DetectorRegistry, RuleDetector};
pub use entities::{extract_entities, Entities};
pub use patterns::{PatternEntry, PatternSet, PatternSets};
pub use rules::{builtin_rules, CompiledRule, RuleSpec, RuleTable};
pub use severity::{GriefSignals, TraumaSignals};
pub use signals::TurnSignals;
pub use special::{classify_special_cases, SpecialCases};
