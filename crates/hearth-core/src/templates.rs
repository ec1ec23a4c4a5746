//! Template corpus: read-only pools of reply strings keyed by context.
//!
//! The orchestrator only ever talks to a `TemplateProvider`, so corpora can be swapped (built-in,
//! TOML file, or a layered combination) without touching routing or generation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{HearthError, HearthResult};

/// Last-resort reply when every pool is exhausted or the pipeline fails.
pub const GENERIC_FALLBACK: &str = "I'm listening. Would you like to tell me more about that?";

/// Fixed text used when repetition avoidance runs out of alternatives.
pub const REFOCUS_FALLBACK: &str =
    "Let's pause and refocus for a moment. What feels most important for us to talk about right now?";

/// Innermost safety reply, independent of any corpus.
pub const SAFETY_FALLBACK: &str = "I'm really glad you told me, and your safety matters most right now. If you might act on these thoughts, please call or text 988 (in the US) or your local emergency number. I'm staying right here with you.";

/// Read-only source of reply templates.
pub trait TemplateProvider: Send + Sync {
    /// Templates for a pool key; empty when the provider has no such pool.
    fn templates(&self, pool_key: &str) -> Vec<String>;

    fn name(&self) -> &str {
        "provider"
    }
}

// ---------------------------------------------------------------------------
// Built-in corpus
// ---------------------------------------------------------------------------

const BUILTIN: &[(&str, &[&str])] = &[
    ("identity", &[
        "I'm a support companion here to listen, nothing more hidden behind the curtain. What's been on your mind?",
        "Good question. I'm the same listener you've been talking with all along. What would you like to focus on?",
        "I'm here as a supportive listener, not pretending to be anyone else. Shall we get back to what you were sharing?",
    ]),
    ("deescalation", &[
        "That's fair, and I'm sorry that missed the mark. What would actually be helpful right now?",
        "You're right to call that out. Let me slow down and listen better. What did I get wrong?",
        "I hear your frustration, and it makes sense. Tell me what you need from this conversation.",
    ]),
    ("feedback_loop", &[
        "You're right, I've been circling. Thank you for telling me. Let's try a different angle: what matters most here?",
        "I hear you, and I'm sorry for repeating myself. What part of this haven't I understood yet?",
        "Thanks for your patience with me. Let's move forward instead of going over the same ground. Where should we go next?",
    ]),
    ("validation", &[
        "Feeling {feeling} is really hard, and it makes sense given what you're carrying. What's been weighing on you most?",
        "Thank you for naming that you feel {feeling}. That takes honesty. When did it start to build up?",
        "It's okay to feel {feeling}. You don't have to push it away here. What does it feel like today?",
        "That sounds genuinely hard. Being {feeling} can wear a person down. What would ease it even a little?",
    ]),
    ("safety.crisis", &[
        "I'm really glad you told me, and I'm taking this seriously. Your life matters. Please call or text 988 (in the US) or your local emergency number right now. Are you safe at this moment?",
        "Thank you for trusting me with something this heavy. You deserve support right now: please reach out to 988 or local emergency services. Can you tell me whether you're somewhere safe?",
    ]),
    ("safety.tentative", &[
        "I'm glad you shared that with me. Thoughts like these deserve real support. If things feel unsafe, please call or text 988 or your local emergency number. What's making today so heavy?",
        "That sounds incredibly painful, and I'm here with you. If you feel you might hurt yourself, please contact 988 or emergency services. Would you tell me a bit more about what's going on?",
    ]),
    ("situational.inpatient", &[
        "That's a really understandable question. Inpatient care is usually about giving people a safe, structured place to stabilize. What's making you think about it?",
        "It's natural to wonder what it would be like. A care team can walk you through exactly what to expect. What worries you most about it?",
    ]),
    ("situational.weather", &[
        "Being stuck inside with this weather can make everything feel smaller. How have you been passing the time?",
        "Weather like this really can weigh on your mood. What helps you feel a little less cooped up?",
        "Days like these can feel isolating. Who have you been able to stay in touch with?",
    ]),
    ("situational.cultural", &[
        "Adjusting to a new place is a lot, and it can feel lonely even when you're surrounded by people. What's been the hardest part?",
        "Settling into life in {location} takes real courage. What do you miss most from home?",
        "Culture shock can be exhausting in ways people don't see. What has surprised you the most so far?",
    ]),
    ("pet_illness", &[
        "I'm so sorry about your {pet}. They're family, and worrying about them is heavy. How are you holding up?",
        "That sounds really painful. The bond with a {pet} runs deep. Would you like to tell me about them?",
        "I'm sorry you're going through this with your pet. Losing or fearing for a companion hurts a lot. What's been hardest?",
    ]),
    ("grief", &[
        "I'm so sorry for your loss. Grief has no schedule, and whatever you're feeling is allowed. Would you like to tell me about them?",
        "That's a tremendous loss, and I'm sorry you're carrying it. What has the last while been like for you?",
        "I'm sorry. Missing someone can show up in unexpected moments. What do you find yourself remembering most?",
    ]),
    ("clinical.medical", &[
        "That sounds frightening, and I'm glad you told me. Have you been able to talk with a doctor about what's happening?",
        "I'm sorry you're dealing with this. Health worries can take over everything. What have the doctors told you so far?",
    ]),
    ("clinical.mental_health", &[
        "Thank you for sharing that with me. Your mental health matters, and talking with a professional can really help. How long has this been going on?",
        "I'm glad you told me. That sounds like a lot to carry. Do you have anyone, like a counselor, supporting you with it?",
    ]),
    ("clinical.eating_disorder", &[
        "Thank you for trusting me with this. Struggles with food and body image are serious and you deserve support. Is anyone helping you with it right now?",
        "I hear how hard this is. You deserve care that doesn't judge. Would you feel able to talk with a specialist about it?",
    ]),
    ("clinical.substance_use", &[
        "Thank you for being honest about this. It takes strength to say out loud. How has it been affecting your days?",
        "I hear you, and there's no judgement here. Support for substance use really can make a difference. Have you thought about reaching out to someone?",
    ]),
    ("clinical.ptsd", &[
        "That sounds exhausting to live with, and I'm glad you told me. Trauma specialists can help with symptoms like these. How often are they happening?",
        "I hear you. Those experiences can feel overwhelming, and support is available. What tends to bring them on?",
    ]),
    ("soft.gambling", &[
        "It sounds like betting has been on your mind. How do you feel about the role it plays in your life right now?",
        "Thanks for mentioning that. What draws you to it, and how do you feel afterwards?",
    ]),
    ("soft.ptsd", &[
        "That sounds unsettling. Bad nights can linger into the day. What helps you feel grounded afterwards?",
        "Thank you for sharing that. Memories can resurface in uneasy ways. How have you been coping with it?",
    ]),
    ("soft.trauma", &[
        "That sounds like it left a real mark. You can share as much or as little as you want here. How are you feeling about it now?",
        "Thank you for telling me. What happened sounds hard, and your reactions make sense. What's been helping you carry it?",
    ]),
    ("soft.substance", &[
        "Thanks for mentioning that. How do you feel about where it fits in your life at the moment?",
        "I appreciate you sharing that. Has it been on your mind lately, or just something that came up?",
    ]),
    ("defensive", &[
        "That's fair, and I didn't mean to push. You know your situation best. What would feel supportive instead?",
        "Understood, no more suggestions for now. I'd rather just listen. What's it been like for you?",
        "You're right that there's no quick fix. I'm here to hear you out, not to lecture. Tell me more?",
    ]),
    ("introduction", &[
        "Hi, it's good to meet you. I'm here to listen, whatever is on your mind. How are you doing today?",
        "Hello and welcome. This is a space to talk about anything that's weighing on you. What brings you here?",
        "Hey there, thanks for reaching out. I'm here to listen. What would you like to talk about?",
    ]),
    ("personal_sharing", &[
        "Thank you for sharing that with me. It helps me understand you better. How did that feel?",
        "I appreciate you opening up about that. What stood out to you most about it?",
        "That's meaningful to hear. How has it been shaping things for you lately?",
    ]),
    ("small_talk", &[
        "That sounds nice. What do you enjoy most about it?",
        "Ha, I like that. How did you get into it?",
        "Fun. Is that something you get to do often?",
    ]),
    ("small_talk.sports", &[
        "A {team} fan! How are you feeling about their season so far?",
        "The {team}, nice. Do you usually watch with friends or on your own?",
    ]),
    ("adaptive.opening", &[
        "I'm glad you're here. What's been on your mind lately?",
        "Take your time. Where would you like to start?",
    ]),
    ("adaptive.exploration", &[
        "That makes sense. Can you tell me more about how that's been for you?",
        "I'm following you. What part of this feels most important?",
        "Okay. How has that been affecting your day to day?",
    ]),
    ("adaptive.deepening", &[
        "We've covered a lot together. What feels different now compared to when we started?",
        "When you sit with all of this, what do you think you need most?",
        "What would a small step forward look like for you this week?",
    ]),
    ("adaptive", &[
        "I hear you. Tell me more?",
        "Go on, I'm listening.",
    ]),
    ("clause.topic", &[
        "It sounds like {topic} has been a big part of this.",
        "With {topic} in the picture, that's a lot to juggle.",
    ]),
    ("clause.location", &[
        "Being in {location} adds its own layer to this.",
    ]),
    ("clause.emotion", &[
        "Feeling {feeling} like that is completely understandable.",
        "I can hear how {feeling} you've been.",
        "That {feeling} feeling makes a lot of sense.",
    ]),
    ("follow_up", &[
        "What's been the hardest part?",
        "How long have you been feeling this way?",
        "What would help right now, even a little?",
        "Who else knows what you're going through?",
        "What usually helps when things get like this?",
        "How are you taking care of yourself through it?",
    ]),
    ("disclosure", &[
        "I remember hearing how much stretches like this can drain a person.",
        "In my own experience of these conversations, people often find that naming it helps.",
        "I've been through conversations like this before, and it often gets lighter once it's said.",
    ]),
    ("acknowledgment", &[
        "Thank you for telling me.",
        "I hear you.",
        "I'm glad you shared that.",
    ]),
    ("refocus", &[
        "Let's slow down for a second. What feels most pressing for you right now?",
        "Maybe we can come at this from a new direction. What's one thing you'd like to be different?",
        "I want to make sure I'm actually helping. What would be most useful to talk through next?",
    ]),
    ("generic", &[
        GENERIC_FALLBACK,
        "I'm here with you. What else is on your mind?",
        "Thank you for sharing. How are you feeling about all of it?",
    ]),
];

/// The built-in corpus.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCorpus;

impl BuiltinCorpus {
    pub fn pool_keys() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|(k, _)| *k)
    }
}

impl TemplateProvider for BuiltinCorpus {
    fn templates(&self, pool_key: &str) -> Vec<String> {
        BUILTIN
            .iter()
            .find(|(k, _)| *k == pool_key)
            .map(|(_, pool)| pool.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

// ---------------------------------------------------------------------------
// TOML corpus
// ---------------------------------------------------------------------------

/// Corpus loaded from TOML. Nested tables flatten to dotted keys, so
/// `[clinical] medical = [..]` and `"clinical.medical" = [..]` are equivalent.
#[derive(Debug, Clone, Default)]
pub struct TomlCorpus {
    pools: BTreeMap<String, Vec<String>>,
}

impl TomlCorpus {
    pub fn load_from_path(path: &Path) -> HearthResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let corpus = Self::parse(&content)?;
        tracing::info!(target: "hearth::generator", path = %path.display(), pools = corpus.pools.len(), "Template corpus loaded");
        Ok(corpus)
    }

    pub fn parse(content: &str) -> HearthResult<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let mut pools = BTreeMap::new();
        flatten(&table, "", &mut pools)?;
        Ok(Self { pools })
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

fn flatten(
    table: &toml::Table,
    prefix: &str,
    out: &mut BTreeMap<String, Vec<String>>,
) -> HearthResult<()> {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(inner) => flatten(inner, &full, out)?,
            toml::Value::Array(items) => {
                let pool = items
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_string).ok_or_else(|| {
                            HearthError::Corpus(format!("pool '{}' contains a non-string entry", full))
                        })
                    })
                    .collect::<HearthResult<Vec<_>>>()?;
                out.insert(full, pool);
            }
            _ => {
                return Err(HearthError::Corpus(format!(
                    "pool '{}' must be an array of strings",
                    full
                )))
            }
        }
    }
    Ok(())
}

impl TemplateProvider for TomlCorpus {
    fn templates(&self, pool_key: &str) -> Vec<String> {
        self.pools.get(pool_key).cloned().unwrap_or_default()
    }

    fn name(&self) -> &str {
        "toml"
    }
}

// ---------------------------------------------------------------------------
// Layered corpus
// ---------------------------------------------------------------------------

/// Consults providers in order; the first non-empty pool wins.
#[derive(Clone, Default)]
pub struct LayeredCorpus {
    layers: Vec<Arc<dyn TemplateProvider>>,
}

impl LayeredCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: Arc<dyn TemplateProvider>) -> Self {
        self.layers.push(layer);
        self
    }

    /// An override corpus over the built-in one.
    pub fn over_builtin(overrides: Arc<dyn TemplateProvider>) -> Self {
        Self::new()
            .with_layer(overrides)
            .with_layer(Arc::new(BuiltinCorpus))
    }
}

impl TemplateProvider for LayeredCorpus {
    fn templates(&self, pool_key: &str) -> Vec<String> {
        self.layers
            .iter()
            .map(|l| l.templates(pool_key))
            .find(|pool| !pool.is_empty())
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        "layered"
    }
}

// ---------------------------------------------------------------------------
// Placeholders
// ---------------------------------------------------------------------------

static PLACEHOLDER_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").ok());

/// Substitutes `{key}` placeholders. Returns `None` when any placeholder has no value, so callers
/// can skip templates they cannot complete.
pub fn fill_placeholders<'a, F>(template: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let Some(re) = PLACEHOLDER_RE.as_ref() else {
        return Some(template.to_string());
    };
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = lookup(key.as_str())?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Some(out)
}
