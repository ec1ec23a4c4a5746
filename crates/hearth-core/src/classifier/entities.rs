//! Entity extraction: feeling word, topic, location, sports team and pet kind.
//!
//! Lexicon lookups over lowercase tokens plus one capitalisation-sensitive location pattern.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HearthError, HearthResult};

/// Inputs longer than this are not scanned for entities.
pub const MAX_EXTRACT_CHARS: usize = 4096;

/// token → canonical feeling
const FEELINGS: &[(&str, &str)] = &[
    ("sad", "sad"),
    ("unhappy", "sad"),
    ("down", "down"),
    ("depressed", "depressed"),
    ("anxious", "anxious"),
    ("nervous", "nervous"),
    ("worried", "worried"),
    ("scared", "scared"),
    ("afraid", "scared"),
    ("terrified", "scared"),
    ("angry", "angry"),
    ("furious", "angry"),
    ("mad", "angry"),
    ("frustrated", "frustrated"),
    ("annoyed", "frustrated"),
    ("lonely", "lonely"),
    ("alone", "lonely"),
    ("isolated", "lonely"),
    ("overwhelmed", "overwhelmed"),
    ("stressed", "stressed"),
    ("exhausted", "exhausted"),
    ("tired", "tired"),
    ("drained", "exhausted"),
    ("hopeless", "hopeless"),
    ("helpless", "helpless"),
    ("hurt", "hurt"),
    ("numb", "numb"),
    ("empty", "empty"),
    ("guilty", "guilty"),
    ("ashamed", "ashamed"),
    ("embarrassed", "embarrassed"),
    ("confused", "confused"),
    ("heartbroken", "heartbroken"),
    ("happy", "happy"),
    ("excited", "excited"),
    ("grateful", "grateful"),
    ("relieved", "relieved"),
    ("proud", "proud"),
];

/// token → topic
const TOPICS: &[(&str, &str)] = &[
    ("work", "work"),
    ("job", "work"),
    ("boss", "work"),
    ("coworker", "work"),
    ("coworkers", "work"),
    ("office", "work"),
    ("school", "school"),
    ("exam", "school"),
    ("exams", "school"),
    ("class", "school"),
    ("college", "school"),
    ("university", "school"),
    ("homework", "school"),
    ("family", "family"),
    ("mom", "family"),
    ("dad", "family"),
    ("parents", "family"),
    ("mother", "family"),
    ("father", "family"),
    ("sister", "family"),
    ("brother", "family"),
    ("relationship", "relationship"),
    ("girlfriend", "relationship"),
    ("boyfriend", "relationship"),
    ("partner", "relationship"),
    ("wife", "relationship"),
    ("husband", "relationship"),
    ("breakup", "relationship"),
    ("divorce", "relationship"),
    ("money", "money"),
    ("bills", "money"),
    ("rent", "money"),
    ("debt", "money"),
    ("health", "health"),
    ("doctor", "health"),
    ("friends", "friends"),
    ("friend", "friends"),
    ("sleep", "sleep"),
    ("insomnia", "sleep"),
    ("game", "sports"),
    ("match", "sports"),
    ("season", "sports"),
];

/// alias → team display name
const TEAMS: &[(&str, &str)] = &[
    ("lakers", "Lakers"),
    ("celtics", "Celtics"),
    ("warriors", "Warriors"),
    ("yankees", "Yankees"),
    ("red sox", "Red Sox"),
    ("dodgers", "Dodgers"),
    ("cubs", "Cubs"),
    ("patriots", "Patriots"),
    ("cowboys", "Cowboys"),
    ("packers", "Packers"),
    ("eagles", "Eagles"),
    ("chiefs", "Chiefs"),
    ("arsenal", "Arsenal"),
    ("chelsea", "Chelsea"),
    ("liverpool", "Liverpool"),
    ("man united", "Manchester United"),
    ("manchester united", "Manchester United"),
    ("real madrid", "Real Madrid"),
    ("barcelona", "Barcelona"),
    ("maple leafs", "Maple Leafs"),
];

/// token → pet kind
const PETS: &[(&str, &str)] = &[
    ("dog", "dog"),
    ("dogs", "dog"),
    ("puppy", "dog"),
    ("pup", "dog"),
    ("cat", "cat"),
    ("cats", "cat"),
    ("kitten", "cat"),
    ("kitty", "cat"),
    ("bird", "bird"),
    ("parrot", "bird"),
    ("hamster", "hamster"),
    ("rabbit", "rabbit"),
    ("bunny", "rabbit"),
    ("horse", "horse"),
    ("fish", "fish"),
    ("turtle", "turtle"),
];

/// Capitalised words that follow a preposition but are not places.
const NOT_PLACES: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January",
    "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December", "The", "My", "Me", "You", "Christmas", "Easter",
];

static LOCATION_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(?:in|from|to|at)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").ok()
});

/// Entities found in one utterance. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub feeling: Option<String>,
    pub topic: Option<String>,
    pub location: Option<String>,
    pub team: Option<String>,
    pub pet: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.feeling.is_none()
            && self.topic.is_none()
            && self.location.is_none()
            && self.team.is_none()
            && self.pet.is_none()
    }

    /// Lookup by placeholder / preference key.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "feeling" => self.feeling.as_deref(),
            "topic" => self.topic.as_deref(),
            "location" => self.location.as_deref(),
            "team" => self.team.as_deref(),
            "pet" => self.pet.as_deref(),
            _ => None,
        }
    }

    /// Present entities as `(key, value)` pairs.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        ["feeling", "topic", "location", "team", "pet"]
            .into_iter()
            .filter_map(|k| self.get(k).map(|v| (k, v)))
            .collect()
    }
}

fn tokens(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .collect()
}

fn lookup(tokens: &[&str], table: &[(&str, &str)]) -> Option<String> {
    tokens
        .iter()
        .find_map(|t| table.iter().find(|(k, _)| k == t).map(|(_, v)| v.to_string()))
}

fn find_location(text: &str) -> Option<String> {
    let re = LOCATION_RE.as_ref()?;
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|place| {
            let first = place.split_whitespace().next().unwrap_or(place);
            !NOT_PLACES.contains(&first)
        })
        .map(str::to_string)
}

fn find_team(lower: &str) -> Option<String> {
    let padded = format!(" {} ", lower.replace(|c: char| !c.is_alphanumeric(), " "));
    TEAMS
        .iter()
        .find(|(alias, _)| padded.contains(&format!(" {} ", alias)))
        .map(|(_, name)| name.to_string())
}

/// Extracts entities from raw text.
pub fn extract_entities(text: &str) -> HearthResult<Entities> {
    let len = text.chars().count();
    if len > MAX_EXTRACT_CHARS {
        return Err(HearthError::EntityExtraction(format!(
            "input of {} chars exceeds the {} char limit",
            len, MAX_EXTRACT_CHARS
        )));
    }
    let lower = text.to_lowercase();
    let toks = tokens(&lower);
    let team = find_team(&lower);
    let topic = lookup(&toks, TOPICS).or_else(|| team.as_ref().map(|_| "sports".to_string()));
    Ok(Entities {
        feeling: lookup(&toks, FEELINGS),
        topic,
        location: find_location(text),
        team,
        pet: lookup(&toks, PETS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_feeling_topic_and_location() {
        let e = extract_entities("I moved to Chicago for work and I'm so lonely").unwrap();
        assert_eq!(e.feeling.as_deref(), Some("lonely"));
        assert_eq!(e.topic.as_deref(), Some("work"));
        assert_eq!(e.location.as_deref(), Some("Chicago"));
        assert!(e.team.is_none());
    }

    #[test]
    fn weekdays_are_not_locations() {
        let e = extract_entities("See you on Friday, I'll be at Home Depot").unwrap();
        assert_eq!(e.location.as_deref(), Some("Home Depot"));
        let e = extract_entities("talk to Monday me").unwrap();
        assert!(e.location.is_none());
    }

    #[test]
    fn teams_imply_sports_topic() {
        let e = extract_entities("did you see the Red Sox last night?").unwrap();
        assert_eq!(e.team.as_deref(), Some("Red Sox"));
        assert_eq!(e.topic.as_deref(), Some("sports"));
    }

    #[test]
    fn pets_are_canonicalised() {
        let e = extract_entities("my puppy has been sick").unwrap();
        assert_eq!(e.pet.as_deref(), Some("dog"));
        assert_eq!(e.pairs(), vec![("pet", "dog")]);
    }

    #[test]
    fn oversized_input_is_an_error() {
        let long = "a ".repeat(MAX_EXTRACT_CHARS);
        assert!(matches!(
            extract_entities(&long),
            Err(HearthError::EntityExtraction(_))
        ));
    }
}
