//! Per-session memory: recent replies, recent utterances and persistent feelings/topics.
//!
//! The utterance buffer is the context the classifiers look back on (severity window, feedback-loop
//! lookback).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::classifier::Entities;
use crate::shared::DEFAULT_HISTORY_CAPACITY;

/// Emitted replies kept for the repetition check.
pub const DEFAULT_REPLY_CAPACITY: usize = 5;

fn push_bounded(buf: &mut VecDeque<String>, capacity: usize, value: &str) {
    if buf.len() == capacity {
        buf.pop_front();
    }
    buf.push_back(value.to_string());
}

fn dominant(counts: &BTreeMap<String, u32>) -> Option<&str> {
    counts
        .iter()
        .fold(None, |best: Option<(&String, u32)>, (k, &n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((k, n)),
        })
        .map(|(k, _)| k.as_str())
}

/// Bounded memory consulted across pipeline stages. Sessions never share one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    recent_replies: VecDeque<String>,
    reply_capacity: usize,
    recent_utterances: VecDeque<String>,
    utterance_capacity: usize,
    feelings: BTreeMap<String, u32>,
    topics: BTreeMap<String, u32>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacities(DEFAULT_REPLY_CAPACITY, DEFAULT_HISTORY_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacities(replies: usize, utterances: usize) -> Self {
        let reply_capacity = replies.max(1);
        let utterance_capacity = utterances.max(1);
        Self {
            recent_replies: VecDeque::with_capacity(reply_capacity),
            reply_capacity,
            recent_utterances: VecDeque::with_capacity(utterance_capacity),
            utterance_capacity,
            feelings: BTreeMap::new(),
            topics: BTreeMap::new(),
        }
    }

    /// Remembers the utterance of the turn being processed.
    pub fn record_utterance(&mut self, text: &str) {
        push_bounded(&mut self.recent_utterances, self.utterance_capacity, text);
    }

    pub fn record_reply(&mut self, text: &str) {
        push_bounded(&mut self.recent_replies, self.reply_capacity, text);
    }

    /// Bumps the persistent feeling/topic counters.
    pub fn record_entities(&mut self, entities: &Entities) {
        if let Some(f) = &entities.feeling {
            *self.feelings.entry(f.clone()).or_insert(0) += 1;
        }
        if let Some(t) = &entities.topic {
            *self.topics.entry(t.clone()).or_insert(0) += 1;
        }
    }

    /// Emitted replies, most recent first.
    pub fn recent_replies(&self) -> impl Iterator<Item = &str> {
        self.recent_replies.iter().rev().map(String::as_str)
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.recent_replies.back().map(String::as_str)
    }

    /// Up to `n` utterances before the latest one, most recent first.
    pub fn previous_utterances(&self, n: usize) -> Vec<&str> {
        self.recent_utterances
            .iter()
            .rev()
            .skip(1)
            .take(n)
            .map(String::as_str)
            .collect()
    }

    pub fn reply_count(&self) -> usize {
        self.recent_replies.len()
    }

    /// Most frequent feeling; ties go to the alphabetically first.
    pub fn dominant_feeling(&self) -> Option<&str> {
        dominant(&self.feelings)
    }

    pub fn dominant_topic(&self) -> Option<&str> {
        dominant(&self.topics)
    }

    pub fn feeling_count(&self, feeling: &str) -> u32 {
        self.feelings.get(feeling).copied().unwrap_or(0)
    }

    pub fn topic_count(&self, topic: &str) -> u32 {
        self.topics.get(topic).copied().unwrap_or(0)
    }
}
