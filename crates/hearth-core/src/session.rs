//! Concurrent session registry for hosts that serve many conversations.
//!
//! Each session sits behind its own lock, so turns of one conversation run in order while
//! different conversations proceed independently.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

use crate::error::{HearthError, HearthResult};
use crate::orchestrator::{Pipeline, Session, TurnReport};
use crate::shared::Reply;

pub struct SessionRegistry {
    pipeline: Arc<Pipeline>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionRegistry {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            sessions: DashMap::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    fn session(&self, id: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(target: "hearth::session", session = id, "Session opened");
                Arc::new(Mutex::new(self.pipeline.session_with_id(id)))
            })
            .clone()
    }

    /// Runs one turn for session `id`, opening the session on first use.
    pub fn process_turn(&self, id: &str, text: &str) -> HearthResult<TurnReport> {
        let session = self.session(id);
        let mut guard = session
            .lock()
            .map_err(|_| HearthError::SessionPoisoned(id.to_string()))?;
        Ok(self.pipeline.process_turn(text, &mut guard))
    }

    pub fn process(&self, id: &str, text: &str) -> HearthResult<Reply> {
        self.process_turn(id, text).map(|report| report.reply)
    }

    /// Discards a session. Returns whether it existed.
    pub fn end(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::info!(target: "hearth::session", session = id, "Session closed");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
