//! Concern alert side-channel.
//!
//! The core only decides *when* a concern is surfaced (once per tag per session); hosts decide how
//! to render it (hotline links, scheduling links, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{HearthError, HearthResult};
use crate::shared::{Concern, ConcernTag};

/// A concern surfaced for the first time in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcernAlert {
    pub tag: ConcernTag,
    /// Label including severity, e.g. `substance-use-severe`.
    pub label: String,
    pub session_id: String,
    pub at: DateTime<Utc>,
}

impl ConcernAlert {
    pub fn new(concern: &Concern, session_id: impl Into<String>) -> Self {
        Self {
            tag: concern.tag,
            label: concern.label(),
            session_id: session_id.into(),
            at: Utc::now(),
        }
    }
}

/// Receiver of concern alerts. Called synchronously from the turn that surfaced the concern.
pub trait ConcernAlertSink: Send + Sync {
    fn on_concern_alert(&self, alert: ConcernAlert) -> HearthResult<()>;
}

/// Drops every alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertSink;

impl ConcernAlertSink for NoopAlertSink {
    fn on_concern_alert(&self, _alert: ConcernAlert) -> HearthResult<()> {
        Ok(())
    }
}

/// Forwards alerts over an unbounded tokio channel; sending never blocks the turn.
#[derive(Debug, Clone)]
pub struct AlertChannel {
    tx: mpsc::UnboundedSender<ConcernAlert>,
}

impl AlertChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConcernAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConcernAlertSink for AlertChannel {
    fn on_concern_alert(&self, alert: ConcernAlert) -> HearthResult<()> {
        tracing::info!(target: "hearth::alerts", concern = %alert.label, session = %alert.session_id, "Concern alert");
        self.tx
            .send(alert)
            .map_err(|e| HearthError::ChannelSend(e.to_string()))
    }
}
