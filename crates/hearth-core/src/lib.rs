//! # Hearth Core - Support-Conversation Orchestration
//!
//! Turn-based pipeline that decides what a supportive agent says next and how long to wait
//! before saying it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Pipeline                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │   Concern    │→ │   Priority   │→ │  Response Generator  │ │
//! │  │  Classifier  │  │    Router    │  │  (template corpus)   │ │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘ │
//! │         ↓                                      ↓               │
//! │  ┌──────────────┐                    ┌──────────────────────┐ │
//! │  │ Special Case │                    │  Compliance Filter   │ │
//! │  │  + Signals   │                    │  → Timing Estimator  │ │
//! │  └──────────────┘                    └──────────────────────┘ │
//! │              ConversationState + MemoryStore                   │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod alerts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod pacing;
pub mod session;
pub mod shared;
pub mod templates;

pub use alerts::{AlertChannel, ConcernAlert, ConcernAlertSink, NoopAlertSink};
pub use classifier::{
    Classification, ConcernClassifier, ConcernDetector, DetectorRegistry, Entities, PatternSets,
    RuleSpec, RuleTable, SpecialCases, TurnSignals,
};
pub use config::HearthConfig;
pub use error::{HearthError, HearthResult};
pub use memory::MemoryStore;
pub use orchestrator::{
    ComplianceFilter, Handler, HandlerResult, Pipeline, PriorityRouter, ReplyPlan,
    ResponseGenerator, Session, TimingEstimator, TurnContext, TurnReport,
};
pub use pacing::TypingPacer;
pub use session::SessionRegistry;
pub use shared::{
    Concern, ConcernTag, ConversationState, HandlerId, Reply, ReplyCandidate, Severity, Stage,
    Utterance,
};
pub use templates::{
    BuiltinCorpus, LayeredCorpus, TemplateProvider, TomlCorpus, GENERIC_FALLBACK,
    REFOCUS_FALLBACK, SAFETY_FALLBACK,
};
