//! Fix verification for the focusguard agent.
//!
//! After a fix is injected, the reflection engine collects technical, visual,
//! and behavioral evidence through the page channel, classifies the outcome,
//! and decides whether to accept, retry, roll back, or escalate. Every
//! episode is recorded in per-selector history and a bounded learning
//! database for later pattern mining.

pub mod engine;
pub mod evidence;
pub mod model;

pub use engine::{goal_achieved, ReflectionEngine};
pub use evidence::{next_action, FixEvidence};
pub use model::{
    ActionOutput, ExecutedAction, FactorWeights, FixVerificationResult, LearningRecord,
    NextAction, ReflectionConfig, VerificationContext, VerificationStatus,
};
