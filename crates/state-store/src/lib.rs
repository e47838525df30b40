//! Single-owner agent state with typed change notifications.
//!
//! No component mutates agent state directly: everything goes through the
//! [`StateStore`] update operations, which snapshot history and publish
//! events synchronously on the mutating thread.

pub mod events;
pub mod model;
pub mod store;

pub use events::{StateEvent, StateEventKind, TaskUpdateKind};
pub use model::{
    ActionKind, ActionOption, ActionPlan, ActionTotals, AgentMetrics, AgentPhase, AgentState,
    AuditKind, Capabilities, ErrorRecord, ExecutionContext, FailureReason, FixSolution,
    HighLevelTask, KnowledgeBase, Pattern, PerceptionDigest, PlanningContext, StrategyApproach,
    SubTask, SubTaskKind, SuccessCriteria, TestStrategy,
};
pub use store::{DurableState, StateStore};
