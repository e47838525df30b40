//! Planning engine: pure decision logic for the focusguard agent.
//!
//! Decomposes operator goals into dependency-ordered sub-tasks, scores
//! candidate actions against perception snapshots, adapts the test strategy
//! from failure history, and folds action outcomes back into the knowledge
//! base. Nothing here touches the page; all inputs are read-only snapshots.

pub mod decision;
pub mod decompose;
pub mod errors;
pub mod learning;
pub mod strategy;

pub use decision::{make_decision, score_option, DecisionInput, MIN_VIABLE_SCORE};
pub use decompose::{decompose_task, resolve_order};
pub use errors::PlanError;
pub use learning::learn_from_experience;
pub use strategy::{adjust_strategy, PageComplexity};

use focusguard_state_store::{
    ActionKind, ActionPlan, FailureReason, HighLevelTask, KnowledgeBase, SubTask, TestStrategy,
};

/// Stateless planning component injected into the coordinator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanningEngine;

impl PlanningEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decompose_task(&self, task: &HighLevelTask) -> Result<Vec<SubTask>, PlanError> {
        decompose::decompose_task(task)
    }

    pub fn make_decision(&self, input: DecisionInput<'_>) -> Result<ActionPlan, PlanError> {
        decision::make_decision(input)
    }

    pub fn adjust_strategy(
        &self,
        current: &TestStrategy,
        recent_failures: &[FailureReason],
        complexity: PageComplexity,
    ) -> TestStrategy {
        strategy::adjust_strategy(current, recent_failures, complexity)
    }

    pub fn learn_from_experience(
        &self,
        knowledge: &mut KnowledgeBase,
        strategy: &mut TestStrategy,
        kind: ActionKind,
        url: &str,
        success: bool,
    ) {
        learning::learn_from_experience(knowledge, strategy, kind, url, success)
    }
}
