//! Agent state data model.
//!
//! The `AgentState` snapshot is owned exclusively by the [`StateStore`];
//! every other component receives read-only clones and submits deltas
//! through the store's update operations.
//!
//! [`StateStore`]: crate::StateStore

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use focusguard_core_types::{AxError, SessionId, TaskId, WcagLevel};

/// Exactly one phase is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Idle,
    Perceiving,
    Reasoning,
    Acting,
    Reflecting,
    Error,
}

impl Default for AgentPhase {
    fn default() -> Self {
        AgentPhase::Idle
    }
}

/// Operator-issued goal. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighLevelTask {
    pub id: TaskId,
    pub audit: AuditKind,
    pub wcag_level: WcagLevel,
    /// URLs in scope; empty means the current page only.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Selector scope restriction; empty means all focusable elements.
    #[serde(default)]
    pub include_selectors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elements: Option<usize>,
}

impl HighLevelTask {
    pub fn new(audit: AuditKind) -> Self {
        Self {
            id: TaskId::new(),
            audit,
            wcag_level: WcagLevel::default(),
            urls: Vec::new(),
            include_selectors: Vec::new(),
            time_limit_ms: None,
            max_elements: None,
        }
    }

    pub fn time_limit_ms(mut self, limit: u64) -> Self {
        self.time_limit_ms = Some(limit);
        self
    }

    pub fn max_elements(mut self, max: usize) -> Self {
        self.max_elements = Some(max);
        self
    }
}

/// Audit flavor requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Discovery, navigation testing and per-element verification.
    FullSiteAudit,
    /// Focus-trap passes only.
    FocusTrapScan,
    /// Verify focus visibility on scoped elements.
    FocusVisibilityCheck,
    /// Apply and verify fixes for known issues.
    FixAndVerify,
}

/// Decomposition unit; produced by planning, retired by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: TaskId,
    pub parent_id: TaskId,
    pub kind: SubTaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    pub expected_outcome: String,
    /// Ids that must be in `completed_tasks` before this one may run.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub estimated_time_ms: u64,
    pub retryable: bool,
}

/// Sub-task categories, ordered here from least to most important for
/// budget re-prioritization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskKind {
    Discovery,
    ElementAnalysis,
    NavigationTest,
    /// Run the focus-trap detection passes over the page.
    TrapScan,
    InteractionTest,
    Verification,
}

impl SubTaskKind {
    /// Weight used when a time budget forces greedy selection.
    pub fn priority_weight(&self) -> u32 {
        match self {
            SubTaskKind::Verification => 5,
            SubTaskKind::InteractionTest | SubTaskKind::TrapScan => 4,
            SubTaskKind::NavigationTest => 3,
            SubTaskKind::ElementAnalysis => 2,
            SubTaskKind::Discovery => 1,
        }
    }
}

/// Candidate action scored by the planning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOption {
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    /// Probability declared by whoever proposed the option, 0..=1.
    pub success_probability: f64,
    pub description: String,
}

impl ActionOption {
    pub fn new(kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            target_selector: None,
            success_probability: 0.5,
            description: description.into(),
        }
    }

    pub fn target(mut self, selector: impl Into<String>) -> Self {
        self.target_selector = Some(selector.into());
        self
    }

    pub fn probability(mut self, p: f64) -> Self {
        self.success_probability = p.clamp(0.0, 1.0);
        self
    }
}

/// Closed action vocabulary; dispatch is enum-resolved, never string-tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Focus,
    /// Run the focus-trap detection passes.
    Scan,
    Verify,
    Analyze,
    Navigate,
    Wait,
}

impl ActionKind {
    /// Scoring bonus added on top of the 0.5 base score.
    pub fn base_bonus(&self) -> f64 {
        match self {
            ActionKind::Scan => 0.35,
            ActionKind::Focus => 0.3,
            ActionKind::Verify => 0.25,
            ActionKind::Analyze => 0.2,
            ActionKind::Navigate => 0.1,
            ActionKind::Wait => 0.0,
        }
    }
}

/// Declarative predicate fields checked against an action's side effects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessCriteria {
    /// Focus must land on a different selector than before the action.
    #[serde(default)]
    pub requires_focus_change: bool,
    /// This selector must be present in the next perception snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_selector: Option<String>,
    /// The action must finish under this duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
}

/// Context captured when a plan was produced; transient within one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningContext {
    pub url: String,
    #[serde(default)]
    pub available_selectors: Vec<String>,
    #[serde(default)]
    pub recent_actions: Vec<ActionKind>,
    pub known_issue_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<u64>,
}

/// One primary action plus ranked fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub primary: ActionOption,
    #[serde(default)]
    pub fallbacks: Vec<ActionOption>,
    pub success_criteria: SuccessCriteria,
    pub timeout_ms: u64,
    pub context: PlanningContext,
}

/// Mutable testing strategy the planner adapts from failure history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStrategy {
    pub approach: StrategyApproach,
    /// 1 = spot checks, 3 = exhaustive evidence collection.
    pub verification_depth: u8,
    pub max_retries: u32,
    pub exponential_backoff: bool,
    /// Element budget once the scope has been narrowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_budget: Option<usize>,
}

impl Default for TestStrategy {
    fn default() -> Self {
        Self {
            approach: StrategyApproach::Comprehensive,
            verification_depth: 2,
            max_retries: 3,
            exponential_backoff: false,
            element_budget: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyApproach {
    Comprehensive,
    PriorityBased,
    Adaptive,
    Conservative,
}

/// Learned navigation/fix pattern. Confidence is nudged on each outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub description: String,
    pub confidence: f64,
    pub observations: u32,
}

/// Fix approach with an accumulated success rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSolution {
    pub id: String,
    pub issue: String,
    pub fix: String,
    pub success_rate: f64,
    pub applications: u32,
}

/// Recorded reason an action failed, mined for strategy adaptation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: String,
    pub url: String,
    pub message: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Knowledge accumulated across cycles and runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub fix_solutions: Vec<FixSolution>,
    #[serde(default)]
    pub failure_reasons: Vec<FailureReason>,
    /// Per-site rules keyed by host.
    #[serde(default)]
    pub site_rules: HashMap<String, String>,
    /// Historical success score per (action kind, url), 0..=1.
    #[serde(default)]
    pub action_scores: HashMap<String, f64>,
    /// Aggregate outcome counters per action kind.
    #[serde(default)]
    pub action_totals: HashMap<String, ActionTotals>,
}

impl KnowledgeBase {
    pub fn score_key(kind: ActionKind, url: &str) -> String {
        format!("{:?}:{}", kind, url).to_lowercase()
    }

    pub fn action_score(&self, kind: ActionKind, url: &str) -> f64 {
        self.action_scores
            .get(&Self::score_key(kind, url))
            .copied()
            .unwrap_or(0.5)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionTotals {
    pub successes: u64,
    pub failures: u64,
}

impl ActionTotals {
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}

/// Static agent capabilities; fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub screenshots: bool,
    pub style_injection: bool,
    pub max_elements: usize,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            screenshots: true,
            style_injection: true,
            max_elements: 500,
        }
    }
}

/// Compact record of the latest perception, kept on the execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionDigest {
    pub url: String,
    pub focusable_count: usize,
    /// Dynamic content changes observed in the snapshot; feeds the page
    /// complexity estimate during strategy adaptation.
    #[serde(default)]
    pub dynamic_delta_count: usize,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Live counters and references for the current run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    pub current_url: String,
    pub total_actions: u64,
    pub successful_actions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_task: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_subtask: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_perception: Option<PerceptionDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_plan: Option<ActionPlan>,
}

/// Cycle timing metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub cycle_count: u64,
    pub average_cycle_ms: f64,
    pub last_cycle_ms: u64,
}

impl AgentMetrics {
    /// Fold one finished cycle into the running average.
    pub fn record_cycle(&mut self, cycle_ms: u64) {
        let total = self.average_cycle_ms * self.cycle_count as f64 + cycle_ms as f64;
        self.cycle_count += 1;
        self.average_cycle_ms = total / self.cycle_count as f64;
        self.last_cycle_ms = cycle_ms;
    }
}

/// Append-only error log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: AxError,
    pub phase: AgentPhase,
    pub recoverable: bool,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl ErrorRecord {
    pub fn new(error: AxError, phase: AgentPhase) -> Self {
        let recoverable = error.is_recoverable();
        Self {
            error,
            phase,
            recoverable,
            recorded_at: chrono::Utc::now(),
        }
    }
}

/// The single mutable snapshot of agent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub phase: AgentPhase,
    pub context: ExecutionContext,
    pub capabilities: Capabilities,
    pub strategy: TestStrategy,
    pub knowledge: KnowledgeBase,
    pub task_queue: Vec<SubTask>,
    pub completed_tasks: Vec<TaskId>,
    pub errors: Vec<ErrorRecord>,
    pub metrics: AgentMetrics,
}

impl AgentState {
    pub fn initial(capabilities: Capabilities) -> Self {
        Self {
            phase: AgentPhase::Idle,
            context: ExecutionContext {
                session: Some(SessionId::new()),
                ..Default::default()
            },
            capabilities,
            strategy: TestStrategy::default(),
            knowledge: KnowledgeBase::default(),
            task_queue: Vec::new(),
            completed_tasks: Vec::new(),
            errors: Vec::new(),
            metrics: AgentMetrics::default(),
        }
    }

    /// Next sub-task whose dependencies are all completed.
    pub fn next_ready_task(&self) -> Option<&SubTask> {
        self.task_queue.iter().find(|task| {
            task.dependencies
                .iter()
                .all(|dep| self.completed_tasks.contains(dep))
        })
    }
}
