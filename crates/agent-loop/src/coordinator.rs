//! The PRAR coordinator: perceive, reason, act, reflect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use focusguard_core_types::{AxError, SessionId, TaskId};
use focusguard_page_channel::{Clock, PerceptionSampler, PerceptionSnapshot};
use focusguard_planner::{DecisionInput, PageComplexity, PlanningEngine};
use focusguard_reflection::{goal_achieved, ActionOutput};
use focusguard_state_store::{
    ActionKind, ActionOption, AgentPhase, ErrorRecord, FailureReason, HighLevelTask, Pattern,
    StateStore, SubTask, SubTaskKind,
};

use crate::config::LoopConfig;
use crate::executor::ActionExecutor;

/// How many executed action kinds are kept for decision context.
const RECENT_ACTIONS: usize = 10;

/// How many trailing failure reasons feed one strategy adjustment.
const RECENT_FAILURES: usize = 10;

/// Hard cap on stored failure reasons.
const FAILURE_MEMORY: usize = 100;

/// One finished cycle, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u32,
    pub task_id: TaskId,
    pub action: ActionKind,
    pub goal_achieved: bool,
    pub fallback_used: bool,
    pub duration_ms: u64,
}

/// Structured outcome of one `start_loop` run; never a raw crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub success: bool,
    pub final_phase: AgentPhase,
    pub cycles: u32,
    pub elapsed_ms: u64,
    pub errors: Vec<ErrorRecord>,
}

/// Cooperative cancellation handle for a running loop.
#[derive(Clone)]
pub struct LoopHandle {
    running: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Request termination; honored at the top of the next cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Drives fixed-size PRAR cycles over the injected collaborators.
///
/// Cycles run strictly sequentially; a cycle error is recorded and counted
/// against the consecutive-error threshold instead of crashing the loop.
pub struct PrarCoordinator {
    store: Arc<StateStore>,
    planner: PlanningEngine,
    sampler: Arc<dyn PerceptionSampler>,
    executor: Arc<dyn ActionExecutor>,
    clock: Arc<dyn Clock>,
    config: LoopConfig,
    running: Arc<AtomicBool>,
    recent_actions: Mutex<VecDeque<ActionKind>>,
    history: Mutex<Vec<CycleRecord>>,
}

impl PrarCoordinator {
    pub fn new(
        store: Arc<StateStore>,
        sampler: Arc<dyn PerceptionSampler>,
        executor: Arc<dyn ActionExecutor>,
        clock: Arc<dyn Clock>,
        config: LoopConfig,
    ) -> Self {
        Self {
            store,
            planner: PlanningEngine::new(),
            sampler,
            executor,
            clock,
            config,
            running: Arc::new(AtomicBool::new(false)),
            recent_actions: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            running: self.running.clone(),
        }
    }

    pub fn stop_loop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Finished cycles of the latest run, oldest first.
    pub fn cycle_history(&self) -> Vec<CycleRecord> {
        self.history.lock().clone()
    }

    /// Decompose the task, queue its sub-tasks, and run cycles until the
    /// queue drains or a limit trips.
    pub async fn start_loop(&self, session: &SessionId, task: &HighLevelTask) -> LoopResult {
        self.history.lock().clear();
        self.store.set_active_task(Some(task.id.clone()));
        self.store.set_phase(AgentPhase::Perceiving);

        let subtasks = match self.planner.decompose_task(task) {
            Ok(subtasks) => subtasks,
            Err(err) => {
                let err: AxError = err.into();
                self.store.add_error(err, AgentPhase::Perceiving);
                self.store.set_phase(AgentPhase::Error);
                return self.finish(false, AgentPhase::Error, 0, 0);
            }
        };
        info!(task = %task.id, subtasks = subtasks.len(), "loop started");
        for subtask in subtasks {
            self.store.add_task(subtask);
        }

        self.running.store(true, Ordering::SeqCst);
        let started_ms = self.clock.now_ms();
        let mut cycles = 0u32;
        let mut consecutive_errors = 0u32;

        while self.running.load(Ordering::SeqCst)
            && cycles < self.config.max_cycles
            && consecutive_errors < self.config.error_threshold
            && !self.store.state().task_queue.is_empty()
            && self.clock.now_ms().saturating_sub(started_ms) < self.config.max_loop_time_ms
        {
            let elapsed = self.clock.now_ms().saturating_sub(started_ms);
            let remaining = self.config.max_loop_time_ms.saturating_sub(elapsed);
            let cycle_started = self.clock.now_ms();
            let outcome = self.run_cycle(session, cycles, remaining).await;
            let cycle_ms = self.clock.now_ms().saturating_sub(cycle_started);
            self.store.update_metrics(cycle_ms);
            cycles += 1;

            let failed = match outcome {
                Ok(record) => {
                    consecutive_errors = 0;
                    let achieved = record.goal_achieved;
                    self.history.lock().push(record);
                    !achieved
                }
                Err(err) => {
                    warn!(cycle = cycles, %err, "cycle failed");
                    consecutive_errors += 1;
                    let phase = self.store.phase();
                    let failure = FailureReason {
                        kind: err.kind().to_string(),
                        url: self.store.state().context.current_url.clone(),
                        message: err.to_string(),
                        recorded_at: chrono::Utc::now(),
                    };
                    self.store.update_knowledge(|knowledge| {
                        knowledge.failure_reasons.push(failure);
                        if knowledge.failure_reasons.len() > FAILURE_MEMORY {
                            knowledge.failure_reasons.remove(0);
                        }
                    });
                    self.store.add_error(err, phase);
                    self.adapt_after_failure();
                    true
                }
            };

            self.pace(failed, cycle_ms).await;
        }

        self.running.store(false, Ordering::SeqCst);
        let state = self.store.state();
        let success =
            state.task_queue.is_empty() && consecutive_errors < self.config.error_threshold;
        let final_phase = if consecutive_errors >= self.config.error_threshold {
            AgentPhase::Error
        } else {
            AgentPhase::Idle
        };
        self.store.set_phase(final_phase);
        self.store.set_active_task(None);
        let elapsed_ms = self.clock.now_ms().saturating_sub(started_ms);
        info!(success, cycles, elapsed_ms, "loop finished");
        self.finish(success, final_phase, cycles, elapsed_ms)
    }

    fn finish(
        &self,
        success: bool,
        final_phase: AgentPhase,
        cycles: u32,
        elapsed_ms: u64,
    ) -> LoopResult {
        LoopResult {
            success,
            final_phase,
            cycles,
            elapsed_ms,
            errors: self.store.state().errors,
        }
    }

    async fn run_cycle(
        &self,
        session: &SessionId,
        cycle: u32,
        time_remaining_ms: u64,
    ) -> Result<CycleRecord, AxError> {
        // Perceive.
        self.store.set_phase(AgentPhase::Perceiving);
        let stable = self
            .sampler
            .wait_for_stability(
                session,
                Duration::from_millis(self.config.stability_timeout_ms),
            )
            .await
            .unwrap_or(false);
        if !stable {
            debug!("page did not settle before perception");
        }
        let snapshot = self.sampler.perceive(session).await?;
        self.store.update_perception(&snapshot);

        let state = self.store.state();
        let task = match state.next_ready_task() {
            Some(task) => task.clone(),
            // Dependencies are resolved at decomposition time; a queue with
            // no ready task can only come from an imported stale dependency.
            None => match state.task_queue.first() {
                Some(task) => {
                    warn!(task = %task.id, "no ready sub-task, force-advancing the oldest");
                    task.clone()
                }
                None => return Err(AxError::internal("cycle started with an empty task queue")),
            },
        };
        self.store.set_active_subtask(Some(task.id.clone()));

        // Reason.
        self.store.set_phase(AgentPhase::Reasoning);
        let options = options_for(&task, &snapshot);
        let recent: Vec<ActionKind> = self.recent_actions.lock().iter().copied().collect();
        let plan = self.planner.make_decision(DecisionInput {
            options: &options,
            snapshot: &snapshot,
            knowledge: &state.knowledge,
            recent_actions: &recent,
            known_issue_count: state.errors.len(),
            time_remaining_ms: Some(time_remaining_ms),
        })?;
        self.store.update_action_plan(plan.clone());

        // Act: primary first, then ranked fallbacks.
        self.store.set_phase(AgentPhase::Acting);
        let mut last_err: Option<AxError> = None;
        let mut executed = None;
        let mut action = plan.primary.kind;
        let mut fallback_used = false;
        for (index, option) in std::iter::once(&plan.primary)
            .chain(plan.fallbacks.iter())
            .enumerate()
        {
            match self.executor.execute(session, option, &task, &snapshot).await {
                Ok(result) => {
                    executed = Some(result);
                    action = option.kind;
                    fallback_used = index > 0;
                    break;
                }
                Err(err) => {
                    debug!(kind = ?option.kind, %err, "action attempt failed");
                    last_err = Some(err);
                }
            }
        }
        let executed = match executed {
            Some(executed) => executed,
            None => {
                return Err(
                    last_err.unwrap_or_else(|| AxError::internal("plan carried no actions"))
                )
            }
        };
        {
            let mut recent = self.recent_actions.lock();
            recent.push_back(action);
            if recent.len() > RECENT_ACTIONS {
                recent.pop_front();
            }
        }
        if let ActionOutput::Scanned {
            traps_found,
            overall_score,
        } = executed.output
        {
            if traps_found > 0 {
                warn!(traps_found, overall_score, url = %snapshot.url, "scan surfaced focus traps");
                self.store.add_pattern(Pattern {
                    id: format!("traps:{}", snapshot.url),
                    description: format!("{traps_found} focus traps detected on {}", snapshot.url),
                    confidence: f64::from(100 - overall_score.min(100)) / 100.0,
                    observations: 1,
                });
            }
        }

        // Reflect.
        self.store.set_phase(AgentPhase::Reflecting);
        let post = self.sampler.perceive(session).await.ok();
        let achieved = goal_achieved(&plan.success_criteria, &executed, post.as_ref());
        self.store.record_action(achieved);

        let planner = self.planner;
        let mut strategy = state.strategy.clone();
        let url = snapshot.url.clone();
        self.store.update_knowledge(|knowledge| {
            planner.learn_from_experience(knowledge, &mut strategy, action, &url, achieved);
        });
        self.store.update_strategy(strategy);

        if achieved {
            self.store.complete_task(&task.id);
        } else if !task.retryable {
            // Retire it; leaving it queued would spin until a limit trips.
            self.store.add_error(
                AxError::verification(format!("sub-task {} goal not achieved", task.id)),
                AgentPhase::Reflecting,
            );
            self.store.complete_task(&task.id);
        }

        Ok(CycleRecord {
            cycle,
            task_id: task.id,
            action,
            goal_achieved: achieved,
            fallback_used,
            duration_ms: executed.duration_ms,
        })
    }

    /// Re-evaluate the testing strategy against the trailing failure
    /// reasons and the complexity of the last perceived page.
    fn adapt_after_failure(&self) {
        let state = self.store.state();
        let failures = &state.knowledge.failure_reasons;
        let recent = &failures[failures.len().saturating_sub(RECENT_FAILURES)..];
        let (elements, deltas) = state
            .context
            .last_perception
            .as_ref()
            .map(|digest| (digest.focusable_count, digest.dynamic_delta_count))
            .unwrap_or((0, 0));
        let complexity = PageComplexity::from_counts(elements, deltas, state.errors.len());
        let adjusted = self.planner.adjust_strategy(&state.strategy, recent, complexity);
        self.store.update_strategy(adjusted);
    }

    /// Adaptive inter-cycle pacing: double after a failure, half again after
    /// a slow cycle; short delays are skipped.
    async fn pace(&self, failed: bool, cycle_ms: u64) {
        let mut delay = self.config.base_delay_ms;
        if failed {
            delay *= 2;
        }
        if cycle_ms > self.config.slow_cycle_ms {
            delay = delay * 3 / 2;
        }
        if delay >= self.config.min_delay_ms {
            self.clock.sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// Candidate actions for one sub-task kind, scored later by the planner.
fn options_for(task: &SubTask, snapshot: &PerceptionSnapshot) -> Vec<ActionOption> {
    let first = snapshot
        .focusable_elements
        .first()
        .map(|el| el.selector.clone());
    let target = task.target_selector.clone().or(first);

    let mut options = Vec::new();
    match task.kind {
        SubTaskKind::Discovery => {
            if let Some(selector) = &target {
                options.push(
                    ActionOption::new(ActionKind::Analyze, "inspect a focusable element")
                        .target(selector.clone())
                        .probability(0.7),
                );
            }
            options.push(
                ActionOption::new(ActionKind::Navigate, "record current location")
                    .probability(0.6),
            );
        }
        SubTaskKind::ElementAnalysis => {
            if let Some(selector) = &target {
                options.push(
                    ActionOption::new(ActionKind::Analyze, "analyze target element")
                        .target(selector.clone())
                        .probability(0.7),
                );
                options.push(
                    ActionOption::new(ActionKind::Focus, "focus target element")
                        .target(selector.clone())
                        .probability(0.6),
                );
            }
        }
        SubTaskKind::NavigationTest => {
            if let Some(selector) = &target {
                options.push(
                    ActionOption::new(ActionKind::Focus, "move focus via keyboard")
                        .target(selector.clone())
                        .probability(0.7),
                );
            }
            options.push(
                ActionOption::new(ActionKind::Navigate, "confirm page location")
                    .probability(0.5),
            );
        }
        SubTaskKind::TrapScan => {
            options.push(
                ActionOption::new(ActionKind::Scan, "run the focus trap passes")
                    .probability(0.8),
            );
        }
        SubTaskKind::InteractionTest => {
            if let Some(selector) = &target {
                options.push(
                    ActionOption::new(ActionKind::Focus, "focus interactive element")
                        .target(selector.clone())
                        .probability(0.7),
                );
                options.push(
                    ActionOption::new(ActionKind::Verify, "verify interaction result")
                        .target(selector.clone())
                        .probability(0.6),
                );
            }
        }
        SubTaskKind::Verification => {
            if let Some(selector) = &target {
                options.push(
                    ActionOption::new(ActionKind::Verify, "verify element state")
                        .target(selector.clone())
                        .probability(0.75),
                );
                options.push(
                    ActionOption::new(ActionKind::Analyze, "re-analyze element")
                        .target(selector.clone())
                        .probability(0.6),
                );
            }
        }
    }
    options.push(ActionOption::new(ActionKind::Wait, "let the page settle").probability(0.4));
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use focusguard_page_channel::mock::{ManualClock, MockPage, MockSampler};
    use focusguard_page_channel::{BoundingRect, FocusableElement, NodeInfo, StyleSnapshot};
    use focusguard_reflection::ExecutedAction;
    use focusguard_state_store::{AuditKind, Capabilities, TestStrategy};
    use focusguard_trap_detector::DetectorConfig;

    use crate::executor::ChannelExecutor;

    fn snapshot_with(selectors: &[&str]) -> PerceptionSnapshot {
        PerceptionSnapshot {
            url: "https://example.test".into(),
            focusable_elements: selectors
                .iter()
                .map(|s| FocusableElement {
                    selector: s.to_string(),
                    tag_name: "button".into(),
                    tab_index: 0,
                    visible: true,
                    in_viewport: true,
                    rect: BoundingRect::default(),
                    unfocused_style: StyleSnapshot::default(),
                    focused_style: None,
                    sibling_indicator: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Executor double that always succeeds with a focus change.
    struct AlwaysOk;

    #[async_trait]
    impl ActionExecutor for AlwaysOk {
        async fn execute(
            &self,
            _session: &SessionId,
            option: &ActionOption,
            _task: &SubTask,
            _snapshot: &PerceptionSnapshot,
        ) -> Result<ExecutedAction, AxError> {
            Ok(ExecutedAction {
                output: ActionOutput::Focused {
                    selector: option.target_selector.clone().unwrap_or_default(),
                },
                focus_changed: true,
                duration_ms: 10,
            })
        }
    }

    /// Executor double that always fails with a recoverable error.
    struct AlwaysFails;

    #[async_trait]
    impl ActionExecutor for AlwaysFails {
        async fn execute(
            &self,
            _session: &SessionId,
            _option: &ActionOption,
            _task: &SubTask,
            _snapshot: &PerceptionSnapshot,
        ) -> Result<ExecutedAction, AxError> {
            Err(AxError::evaluation("scripted executor failure"))
        }
    }

    /// Executor double whose every action times out.
    struct TimesOut;

    #[async_trait]
    impl ActionExecutor for TimesOut {
        async fn execute(
            &self,
            _session: &SessionId,
            _option: &ActionOption,
            _task: &SubTask,
            _snapshot: &PerceptionSnapshot,
        ) -> Result<ExecutedAction, AxError> {
            Err(AxError::timeout("focus", 5_000))
        }
    }

    /// Executor double that requests cooperative cancellation after its
    /// first successful action.
    struct StopsAfterFirst {
        handle: std::sync::OnceLock<LoopHandle>,
    }

    #[async_trait]
    impl ActionExecutor for StopsAfterFirst {
        async fn execute(
            &self,
            _session: &SessionId,
            option: &ActionOption,
            _task: &SubTask,
            _snapshot: &PerceptionSnapshot,
        ) -> Result<ExecutedAction, AxError> {
            if let Some(handle) = self.handle.get() {
                handle.stop();
            }
            Ok(ExecutedAction {
                output: ActionOutput::Focused {
                    selector: option.target_selector.clone().unwrap_or_default(),
                },
                focus_changed: true,
                duration_ms: 10,
            })
        }
    }

    fn coordinator(
        executor: Arc<dyn ActionExecutor>,
        clock: Arc<ManualClock>,
        config: LoopConfig,
    ) -> (PrarCoordinator, Arc<StateStore>) {
        let store = Arc::new(StateStore::new(Capabilities::default()));
        let sampler = Arc::new(MockSampler::new(snapshot_with(&["#btn"])));
        let coordinator =
            PrarCoordinator::new(store.clone(), sampler, executor, clock, config);
        (coordinator, store)
    }

    #[tokio::test]
    async fn failing_executor_terminates_at_error_threshold() {
        let clock = Arc::new(ManualClock::new());
        let (coordinator, store) = coordinator(
            Arc::new(AlwaysFails),
            clock.clone(),
            LoopConfig::minimal(),
        );
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FocusTrapScan);

        let result = coordinator.start_loop(&session, &task).await;
        assert!(!result.success);
        assert_eq!(result.cycles, 3);
        assert_eq!(result.final_phase, AgentPhase::Error);
        assert_eq!(result.errors.len(), 3);
        assert!(!store.state().task_queue.is_empty());
        // Failed cycles double the base delay.
        assert!(clock
            .sleeps()
            .iter()
            .all(|d| *d == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn successful_run_drains_the_queue() {
        let clock = Arc::new(ManualClock::new());
        let (coordinator, store) = coordinator(
            Arc::new(AlwaysOk),
            clock.clone(),
            LoopConfig::minimal(),
        );
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FocusTrapScan);

        let result = coordinator.start_loop(&session, &task).await;
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.final_phase, AgentPhase::Idle);

        let state = store.state();
        assert!(state.task_queue.is_empty());
        assert_eq!(state.completed_tasks.len() as u32, result.cycles);
        assert_eq!(state.metrics.cycle_count, u64::from(result.cycles));
        assert!(state.context.total_actions >= state.context.successful_actions);
        // Successful cycles pace at the base delay.
        assert!(clock
            .sleeps()
            .iter()
            .all(|d| *d == Duration::from_millis(100)));

        let history = coordinator.cycle_history();
        assert_eq!(history.len() as u32, result.cycles);
        assert!(history.iter().all(|record| record.goal_achieved));
    }

    #[tokio::test]
    async fn stop_request_is_honored_between_cycles() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(StateStore::new(Capabilities::default()));
        let sampler = Arc::new(MockSampler::new(snapshot_with(&["#btn"])));
        let stopping = Arc::new(StopsAfterFirst {
            handle: std::sync::OnceLock::new(),
        });
        let coordinator = PrarCoordinator::new(
            store,
            sampler,
            stopping.clone(),
            clock,
            LoopConfig::minimal(),
        );
        // Wire the executor to the coordinator's own handle once built.
        let _ = stopping.handle.set(coordinator.handle());
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FocusTrapScan);

        let result = coordinator.start_loop(&session, &task).await;
        // One cycle ran, then the cooperative flag ended the loop.
        assert_eq!(result.cycles, 1);
        assert!(!result.success);
        assert_eq!(result.final_phase, AgentPhase::Idle);
        assert!(!coordinator.handle().is_running());
    }

    #[tokio::test]
    async fn undecomposable_task_fails_without_cycles() {
        let clock = Arc::new(ManualClock::new());
        let (coordinator, _store) = coordinator(
            Arc::new(AlwaysOk),
            clock,
            LoopConfig::minimal(),
        );
        let session = SessionId::new();
        // A visibility check needs scoped selectors to decompose.
        let task = HighLevelTask::new(AuditKind::FocusVisibilityCheck);

        let result = coordinator.start_loop(&session, &task).await;
        assert!(!result.success);
        assert_eq!(result.cycles, 0);
        assert_eq!(result.final_phase, AgentPhase::Error);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn max_cycles_caps_a_livelocked_run() {
        let clock = Arc::new(ManualClock::new());
        // Goal never achieved: focus never changes, criteria for focus
        // actions demand it, and the sub-tasks stay queued.
        struct NoProgress;
        #[async_trait]
        impl ActionExecutor for NoProgress {
            async fn execute(
                &self,
                _session: &SessionId,
                _option: &ActionOption,
                _task: &SubTask,
                _snapshot: &PerceptionSnapshot,
            ) -> Result<ExecutedAction, AxError> {
                Ok(ExecutedAction {
                    output: ActionOutput::Waited { waited_ms: 1 },
                    focus_changed: false,
                    duration_ms: 1,
                })
            }
        }
        let config = LoopConfig::minimal().with_max_cycles(4);
        let (coordinator, store) =
            coordinator(Arc::new(NoProgress), clock, config);
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FullSiteAudit);

        let result = coordinator.start_loop(&session, &task).await;
        assert_eq!(result.cycles, 4);
        assert!(!result.success);
        // No errors were raised; the run simply hit the cycle ceiling.
        assert_eq!(result.final_phase, AgentPhase::Idle);
        assert!(!store.state().task_queue.is_empty());
    }

    #[tokio::test]
    async fn trap_scan_task_drives_the_detector() {
        let clock = Arc::new(ManualClock::new());
        let page = Arc::new(MockPage::new());
        page.set_node(NodeInfo {
            selector: "#x".into(),
            tag_name: "button".into(),
            attributes: Default::default(),
            text_content: None,
            visible: true,
        });
        // Tab cycles between the two elements without ever leaving the page.
        page.script_tab_loop(["#x", "#y"], 30);
        let store = Arc::new(StateStore::new(Capabilities::default()));
        let sampler = Arc::new(MockSampler::new(snapshot_with(&["#x", "#y"])));
        let executor = Arc::new(ChannelExecutor::new(
            page,
            clock.clone(),
            DetectorConfig::minimal(),
        ));
        let coordinator = PrarCoordinator::new(
            store.clone(),
            sampler,
            executor,
            clock,
            LoopConfig::minimal(),
        );
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FocusTrapScan);

        let result = coordinator.start_loop(&session, &task).await;
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.cycles, 2);

        // The scan cycle ran the detection passes and surfaced the loop.
        let history = coordinator.cycle_history();
        assert!(history.iter().any(|record| record.action == ActionKind::Scan));
        let patterns = store.state().knowledge.patterns;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].id, "traps:https://example.test");
        assert!(patterns[0].confidence > 0.0);
    }

    #[tokio::test]
    async fn failed_cycles_record_failure_reasons() {
        let clock = Arc::new(ManualClock::new());
        let (coordinator, store) = coordinator(
            Arc::new(AlwaysFails),
            clock,
            LoopConfig::minimal(),
        );
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FocusTrapScan);

        let result = coordinator.start_loop(&session, &task).await;
        assert!(!result.success);

        let reasons = store.state().knowledge.failure_reasons;
        assert_eq!(reasons.len(), 3);
        assert!(reasons.iter().all(|reason| reason.kind == "evaluation"));
        assert!(reasons.iter().all(|reason| reason.url == "https://example.test"));
    }

    #[tokio::test]
    async fn timeout_failures_raise_the_retry_budget() {
        let clock = Arc::new(ManualClock::new());
        let (coordinator, store) = coordinator(
            Arc::new(TimesOut),
            clock,
            LoopConfig::minimal(),
        );
        let session = SessionId::new();
        let task = HighLevelTask::new(AuditKind::FocusTrapScan);

        let result = coordinator.start_loop(&session, &task).await;
        assert!(!result.success);
        assert_eq!(result.cycles, 3);

        // Each timed-out cycle buys one extra retry.
        let strategy = store.state().strategy;
        assert_eq!(strategy.max_retries, TestStrategy::default().max_retries + 3);
        assert!(store
            .state()
            .knowledge
            .failure_reasons
            .iter()
            .all(|reason| reason.kind == "timeout"));
    }

    #[test]
    fn options_cover_every_subtask_kind() {
        let snapshot = snapshot_with(&["#btn"]);
        for kind in [
            SubTaskKind::Discovery,
            SubTaskKind::ElementAnalysis,
            SubTaskKind::NavigationTest,
            SubTaskKind::TrapScan,
            SubTaskKind::InteractionTest,
            SubTaskKind::Verification,
        ] {
            let task = SubTask {
                id: TaskId::named("st-0"),
                parent_id: TaskId::named("parent"),
                kind,
                target_selector: None,
                expected_outcome: "outcome".into(),
                dependencies: vec![],
                estimated_time_ms: 1_000,
                retryable: true,
            };
            let options = options_for(&task, &snapshot);
            assert!(!options.is_empty(), "no options for {kind:?}");
            // The settle fallback is always available.
            assert!(options.iter().any(|o| o.kind == ActionKind::Wait));
        }
    }
}
