//! Autonomous keyboard-accessibility testing agent.
//!
//! Focusguard drives a web page through its remote-control ports and audits
//! keyboard operability: it walks the tab order looking for focus traps,
//! plans and executes test actions through a perceive-reason-act-reflect
//! loop, and verifies injected fixes with collected evidence. The page is
//! only ever reached through the [`PageChannel`], [`PerceptionSampler`] and
//! [`FixInjector`] ports, so the whole agent runs against test doubles.
//!
//! The [`Agent`] facade wires the component crates together; each is usable
//! on its own.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

pub use focusguard_core_types::{
    ActionId, AxError, SessionId, Severity, TaskId, WcagCriterion, WcagLevel,
};
pub use focusguard_page_channel::{
    mock, BoundingRect, Clock, FixDescriptor, FixInjector, FixKind, FocusableElement,
    InjectionOutcome, KeyPress, NodeInfo, PageChannel, PerceptionSampler, PerceptionSnapshot,
    StylePatch, StyleSnapshot, TokioClock,
};
pub use focusguard_state_store::{
    ActionKind, ActionTotals, AgentMetrics, AgentPhase, AgentState, AuditKind, Capabilities,
    FixSolution, HighLevelTask, Pattern, StateEvent, StateEventKind, StateStore,
};
pub use focusguard_planner::PlanningEngine;
pub use focusguard_trap_detector::{
    probes, DetectorConfig, FocusTrapDetector, FocusTrapReport, FocusTrapResult, TrapKind,
};
pub use focusguard_reflection::{
    FixVerificationResult, NextAction, ReflectionConfig, ReflectionEngine, VerificationContext,
    VerificationStatus,
};
pub use focusguard_agent_loop::{
    ActionExecutor, ChannelExecutor, CycleRecord, LoopConfig, LoopHandle, LoopResult,
    PrarCoordinator,
};

pub use focusguard_state_store::DurableState;

/// Agent-wide configuration bundle.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub capabilities: Capabilities,
    pub loop_config: LoopConfig,
    pub detector: DetectorConfig,
    pub reflection: ReflectionConfig,
}

impl AgentConfig {
    /// Small limits and no screenshots, for tests.
    pub fn minimal() -> Self {
        Self {
            capabilities: Capabilities::default(),
            loop_config: LoopConfig::minimal(),
            detector: DetectorConfig::minimal(),
            reflection: ReflectionConfig::minimal(),
        }
    }
}

/// Operator-facing progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub phase: AgentPhase,
    pub queued_tasks: usize,
    pub completed_tasks: usize,
    pub total_actions: u64,
    pub successful_actions: u64,
    pub error_count: usize,
    pub metrics: AgentMetrics,
    /// Aggregate action outcomes per action kind, from the knowledge base.
    pub action_totals: HashMap<String, ActionTotals>,
}

/// The assembled agent.
///
/// All collaborators are injected at construction; nothing here is global.
pub struct Agent {
    channel: Arc<dyn PageChannel>,
    sampler: Arc<dyn PerceptionSampler>,
    injector: Arc<dyn FixInjector>,
    store: Arc<StateStore>,
    detector: FocusTrapDetector,
    reflection: ReflectionEngine,
    coordinator: PrarCoordinator,
    session: Mutex<Option<SessionId>>,
}

impl Agent {
    /// Assemble an agent over the given ports with the production clock.
    pub fn new(
        channel: Arc<dyn PageChannel>,
        sampler: Arc<dyn PerceptionSampler>,
        injector: Arc<dyn FixInjector>,
        config: AgentConfig,
    ) -> Self {
        Self::with_clock(channel, sampler, injector, Arc::new(TokioClock::new()), config)
    }

    /// Assemble with an explicit clock; tests pass a manual one.
    pub fn with_clock(
        channel: Arc<dyn PageChannel>,
        sampler: Arc<dyn PerceptionSampler>,
        injector: Arc<dyn FixInjector>,
        clock: Arc<dyn Clock>,
        config: AgentConfig,
    ) -> Self {
        let store = Arc::new(StateStore::new(config.capabilities));
        let executor = Arc::new(ChannelExecutor::new(
            channel.clone(),
            clock.clone(),
            config.detector.clone(),
        ));
        let coordinator = PrarCoordinator::new(
            store.clone(),
            sampler.clone(),
            executor,
            clock.clone(),
            config.loop_config,
        );
        Self {
            detector: FocusTrapDetector::new(channel.clone(), clock.clone(), config.detector),
            reflection: ReflectionEngine::new(channel.clone(), clock, config.reflection),
            channel,
            sampler,
            injector,
            store,
            coordinator,
            session: Mutex::new(None),
        }
    }

    /// Attach to a tab; every later operation uses the returned session.
    pub async fn connect(&self, tab_id: &str) -> Result<SessionId, AxError> {
        let session = self.channel.connect(tab_id).await?;
        info!(%session, tab_id, "connected");
        *self.session.lock() = Some(session.clone());
        Ok(session)
    }

    pub async fn disconnect(&self) -> Result<(), AxError> {
        if let Some(session) = self.session.lock().take() {
            self.channel.disconnect(&session).await?;
        }
        Ok(())
    }

    fn current_session(&self) -> Result<SessionId, AxError> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| AxError::connection("agent is not connected to a tab"))
    }

    /// Run the PRAR loop over a decomposed operator goal.
    pub async fn run_audit(&self, task: &HighLevelTask) -> Result<LoopResult, AxError> {
        let session = self.current_session()?;
        Ok(self.coordinator.start_loop(&session, task).await)
    }

    /// Standalone focus-trap audit of the current page, outside the loop.
    pub async fn detect_traps(&self) -> Result<FocusTrapReport, AxError> {
        let session = self.current_session()?;
        let snapshot = self.sampler.perceive(&session).await?;
        self.store.update_perception(&snapshot);
        Ok(self.detector.detect(&session, &snapshot).await)
    }

    /// Apply a fix through the injector and verify it with evidence.
    ///
    /// A failed reversible fix is rolled back before returning.
    pub async fn apply_and_verify(
        &self,
        fix: &FixDescriptor,
        context: &VerificationContext,
    ) -> Result<FixVerificationResult, AxError> {
        let session = self.current_session()?;
        let outcome = self.injector.apply(&session, fix).await?;
        if !outcome.success {
            return Err(AxError::verification(format!(
                "injection of fix {} failed via {}",
                fix.fix_id, outcome.method
            )));
        }
        let result = self.reflection.verify_fix(&session, fix, context).await?;
        if result.next_action == NextAction::Rollback {
            self.injector.rollback(&session, &fix.fix_id).await?;
        }
        // Fold definitive outcomes into the knowledge base; repeated
        // applications of the same fix accumulate a success rate.
        let outcome = match result.status {
            VerificationStatus::Verified => Some(1.0),
            VerificationStatus::Failed => Some(0.0),
            _ => None,
        };
        if let Some(success_rate) = outcome {
            self.store.add_fix_solution(FixSolution {
                id: fix.fix_id.clone(),
                issue: fix
                    .wcag_criteria
                    .first()
                    .map(|criterion| criterion.to_string())
                    .unwrap_or_else(|| "keyboard accessibility".into()),
                fix: format!("{:?} patch on {}", fix.kind, fix.target_selector),
                success_rate,
                applications: 1,
            });
        }
        Ok(result)
    }

    /// Request cooperative termination of a running audit loop.
    pub fn stop(&self) {
        self.coordinator.stop_loop();
    }

    pub fn status(&self) -> AgentStatus {
        let state = self.store.state();
        AgentStatus {
            phase: state.phase,
            queued_tasks: state.task_queue.len(),
            completed_tasks: state.completed_tasks.len(),
            total_actions: state.context.total_actions,
            successful_actions: state.context.successful_actions,
            error_count: state.errors.len(),
            metrics: state.metrics,
            action_totals: state.knowledge.action_totals,
        }
    }

    /// Typed event feed from the state store.
    pub fn subscribe(&self, kind: StateEventKind) -> broadcast::Receiver<StateEvent> {
        self.store.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<StateEvent> {
        self.store.subscribe_all()
    }

    /// Durable state for persistence across restarts.
    pub fn export_state(&self) -> DurableState {
        self.store.export_state()
    }

    pub fn import_state(&self, durable: DurableState) {
        self.store.import_state(durable);
    }

    /// Finished cycles of the latest audit run.
    pub fn cycle_history(&self) -> Vec<CycleRecord> {
        self.coordinator.cycle_history()
    }

    /// Verification history the reflection engine accumulated for a selector.
    pub fn verification_history(&self, selector: &str) -> Vec<FixVerificationResult> {
        self.reflection.history(selector)
    }

    /// Direct access to the underlying store, for diagnostics.
    pub fn store(&self) -> &StateStore {
        &self.store
    }
}
