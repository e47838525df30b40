//! The state store: single owner of the mutable agent snapshot.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use focusguard_core_types::{AxError, SessionId, TaskId};
use focusguard_page_channel::PerceptionSnapshot;

use crate::events::{EventHub, StateEvent, StateEventKind, TaskUpdateKind};
use crate::model::{
    ActionPlan, AgentMetrics, AgentPhase, AgentState, Capabilities, ErrorRecord, FixSolution,
    Pattern, PerceptionDigest, SubTask, TestStrategy,
};

/// How many past snapshots are retained for diagnostics.
const HISTORY_CAPACITY: usize = 100;

/// Durable subset of the state, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableState {
    pub phase: AgentPhase,
    pub context: crate::model::ExecutionContext,
    pub knowledge: crate::model::KnowledgeBase,
    pub metrics: AgentMetrics,
}

struct StoreInner {
    state: AgentState,
    history: VecDeque<AgentState>,
}

impl StoreInner {
    /// Snapshot the pre-mutation state into the bounded history ring.
    fn remember(&mut self) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(self.state.clone());
    }
}

/// Single-owner store for [`AgentState`].
///
/// All mutation happens through the methods below; each computes the new
/// state, appends the previous snapshot to a bounded history ring, and
/// synchronously publishes a typed change event. The store itself never
/// produces errors — it only buffers the ones reported to it.
pub struct StateStore {
    inner: Mutex<StoreInner>,
    events: EventHub,
}

impl StateStore {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state: AgentState::initial(capabilities),
                history: VecDeque::new(),
            }),
            events: EventHub::new(64),
        }
    }

    /// Immutable snapshot of the current state.
    pub fn state(&self) -> AgentState {
        self.inner.lock().state.clone()
    }

    pub fn phase(&self) -> AgentPhase {
        self.inner.lock().state.phase
    }

    pub fn subscribe(&self, kind: StateEventKind) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe_all()
    }

    pub fn set_phase(&self, phase: AgentPhase) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state.phase;
            if from == phase {
                return;
            }
            inner.remember();
            inner.state.phase = phase;
            from
        };
        debug!(?from, to = ?phase, "phase change");
        self.events.publish(StateEvent::PhaseChange { from, to: phase });
    }

    pub fn add_task(&self, task: SubTask) {
        let task_id = task.id.clone();
        {
            let mut inner = self.inner.lock();
            inner.remember();
            inner.state.task_queue.push(task);
        }
        self.events.publish(StateEvent::TaskUpdate {
            task_id,
            update: TaskUpdateKind::Queued,
        });
    }

    /// Move a sub-task from the queue to the completed list.
    pub fn complete_task(&self, task_id: &TaskId) {
        {
            let mut inner = self.inner.lock();
            inner.remember();
            inner.state.task_queue.retain(|t| &t.id != task_id);
            if !inner.state.completed_tasks.contains(task_id) {
                inner.state.completed_tasks.push(task_id.clone());
            }
            if inner.state.context.active_subtask.as_ref() == Some(task_id) {
                inner.state.context.active_subtask = None;
            }
        }
        self.events.publish(StateEvent::TaskUpdate {
            task_id: task_id.clone(),
            update: TaskUpdateKind::Completed,
        });
    }

    pub fn set_active_subtask(&self, task_id: Option<TaskId>) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.context.active_subtask = task_id;
    }

    pub fn set_active_task(&self, task_id: Option<TaskId>) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.context.active_task = task_id;
    }

    pub fn add_error(&self, error: AxError, phase: AgentPhase) {
        let record = ErrorRecord::new(error, phase);
        {
            let mut inner = self.inner.lock();
            inner.remember();
            inner.state.errors.push(record.clone());
        }
        self.events.publish(StateEvent::Error { record });
    }

    pub fn update_strategy(&self, strategy: TestStrategy) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.strategy = strategy;
    }

    pub fn update_perception(&self, snapshot: &PerceptionSnapshot) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.context.current_url = snapshot.url.clone();
        inner.state.context.last_perception = Some(PerceptionDigest {
            url: snapshot.url.clone(),
            focusable_count: snapshot.element_count(),
            dynamic_delta_count: snapshot.dynamic_deltas.len(),
            captured_at: chrono::Utc::now(),
        });
    }

    pub fn update_action_plan(&self, plan: ActionPlan) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.context.last_plan = Some(plan);
    }

    /// Record one action outcome; keeps `total >= successful` by construction.
    pub fn record_action(&self, success: bool) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.context.total_actions += 1;
        if success {
            inner.state.context.successful_actions += 1;
        }
    }

    pub fn update_metrics(&self, cycle_ms: u64) {
        let metrics = {
            let mut inner = self.inner.lock();
            inner.remember();
            inner.state.metrics.record_cycle(cycle_ms);
            inner.state.metrics
        };
        self.events.publish(StateEvent::MetricsUpdate { metrics });
    }

    /// Record a learned pattern. A repeat observation of the same id merges
    /// instead of duplicating: the observation counter grows and the stored
    /// confidence is nudged toward the newly observed value, clamped to [0, 1].
    pub fn add_pattern(&self, pattern: Pattern) {
        let mut inner = self.inner.lock();
        inner.remember();
        let patterns = &mut inner.state.knowledge.patterns;
        match patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(existing) => {
                existing.observations += 1;
                let step =
                    (pattern.confidence - existing.confidence) / existing.observations as f64;
                existing.confidence = (existing.confidence + step).clamp(0.0, 1.0);
            }
            None => patterns.push(pattern),
        }
    }

    /// Record a fix-approach outcome, merging by id like [`add_pattern`]:
    /// the application counter grows and the success rate moves toward the
    /// reported outcome, clamped to [0, 1].
    ///
    /// [`add_pattern`]: StateStore::add_pattern
    pub fn add_fix_solution(&self, solution: FixSolution) {
        let mut inner = self.inner.lock();
        inner.remember();
        let solutions = &mut inner.state.knowledge.fix_solutions;
        match solutions.iter_mut().find(|s| s.id == solution.id) {
            Some(existing) => {
                existing.applications += 1;
                let step =
                    (solution.success_rate - existing.success_rate) / existing.applications as f64;
                existing.success_rate = (existing.success_rate + step).clamp(0.0, 1.0);
            }
            None => solutions.push(solution),
        }
    }

    /// Apply an arbitrary delta to the knowledge base.
    pub fn update_knowledge<F>(&self, apply: F)
    where
        F: FnOnce(&mut crate::model::KnowledgeBase),
    {
        let mut inner = self.inner.lock();
        inner.remember();
        apply(&mut inner.state.knowledge);
    }

    /// Restore initial state, keeping capabilities and minting a fresh session.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let capabilities = inner.state.capabilities.clone();
        inner.remember();
        inner.state = AgentState::initial(capabilities);
        inner.state.context.session = Some(SessionId::new());
    }

    /// Past snapshots, oldest first.
    pub fn history(&self) -> Vec<AgentState> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Serialize the durable subset for persistence across restarts.
    pub fn export_state(&self) -> DurableState {
        let inner = self.inner.lock();
        DurableState {
            phase: inner.state.phase,
            context: inner.state.context.clone(),
            knowledge: inner.state.knowledge.clone(),
            metrics: inner.state.metrics,
        }
    }

    /// Restore a previously exported durable subset. Task queues and plans
    /// are transient and rebuilt by a fresh decomposition.
    pub fn import_state(&self, durable: DurableState) {
        let mut inner = self.inner.lock();
        inner.remember();
        inner.state.phase = durable.phase;
        inner.state.context = durable.context;
        inner.state.knowledge = durable.knowledge;
        inner.state.metrics = durable.metrics;
    }

    /// Write the current state and history length to disk as pretty JSON.
    pub fn write_snapshot<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let snapshot = {
            let inner = self.inner.lock();
            StoreSnapshot {
                state: inner.state.clone(),
                history_len: inner.history.len(),
            }
        };
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &snapshot)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct StoreSnapshot {
    state: AgentState,
    history_len: usize,
}
