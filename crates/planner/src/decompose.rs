//! Task decomposition: high-level goal to ordered sub-tasks.

use tracing::{debug, warn};

use focusguard_core_types::TaskId;
use focusguard_state_store::{AuditKind, HighLevelTask, SubTask, SubTaskKind};

use crate::errors::PlanError;

/// Default estimate per sub-task kind, in milliseconds.
fn default_estimate_ms(kind: SubTaskKind) -> u64 {
    match kind {
        SubTaskKind::Discovery => 3_000,
        SubTaskKind::ElementAnalysis => 2_000,
        SubTaskKind::NavigationTest => 5_000,
        SubTaskKind::TrapScan => 8_000,
        SubTaskKind::InteractionTest => 4_000,
        SubTaskKind::Verification => 2_500,
    }
}

struct TaskBuilder {
    parent: TaskId,
    tasks: Vec<SubTask>,
}

impl TaskBuilder {
    fn new(parent: TaskId) -> Self {
        Self {
            parent,
            tasks: Vec::new(),
        }
    }

    fn next_id(&self) -> TaskId {
        TaskId::named(format!("{}/st-{}", self.parent, self.tasks.len()))
    }

    /// Push a sub-task depending on the previously pushed one.
    fn push_chained(
        &mut self,
        kind: SubTaskKind,
        target: Option<String>,
        outcome: &str,
    ) -> TaskId {
        let dependencies = self
            .tasks
            .last()
            .map(|prev| vec![prev.id.clone()])
            .unwrap_or_default();
        self.push_with_deps(kind, target, outcome, dependencies)
    }

    fn push_with_deps(
        &mut self,
        kind: SubTaskKind,
        target: Option<String>,
        outcome: &str,
        dependencies: Vec<TaskId>,
    ) -> TaskId {
        let id = self.next_id();
        self.tasks.push(SubTask {
            id: id.clone(),
            parent_id: self.parent.clone(),
            kind,
            target_selector: target,
            expected_outcome: outcome.to_string(),
            dependencies,
            estimated_time_ms: default_estimate_ms(kind),
            retryable: kind != SubTaskKind::Discovery,
        });
        id
    }
}

/// Decompose an operator goal into dependency-ordered sub-tasks.
///
/// Dispatches on the audit kind, then applies the task's time and element
/// budgets, and finally resolves a dependency-respecting order. A cycle or
/// missing dependency never deadlocks: the oldest remaining task is
/// force-advanced instead.
pub fn decompose_task(task: &HighLevelTask) -> Result<Vec<SubTask>, PlanError> {
    let mut builder = TaskBuilder::new(task.id.clone());

    match task.audit {
        AuditKind::FullSiteAudit => {
            let discovery =
                builder.push_chained(SubTaskKind::Discovery, None, "focusable elements listed");
            builder.push_with_deps(
                SubTaskKind::NavigationTest,
                None,
                "sequential navigation covers the page",
                vec![discovery.clone()],
            );
            let selectors = scoped_selectors(task);
            if selectors.is_empty() {
                builder.push_chained(
                    SubTaskKind::Verification,
                    None,
                    "every reachable element has a visible focus indicator",
                );
            } else {
                for selector in selectors {
                    builder.push_chained(
                        SubTaskKind::Verification,
                        Some(selector.clone()),
                        "element has a visible focus indicator",
                    );
                }
            }
        }
        AuditKind::FocusTrapScan => {
            let discovery =
                builder.push_chained(SubTaskKind::Discovery, None, "focusable elements listed");
            builder.push_with_deps(
                SubTaskKind::TrapScan,
                None,
                "no focus trap detected by any pass",
                vec![discovery],
            );
        }
        AuditKind::FocusVisibilityCheck => {
            for selector in scoped_selectors(task) {
                let analysis = builder.push_chained(
                    SubTaskKind::ElementAnalysis,
                    Some(selector.clone()),
                    "focus styles captured",
                );
                builder.push_with_deps(
                    SubTaskKind::Verification,
                    Some(selector.clone()),
                    "focus indicator visible",
                    vec![analysis],
                );
            }
        }
        AuditKind::FixAndVerify => {
            let analysis = builder.push_chained(
                SubTaskKind::ElementAnalysis,
                first_selector(task),
                "issue confirmed on element",
            );
            let interaction = builder.push_with_deps(
                SubTaskKind::InteractionTest,
                first_selector(task),
                "fix applied through injection",
                vec![analysis],
            );
            builder.push_with_deps(
                SubTaskKind::Verification,
                first_selector(task),
                "fix verified with evidence",
                vec![interaction],
            );
        }
    }

    let mut tasks = builder.tasks;
    if tasks.is_empty() {
        return Err(PlanError::EmptyDecomposition(format!(
            "audit {:?} with empty selector scope",
            task.audit
        )));
    }

    apply_constraints(&mut tasks, task);
    let ordered = resolve_order(tasks);
    debug!(count = ordered.len(), audit = ?task.audit, "decomposed task");
    Ok(ordered)
}

fn scoped_selectors(task: &HighLevelTask) -> Vec<String> {
    task.include_selectors.clone()
}

fn first_selector(task: &HighLevelTask) -> Option<String> {
    task.include_selectors.first().cloned()
}

/// Enforce the task's time and element budgets.
fn apply_constraints(tasks: &mut Vec<SubTask>, task: &HighLevelTask) {
    if let Some(limit_ms) = task.time_limit_ms {
        let total: u64 = tasks.iter().map(|t| t.estimated_time_ms).sum();
        if total > limit_ms {
            // Over budget: keep the highest-priority work that still fits.
            let mut indexed: Vec<usize> = (0..tasks.len()).collect();
            indexed.sort_by(|a, b| {
                tasks[*b]
                    .kind
                    .priority_weight()
                    .cmp(&tasks[*a].kind.priority_weight())
            });
            let mut budget = limit_ms;
            let mut keep = vec![false; tasks.len()];
            for idx in indexed {
                let cost = tasks[idx].estimated_time_ms;
                if cost <= budget {
                    keep[idx] = true;
                    budget -= cost;
                }
            }
            let mut iter = keep.iter();
            tasks.retain(|_| *iter.next().unwrap());
            warn!(
                kept = tasks.len(),
                limit_ms, "time budget forced task re-prioritization"
            );
        }
    }

    if let Some(max_elements) = task.max_elements {
        let mut element_tasks = 0usize;
        tasks.retain(|t| {
            if t.target_selector.is_some() {
                element_tasks += 1;
                element_tasks <= max_elements
            } else {
                true
            }
        });
    }
}

/// Dependency-respecting topological order.
///
/// A task is ready once all its dependencies are already emitted or no
/// longer present in the set (pruned by budget constraints). When nothing
/// is ready the oldest remaining task is force-advanced.
pub fn resolve_order(mut pending: Vec<SubTask>) -> Vec<SubTask> {
    let present: Vec<TaskId> = pending.iter().map(|t| t.id.clone()).collect();
    let mut emitted: Vec<TaskId> = Vec::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending.iter().position(|t| {
            t.dependencies
                .iter()
                .all(|dep| emitted.contains(dep) || !present.contains(dep))
        });
        let index = match ready {
            Some(index) => index,
            None => {
                warn!(
                    task = %pending[0].id,
                    "unresolvable dependency; force-advancing oldest task"
                );
                0
            }
        };
        let task = pending.remove(index);
        emitted.push(task.id.clone());
        ordered.push(task);
    }
    ordered
}
