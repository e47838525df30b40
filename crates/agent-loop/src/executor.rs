//! Action execution port and the default page-channel-backed executor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use focusguard_core_types::{AxError, SessionId};
use focusguard_page_channel::{Clock, PageChannel, PerceptionSnapshot};
use focusguard_reflection::{ActionOutput, ExecutedAction};
use focusguard_state_store::{ActionKind, ActionOption, SubTask};
use focusguard_trap_detector::{DetectorConfig, FocusTrapDetector};

/// Executes one planned action against the page. The coordinator walks the
/// plan's primary action and ranked fallbacks through this port.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        session: &SessionId,
        option: &ActionOption,
        task: &SubTask,
        snapshot: &PerceptionSnapshot,
    ) -> Result<ExecutedAction, AxError>;
}

/// How long a `Wait` action pauses.
const WAIT_MS: u64 = 250;

/// Default executor translating planned actions into page-channel calls.
/// Scan actions run the full trap-detection passes over the owned detector.
pub struct ChannelExecutor {
    channel: Arc<dyn PageChannel>,
    clock: Arc<dyn Clock>,
    detector: FocusTrapDetector,
}

impl ChannelExecutor {
    pub fn new(
        channel: Arc<dyn PageChannel>,
        clock: Arc<dyn Clock>,
        detector_config: DetectorConfig,
    ) -> Self {
        let detector =
            FocusTrapDetector::new(channel.clone(), clock.clone(), detector_config);
        Self {
            channel,
            clock,
            detector,
        }
    }

    fn target<'a>(option: &'a ActionOption, task: &'a SubTask) -> Option<&'a str> {
        option
            .target_selector
            .as_deref()
            .or(task.target_selector.as_deref())
    }
}

#[async_trait]
impl ActionExecutor for ChannelExecutor {
    async fn execute(
        &self,
        session: &SessionId,
        option: &ActionOption,
        task: &SubTask,
        snapshot: &PerceptionSnapshot,
    ) -> Result<ExecutedAction, AxError> {
        let started_ms = self.clock.now_ms();
        let before = self.channel.focused_selector(session).await.ok().flatten();

        let output = match option.kind {
            ActionKind::Scan => {
                let report = self.detector.detect(session, snapshot).await;
                ActionOutput::Scanned {
                    traps_found: report.total_traps(),
                    overall_score: report.overall_score,
                }
            }
            ActionKind::Focus => {
                let selector = Self::target(option, task)
                    .ok_or_else(|| AxError::planning("focus action without a target"))?;
                self.channel.focus(session, selector).await?;
                ActionOutput::Focused {
                    selector: selector.to_string(),
                }
            }
            ActionKind::Verify => {
                let selector = Self::target(option, task)
                    .ok_or_else(|| AxError::planning("verify action without a target"))?;
                self.channel.focus(session, selector).await?;
                let style = self.channel.computed_style(session, selector).await?;
                let indicator = style.has_focus_indicator();
                ActionOutput::Verified {
                    issues_found: usize::from(!indicator),
                    overall_score: if indicator { 100 } else { 85 },
                }
            }
            ActionKind::Analyze => {
                let selector = Self::target(option, task)
                    .ok_or_else(|| AxError::planning("analyze action without a target"))?;
                let node = self.channel.query_node(session, selector).await?;
                ActionOutput::Analyzed {
                    selector: node.selector,
                    focusable: node.visible,
                }
            }
            ActionKind::Navigate => {
                let value = self
                    .channel
                    .evaluate(session, "window.location.href")
                    .await?;
                ActionOutput::Navigated {
                    url: value.as_str().unwrap_or_default().to_string(),
                }
            }
            ActionKind::Wait => {
                self.clock.sleep(Duration::from_millis(WAIT_MS)).await;
                ActionOutput::Waited { waited_ms: WAIT_MS }
            }
        };

        let after = self.channel.focused_selector(session).await.ok().flatten();
        let duration_ms = self.clock.now_ms().saturating_sub(started_ms);
        debug!(kind = ?option.kind, duration_ms, "action executed");
        Ok(ExecutedAction {
            output,
            focus_changed: before != after && after.is_some(),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use focusguard_core_types::TaskId;
    use focusguard_page_channel::mock::{ManualClock, MockPage};
    use focusguard_page_channel::{BoundingRect, FocusableElement, StyleSnapshot};
    use focusguard_state_store::SubTaskKind;

    fn subtask(target: Option<&str>) -> SubTask {
        SubTask {
            id: TaskId::named("st-0"),
            parent_id: TaskId::named("parent"),
            kind: SubTaskKind::NavigationTest,
            target_selector: target.map(String::from),
            expected_outcome: "focus moves".into(),
            dependencies: vec![],
            estimated_time_ms: 1_000,
            retryable: true,
        }
    }

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

    fn executor_over(page: Arc<MockPage>, clock: Arc<ManualClock>) -> ChannelExecutor {
        ChannelExecutor::new(page, clock, DetectorConfig::minimal())
    }

    #[tokio::test]
    async fn focus_action_reports_focus_change() {
        let page = Arc::new(MockPage::new());
        let session = page.connect("tab-1").await.unwrap();
        let executor = executor_over(page, Arc::new(ManualClock::new()));

        let option = ActionOption::new(ActionKind::Focus, "focus button").target("#btn");
        let executed = executor
            .execute(&session, &option, &subtask(None), &PerceptionSnapshot::default())
            .await
            .unwrap();
        assert!(executed.focus_changed);
        assert!(matches!(
            executed.output,
            ActionOutput::Focused { ref selector } if selector == "#btn"
        ));
    }

    #[tokio::test]
    async fn focus_without_target_is_a_planning_error() {
        let page = Arc::new(MockPage::new());
        let session = page.connect("tab-1").await.unwrap();
        let executor = executor_over(page, Arc::new(ManualClock::new()));

        let option = ActionOption::new(ActionKind::Focus, "focus nothing");
        let err = executor
            .execute(&session, &option, &subtask(None), &PerceptionSnapshot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AxError::Planning { .. }));
    }

    #[tokio::test]
    async fn option_target_falls_back_to_task_target() {
        let page = Arc::new(MockPage::new());
        let session = page.connect("tab-1").await.unwrap();
        let executor = executor_over(page, Arc::new(ManualClock::new()));

        let option = ActionOption::new(ActionKind::Focus, "focus task target");
        let executed = executor
            .execute(
                &session,
                &option,
                &subtask(Some("#from-task")),
                &PerceptionSnapshot::default(),
            )
            .await
            .unwrap();
        assert!(matches!(
            executed.output,
            ActionOutput::Focused { ref selector } if selector == "#from-task"
        ));
    }

    #[tokio::test]
    async fn wait_action_goes_through_the_clock() {
        let page = Arc::new(MockPage::new());
        let clock = Arc::new(ManualClock::new());
        let session = page.connect("tab-1").await.unwrap();
        let executor = executor_over(page, clock.clone());

        let option = ActionOption::new(ActionKind::Wait, "settle");
        let executed = executor
            .execute(&session, &option, &subtask(None), &PerceptionSnapshot::default())
            .await
            .unwrap();
        assert!(matches!(
            executed.output,
            ActionOutput::Waited { waited_ms: WAIT_MS }
        ));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(WAIT_MS)]);
    }

    #[tokio::test]
    async fn scan_action_runs_the_detection_passes() {
        let page = Arc::new(MockPage::new());
        // Tab cycles between two elements forever: the forward walk must
        // surface an infinite loop through the scan output.
        page.script_tab_loop(["#x", "#y"], 30);
        let session = page.connect("tab-1").await.unwrap();
        let executor = executor_over(page, Arc::new(ManualClock::new()));

        let option = ActionOption::new(ActionKind::Scan, "run trap passes");
        let executed = executor
            .execute(&session, &option, &subtask(None), &snapshot_with(&["#x", "#y"]))
            .await
            .unwrap();
        match executed.output {
            ActionOutput::Scanned {
                traps_found,
                overall_score,
            } => {
                assert!(traps_found >= 1);
                assert!(overall_score < 100);
            }
            other => panic!("expected a scan output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scan_on_a_healthy_page_finds_nothing() {
        let page = Arc::new(MockPage::new());
        page.script_tab_order(["#b"]);
        page.script_back_order(["#a"]);
        let session = page.connect("tab-1").await.unwrap();
        let executor = executor_over(page, Arc::new(ManualClock::new()));

        let option = ActionOption::new(ActionKind::Scan, "run trap passes");
        let executed = executor
            .execute(&session, &option, &subtask(None), &snapshot_with(&["#a", "#b"]))
            .await
            .unwrap();
        assert!(matches!(
            executed.output,
            ActionOutput::Scanned {
                traps_found: 0,
                overall_score: 100,
            }
        ));
    }
}
