//! The five focus-trap detection passes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use focusguard_core_types::{AxError, SessionId, Severity};
use focusguard_page_channel::{Clock, KeyPress, PageChannel, PerceptionSnapshot};

use crate::model::{DetectorConfig, FocusTrapReport, FocusTrapResult, TraceEntry, TrapKind};
use crate::probes;

/// Shared walk state: per-selector visit counts plus the ordered trace.
#[derive(Debug, Default)]
struct TraceState {
    visit_counts: HashMap<String, usize>,
    entries: Vec<TraceEntry>,
}

impl TraceState {
    fn visit(&mut self, selector: &str) -> usize {
        let count = self.visit_counts.entry(selector.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn tail(&self, len: usize) -> Vec<TraceEntry> {
        let start = self.entries.len().saturating_sub(len);
        self.entries[start..].to_vec()
    }

    /// Whether the last `window` entries all hit the same selector.
    fn stuck(&self, window: usize) -> bool {
        if window == 0 || self.entries.len() < window {
            return false;
        }
        let tail = &self.entries[self.entries.len() - window..];
        tail.windows(2).all(|pair| pair[0].selector == pair[1].selector)
    }
}

/// Focus-trap detector running five independent passes against the page.
///
/// Passes execute sequentially, never interleaved, and each pass failure is
/// logged and skipped — it never aborts the remaining passes.
pub struct FocusTrapDetector {
    channel: Arc<dyn PageChannel>,
    clock: Arc<dyn Clock>,
    config: DetectorConfig,
}

impl FocusTrapDetector {
    pub fn new(
        channel: Arc<dyn PageChannel>,
        clock: Arc<dyn Clock>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            channel,
            clock,
            config,
        }
    }

    /// Run every pass and aggregate the findings into one report.
    pub async fn detect(
        &self,
        session: &SessionId,
        snapshot: &PerceptionSnapshot,
    ) -> FocusTrapReport {
        let mut results = Vec::new();
        let mut trace = TraceState::default();

        match self.sequential_pass(session, snapshot, &mut trace).await {
            Ok(mut found) => results.append(&mut found),
            Err(err) => warn!(%err, "sequential pass failed; skipping"),
        }
        match self.reverse_pass(session, snapshot).await {
            Ok(mut found) => results.append(&mut found),
            Err(err) => warn!(%err, "reverse pass failed; skipping"),
        }
        match self.modal_pass(session).await {
            Ok(mut found) => results.append(&mut found),
            Err(err) => warn!(%err, "modal pass failed; skipping"),
        }
        match self.component_pass(session).await {
            Ok(mut found) => results.append(&mut found),
            Err(err) => warn!(%err, "component pass failed; skipping"),
        }
        match self.coverage_pass(snapshot, &trace) {
            Ok(mut found) => results.append(&mut found),
            Err(err) => warn!(%err, "coverage pass failed; skipping"),
        }

        let traversed = trace.visit_counts.len();
        debug!(
            traps = results.len(),
            traversed, "trap detection finished"
        );
        FocusTrapReport::from_results(snapshot.url.clone(), results, traversed)
    }

    /// Forward walk from the first focusable element.
    async fn sequential_pass(
        &self,
        session: &SessionId,
        snapshot: &PerceptionSnapshot,
        trace: &mut TraceState,
    ) -> Result<Vec<FocusTrapResult>, AxError> {
        let first = match snapshot.focusable_elements.first() {
            Some(el) => el.selector.clone(),
            None => return Ok(Vec::new()),
        };
        self.channel.focus(session, &first).await?;
        trace.visit(&first);

        let mut consecutive_failures = 0usize;
        let mut previous = first.clone();

        for _ in 0..self.config.max_tab_presses {
            if let Err(err) = self.channel.press_key(session, &KeyPress::tab()).await {
                consecutive_failures += 1;
                debug!(%err, consecutive_failures, "forward tab failed");
                if consecutive_failures >= self.config.max_navigation_failures {
                    return Ok(vec![FocusTrapResult::new(
                        TrapKind::KeyboardTrap,
                        Severity::Critical,
                        0.9,
                    )
                    .span(first, previous)
                    .sequence(trace.tail(self.config.no_escape_window))
                    .describe("keyboard input stopped being processed during the forward walk")]);
                }
                continue;
            }

            let focused = match self.channel.focused_selector(session).await {
                Ok(focused) => focused,
                Err(err) => {
                    consecutive_failures += 1;
                    debug!(%err, consecutive_failures, "focus readback failed");
                    if consecutive_failures >= self.config.max_navigation_failures {
                        return Ok(vec![FocusTrapResult::new(
                            TrapKind::KeyboardTrap,
                            Severity::Critical,
                            0.9,
                        )
                        .span(first, previous)
                        .describe("focus position became unreadable during the forward walk")]);
                    }
                    continue;
                }
            };

            let selector = match focused {
                Some(selector) => selector,
                // Focus left the page (browser chrome): the walk is complete.
                None => break,
            };
            consecutive_failures = 0;

            let visit_count = trace.visit(&selector);
            let ring_visible = self
                .channel
                .computed_style(session, &selector)
                .await
                .map(|style| style.has_focus_indicator())
                .unwrap_or(false);
            let element = snapshot.element(&selector);
            trace.entries.push(TraceEntry {
                selector: selector.clone(),
                tab_index: element.map(|el| el.tab_index).unwrap_or(0),
                visible: element.map(|el| el.visible).unwrap_or(true),
                focus_ring_visible: ring_visible,
                visit_count,
                navigation_success: selector != previous,
            });

            if visit_count > self.config.max_loop_detection {
                return Ok(vec![FocusTrapResult::new(
                    TrapKind::InfiniteLoop,
                    Severity::Critical,
                    0.95,
                )
                .span(first, selector.clone())
                .sequence(trace.tail(self.config.max_loop_detection + 1))
                .describe(format!(
                    "{selector} was focused {visit_count} times within one walk"
                ))]);
            }

            if trace.stuck(self.config.no_escape_window) {
                return Ok(vec![FocusTrapResult::new(
                    TrapKind::NoEscape,
                    Severity::Critical,
                    0.9,
                )
                .span(selector.clone(), selector.clone())
                .sequence(trace.tail(self.config.no_escape_window))
                .describe(format!("focus cannot leave {selector}"))]);
            }

            previous = selector;
        }

        Ok(Vec::new())
    }

    /// Backward walk from the last focusable element, with the same loop and
    /// no-escape detection as the forward walk. Wrapping back to the start
    /// selector counts as a revisit, not the end of the walk.
    async fn reverse_pass(
        &self,
        session: &SessionId,
        snapshot: &PerceptionSnapshot,
    ) -> Result<Vec<FocusTrapResult>, AxError> {
        let last = match snapshot.focusable_elements.last() {
            Some(el) => el.selector.clone(),
            None => return Ok(Vec::new()),
        };
        self.channel.focus(session, &last).await?;
        let mut trace = TraceState::default();
        trace.visit(&last);

        let mut consecutive_failures = 0usize;
        let mut previous = last.clone();

        for _ in 0..self.config.max_tab_presses {
            let pressed = self.channel.press_key(session, &KeyPress::shift_tab()).await;
            let focused = match pressed {
                Ok(()) => self.channel.focused_selector(session).await,
                Err(err) => Err(err),
            };
            let selector = match focused {
                Ok(Some(selector)) => selector,
                // Focus left the page: the backward walk is complete.
                Ok(None) => break,
                Err(err) => {
                    consecutive_failures += 1;
                    debug!(%err, consecutive_failures, "backward tab failed");
                    if consecutive_failures >= self.config.reverse_failure_window {
                        return Ok(vec![FocusTrapResult::new(
                            TrapKind::PartialTrap,
                            Severity::Major,
                            0.8,
                        )
                        .span(last, previous)
                        .describe(
                            "backward navigation fails where forward navigation works",
                        )]);
                    }
                    continue;
                }
            };
            consecutive_failures = 0;

            let visit_count = trace.visit(&selector);
            let ring_visible = self
                .channel
                .computed_style(session, &selector)
                .await
                .map(|style| style.has_focus_indicator())
                .unwrap_or(false);
            let element = snapshot.element(&selector);
            trace.entries.push(TraceEntry {
                selector: selector.clone(),
                tab_index: element.map(|el| el.tab_index).unwrap_or(0),
                visible: element.map(|el| el.visible).unwrap_or(true),
                focus_ring_visible: ring_visible,
                visit_count,
                navigation_success: selector != previous,
            });

            if visit_count > self.config.max_loop_detection {
                return Ok(vec![FocusTrapResult::new(
                    TrapKind::InfiniteLoop,
                    Severity::Critical,
                    0.95,
                )
                .span(last, selector.clone())
                .sequence(trace.tail(self.config.max_loop_detection + 1))
                .describe(format!(
                    "{selector} was focused {visit_count} times during the backward walk"
                ))]);
            }

            if trace.stuck(self.config.no_escape_window) {
                return Ok(vec![FocusTrapResult::new(
                    TrapKind::NoEscape,
                    Severity::Critical,
                    0.9,
                )
                .span(selector.clone(), selector.clone())
                .sequence(trace.tail(self.config.no_escape_window))
                .describe(format!("focus cannot leave {selector} going backward"))]);
            }

            previous = selector;
        }

        Ok(Vec::new())
    }

    /// Escape-key behavior of every detected modal-like element.
    async fn modal_pass(&self, session: &SessionId) -> Result<Vec<FocusTrapResult>, AxError> {
        let candidates = self
            .channel
            .evaluate(session, probes::MODAL_CANDIDATES)
            .await?;
        let selectors = selector_list(&candidates);

        let mut results = Vec::new();
        for selector in selectors {
            if self.channel.focus(session, &selector).await.is_err() {
                // Candidate disappeared between probe and focus: missing data.
                continue;
            }
            self.channel.press_key(session, &KeyPress::escape()).await?;
            self.clock.sleep(self.config.modal_settle).await;

            let still_visible = self
                .channel
                .query_node(session, &selector)
                .await
                .map(|node| node.visible)
                .unwrap_or(false);
            let still_focused = self
                .channel
                .focused_selector(session)
                .await?
                .as_deref()
                == Some(selector.as_str());
            let has_handler = self
                .channel
                .evaluate(session, &probes::has_escape_handler(&selector))
                .await
                .map(|value| value.as_bool().unwrap_or(false))
                .unwrap_or(false);

            if still_visible && still_focused && !has_handler {
                let has_close = self
                    .channel
                    .evaluate(session, &probes::has_close_button(&selector))
                    .await
                    .map(|value| value.as_bool().unwrap_or(false))
                    .unwrap_or(false);
                let severity = if has_close {
                    Severity::Major
                } else {
                    Severity::Critical
                };
                results.push(
                    FocusTrapResult::new(TrapKind::ModalTrap, severity, 0.9)
                        .span(selector.clone(), selector.clone())
                        .describe(format!(
                            "{selector} stays open and keeps focus after Escape"
                        )),
                );
            }
        }
        Ok(results)
    }

    /// Tab containment inside expandable components.
    async fn component_pass(&self, session: &SessionId) -> Result<Vec<FocusTrapResult>, AxError> {
        let candidates = self
            .channel
            .evaluate(session, probes::EXPANDABLE_CANDIDATES)
            .await?;
        let selectors = selector_list(&candidates);

        let mut results = Vec::new();
        for component in selectors {
            if self.channel.focus(session, &component).await.is_err() {
                continue;
            }

            let mut repeats: HashMap<String, usize> = HashMap::new();
            let mut escaped = false;
            for _ in 0..self.config.component_tab_limit {
                self.channel.press_key(session, &KeyPress::tab()).await?;
                match self.channel.focused_selector(session).await? {
                    Some(selector) if contained_in(&selector, &component) => {
                        *repeats.entry(selector).or_insert(0) += 1;
                    }
                    _ => {
                        escaped = true;
                        break;
                    }
                }
            }

            let max_repeat = repeats.values().copied().max().unwrap_or(0);
            if !escaped && max_repeat >= self.config.component_repeat_threshold {
                results.push(
                    FocusTrapResult::new(TrapKind::SkipContent, Severity::Major, 0.7)
                        .span(component.clone(), component.clone())
                        .describe(format!(
                            "focus never leaves {component} and repeats the same element"
                        )),
                );
            }
        }
        Ok(results)
    }

    /// Set difference between statically interactive elements and the set
    /// actually visited during the sequential walk.
    fn coverage_pass(
        &self,
        snapshot: &PerceptionSnapshot,
        trace: &TraceState,
    ) -> Result<Vec<FocusTrapResult>, AxError> {
        let unreachable: Vec<String> = snapshot
            .focusable_elements
            .iter()
            .filter(|el| el.visible && el.tab_index >= 0)
            .filter(|el| !trace.visit_counts.contains_key(&el.selector))
            .map(|el| el.selector.clone())
            .collect();

        if unreachable.is_empty() {
            return Ok(Vec::new());
        }

        let severity = if unreachable.len() > self.config.unreachable_critical_threshold {
            Severity::Critical
        } else {
            Severity::Major
        };
        let count = unreachable.len();
        Ok(vec![FocusTrapResult::new(
            TrapKind::SkipContent,
            severity,
            0.95,
        )
        .affected(unreachable)
        .describe(format!(
            "{count} interactive elements are unreachable by sequential navigation"
        ))])
    }
}

/// Parse a JSON array of selector strings from a probe result.
fn selector_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `inner` addresses an element inside `outer`.
fn contained_in(inner: &str, outer: &str) -> bool {
    inner == outer || inner.starts_with(&format!("{outer} "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusguard_page_channel::mock::{ManualClock, MockPage};
    use focusguard_page_channel::{
        BoundingRect, FocusableElement, NodeInfo, StyleSnapshot,
    };
    use serde_json::json;

    fn element(selector: &str) -> FocusableElement {
        FocusableElement {
            selector: selector.to_string(),
            tag_name: "button".into(),
            tab_index: 0,
            visible: true,
            in_viewport: true,
            rect: BoundingRect::default(),
            unfocused_style: StyleSnapshot::default(),
            focused_style: None,
            sibling_indicator: None,
        }
    }

    fn snapshot(selectors: &[&str]) -> PerceptionSnapshot {
        PerceptionSnapshot {
            url: "https://example.test".into(),
            focusable_elements: selectors.iter().map(|s| element(s)).collect(),
            ..Default::default()
        }
    }

    fn detector(page: Arc<MockPage>) -> FocusTrapDetector {
        FocusTrapDetector::new(page, Arc::new(ManualClock::new()), DetectorConfig::default())
    }

    async fn session(page: &MockPage) -> SessionId {
        page.connect("tab-1").await.unwrap()
    }

    #[tokio::test]
    async fn healthy_page_reports_no_traps() {
        let page = Arc::new(MockPage::new());
        page.script_tab_order(["#b", "#c"]);
        page.script_back_order(["#b", "#a"]);
        let session = session(&page).await;

        let snapshot = snapshot(&["#a", "#b", "#c"]);
        let report = detector(page).detect(&session, &snapshot).await;
        assert_eq!(report.total_traps(), 0);
        assert_eq!(report.overall_score, 100);
    }

    #[tokio::test]
    async fn repeated_visits_emit_infinite_loop() {
        let page = Arc::new(MockPage::new());
        // #x and #y alternate forever; #x reaches six visits well inside the
        // 100-press budget.
        page.script_tab_loop(["#x", "#y"], 30);
        page.script_back_order(["#x"]);
        let session = session(&page).await;

        let snapshot = snapshot(&["#x", "#y"]);
        let report = detector(page).detect(&session, &snapshot).await;
        let loops: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::InfiniteLoop)
            .collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].severity, Severity::Critical);
        assert!((loops[0].confidence - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stuck_focus_emits_no_escape() {
        let page = Arc::new(MockPage::new());
        // Focus moves to #stuck and never leaves; the no-escape window (5
        // identical trailing entries) fires before the visit-count check (>5).
        page.script_tab_order(["#stuck", "#stuck", "#stuck", "#stuck", "#stuck"]);
        page.script_back_order(["#start"]);
        let session = session(&page).await;

        let snapshot = snapshot(&["#start", "#stuck"]);
        let report = detector(page).detect(&session, &snapshot).await;
        let traps: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::NoEscape)
            .collect();
        assert_eq!(traps.len(), 1);
        assert!((traps[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn backward_walk_detects_infinite_loop() {
        let page = Arc::new(MockPage::new());
        // The forward walk leaves the page after one step; backward tabbing
        // cycles between the same two elements forever, wrapping through the
        // starting selector without ending the walk.
        page.script_tab_order(["#q"]);
        let backs: Vec<String> = ["#p", "#q"]
            .iter()
            .cycle()
            .take(30)
            .map(|s| s.to_string())
            .collect();
        page.script_back_order(backs);
        let session = session(&page).await;

        let snapshot = snapshot(&["#p", "#q"]);
        let report = detector(page).detect(&session, &snapshot).await;
        let loops: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::InfiniteLoop)
            .collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].severity, Severity::Critical);
        assert!((loops[0].confidence - 0.95).abs() < 1e-9);
        assert!(loops[0].description.contains("backward"));
    }

    #[tokio::test]
    async fn backward_stuck_focus_emits_no_escape() {
        let page = Arc::new(MockPage::new());
        page.script_tab_order(["#end"]);
        page.script_back_order(vec!["#s"; 5]);
        let session = session(&page).await;

        let snapshot = snapshot(&["#s", "#end"]);
        let report = detector(page).detect(&session, &snapshot).await;
        let traps: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::NoEscape)
            .collect();
        assert_eq!(traps.len(), 1);
        assert!(traps[0].description.contains("backward"));
    }

    #[tokio::test]
    async fn key_failures_emit_keyboard_trap() {
        let page = Arc::new(MockPage::new());
        page.fail_next_presses(5);
        let session = session(&page).await;

        let snapshot = snapshot(&["#only"]);
        let report = detector(page).detect(&session, &snapshot).await;
        assert!(report
            .results
            .iter()
            .any(|r| r.kind == TrapKind::KeyboardTrap && r.severity == Severity::Critical));
    }

    #[tokio::test]
    async fn coverage_gap_counts_unreached_elements() {
        let page = Arc::new(MockPage::new());
        // Walk covers 7 of 10 elements (start + six tabbed), then leaves.
        page.script_tab_order(["#e1", "#e2", "#e3", "#e4", "#e5", "#e6"]);
        page.script_back_order(["#e9"]);
        let session = session(&page).await;

        let selectors: Vec<String> = (0..10).map(|i| format!("#e{i}")).collect();
        let refs: Vec<&str> = selectors.iter().map(String::as_str).collect();
        let snapshot = snapshot(&refs);
        let report = detector(page).detect(&session, &snapshot).await;

        let gaps: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::SkipContent)
            .collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].affected_elements.len(), 3);
        assert_eq!(gaps[0].severity, Severity::Major);
    }

    #[tokio::test]
    async fn modal_without_escape_is_critical_without_close_button() {
        let page = Arc::new(MockPage::new());
        page.set_node(NodeInfo {
            selector: "#modal".into(),
            tag_name: "div".into(),
            attributes: Default::default(),
            text_content: None,
            visible: true,
        });
        page.on_evaluate(probes::MODAL_CANDIDATES, json!(["#modal"]));
        page.on_evaluate(probes::has_escape_handler("#modal"), json!(false));
        page.on_evaluate(probes::has_close_button("#modal"), json!(false));
        let session = session(&page).await;

        let report = detector(page).detect(&session, &snapshot(&[])).await;
        let modals: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::ModalTrap)
            .collect();
        assert_eq!(modals.len(), 1);
        assert_eq!(modals[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn modal_with_close_button_is_major() {
        let page = Arc::new(MockPage::new());
        page.set_node(NodeInfo {
            selector: "#modal".into(),
            tag_name: "div".into(),
            attributes: Default::default(),
            text_content: None,
            visible: true,
        });
        page.on_evaluate(probes::MODAL_CANDIDATES, json!(["#modal"]));
        page.on_evaluate(probes::has_escape_handler("#modal"), json!(false));
        page.on_evaluate(probes::has_close_button("#modal"), json!(true));
        let session = session(&page).await;

        let report = detector(page).detect(&session, &snapshot(&[])).await;
        let modals: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.kind == TrapKind::ModalTrap)
            .collect();
        assert_eq!(modals.len(), 1);
        assert_eq!(modals[0].severity, Severity::Major);
    }

    #[tokio::test]
    async fn modal_that_closes_on_escape_is_fine() {
        let page = Arc::new(MockPage::new());
        page.set_node(NodeInfo {
            selector: "#modal".into(),
            tag_name: "div".into(),
            attributes: Default::default(),
            text_content: None,
            visible: true,
        });
        page.escape_closes("#modal");
        page.on_evaluate(probes::MODAL_CANDIDATES, json!(["#modal"]));
        let session = session(&page).await;

        let report = detector(page).detect(&session, &snapshot(&[])).await;
        assert!(report
            .results
            .iter()
            .all(|r| r.kind != TrapKind::ModalTrap));
    }

    #[tokio::test]
    async fn contained_component_emits_skip_content() {
        let page = Arc::new(MockPage::new());
        page.on_evaluate(probes::EXPANDABLE_CANDIDATES, json!(["#menu"]));
        // Ten tabs never leave the menu and one item repeats heavily.
        page.script_tab_loop(["#menu .item1", "#menu .item2"], 6);
        let session = session(&page).await;

        let report = detector(page).detect(&session, &snapshot(&[])).await;
        assert!(report
            .results
            .iter()
            .any(|r| r.kind == TrapKind::SkipContent && r.severity == Severity::Major
                && (r.confidence - 0.7).abs() < 1e-9));
    }

    #[tokio::test]
    async fn failed_pass_does_not_abort_others() {
        let page = Arc::new(MockPage::new());
        // No scripts at all: sequential walk immediately leaves the page,
        // probes return null. Detection still completes with a report.
        let session = session(&page).await;
        let report = detector(page).detect(&session, &snapshot(&["#a"])).await;
        assert_eq!(report.url, "https://example.test");
    }
}
