//! Trap detection result model and report aggregation.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use focusguard_core_types::{Severity, WcagCriterion};

/// Closed set of trap categories a pass can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapKind {
    /// Focus cycles through the same elements without ever leaving.
    InfiniteLoop,
    /// Focus sticks to one element and cannot move on.
    NoEscape,
    /// Interactive content is skipped by sequential navigation.
    SkipContent,
    /// A modal holds focus and ignores Escape.
    ModalTrap,
    /// Keyboard input stops being processed at all.
    KeyboardTrap,
    /// Backward navigation fails where forward navigation works.
    PartialTrap,
}

impl TrapKind {
    pub fn wcag_criteria(&self) -> Vec<WcagCriterion> {
        match self {
            TrapKind::InfiniteLoop | TrapKind::NoEscape | TrapKind::KeyboardTrap => {
                vec![WcagCriterion::no_keyboard_trap(), WcagCriterion::keyboard()]
            }
            TrapKind::ModalTrap => vec![WcagCriterion::no_keyboard_trap()],
            TrapKind::SkipContent => {
                vec![WcagCriterion::keyboard(), WcagCriterion::focus_order()]
            }
            TrapKind::PartialTrap => vec![WcagCriterion::focus_order()],
        }
    }

    /// Operator-facing remediation hint for this trap category.
    pub fn recommendation(&self) -> &'static str {
        match self {
            TrapKind::InfiniteLoop => {
                "Break the focus cycle: ensure tab order eventually reaches content \
                 outside the looping container"
            }
            TrapKind::NoEscape => {
                "Allow focus to leave the element: remove key handlers that swallow \
                 Tab, or provide an explicit exit"
            }
            TrapKind::SkipContent => {
                "Make skipped interactive elements reachable: check tabindex values \
                 and visibility of focusable content"
            }
            TrapKind::ModalTrap => {
                "Close the dialog on Escape and return focus to the triggering \
                 element"
            }
            TrapKind::KeyboardTrap => {
                "Restore keyboard processing: an element is swallowing key events \
                 without moving focus"
            }
            TrapKind::PartialTrap => {
                "Fix backward (Shift+Tab) navigation so the tab order is traversable \
                 in both directions"
            }
        }
    }
}

/// One step of a navigation walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub selector: String,
    pub tab_index: i32,
    pub visible: bool,
    pub focus_ring_visible: bool,
    pub visit_count: usize,
    pub navigation_success: bool,
}

/// A single detected trap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusTrapResult {
    pub kind: TrapKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_selector: Option<String>,
    /// Ordered trace of the steps leading into the trap.
    #[serde(default)]
    pub trap_sequence: Vec<TraceEntry>,
    /// Detection confidence, 0..=1.
    pub confidence: f64,
    pub wcag_criteria: Vec<WcagCriterion>,
    /// Elements affected beyond the trace (coverage gaps).
    #[serde(default)]
    pub affected_elements: Vec<String>,
    pub description: String,
}

impl FocusTrapResult {
    pub fn new(kind: TrapKind, severity: Severity, confidence: f64) -> Self {
        Self {
            kind,
            severity,
            start_selector: None,
            end_selector: None,
            trap_sequence: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            wcag_criteria: kind.wcag_criteria(),
            affected_elements: Vec::new(),
            description: String::new(),
        }
    }

    pub fn span(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_selector = Some(start.into());
        self.end_selector = Some(end.into());
        self
    }

    pub fn sequence(mut self, trace: Vec<TraceEntry>) -> Self {
        self.trap_sequence = trace;
        self
    }

    pub fn affected(mut self, elements: Vec<String>) -> Self {
        self.affected_elements = elements;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Aggregated outcome of one detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusTrapReport {
    pub results: Vec<FocusTrapResult>,
    /// 100 minus severity penalties, floored at 0.
    pub overall_score: u32,
    pub recommendations: Vec<String>,
    pub elements_traversed: usize,
    pub url: String,
}

impl FocusTrapReport {
    pub fn from_results(
        url: impl Into<String>,
        results: Vec<FocusTrapResult>,
        elements_traversed: usize,
    ) -> Self {
        let penalty: u32 = results
            .iter()
            .map(|result| result.severity.score_penalty())
            .sum();
        let overall_score = 100u32.saturating_sub(penalty);

        // One recommendation per distinct trap kind, in first-seen order.
        let mut seen: HashMap<TrapKind, ()> = HashMap::new();
        let mut recommendations = Vec::new();
        for result in &results {
            if seen.insert(result.kind, ()).is_none() {
                recommendations.push(result.kind.recommendation().to_string());
            }
        }

        Self {
            results,
            overall_score,
            recommendations,
            elements_traversed,
            url: url.into(),
        }
    }

    pub fn total_traps(&self) -> usize {
        self.results.len()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.results
            .iter()
            .filter(|result| result.severity == severity)
            .count()
    }
}

/// Tunable thresholds for the detection passes.
///
/// The infinite-loop threshold and the no-escape window are deliberately
/// independent knobs; they can disagree on small traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Maximum forward/backward tab presses per walk.
    pub max_tab_presses: usize,
    /// Visits to one selector beyond which the walk is an infinite loop.
    pub max_loop_detection: usize,
    /// Trailing identical entries that mean focus cannot escape.
    pub no_escape_window: usize,
    /// Consecutive navigation failures that mean a keyboard trap (forward).
    pub max_navigation_failures: usize,
    /// Consecutive failures that mean a partial trap (backward walk).
    pub reverse_failure_window: usize,
    /// Tab presses attempted inside an expandable component.
    pub component_tab_limit: usize,
    /// Same-element repeats inside a component that mean containment.
    pub component_repeat_threshold: usize,
    /// Unreachable-element count above which a coverage gap is critical.
    pub unreachable_critical_threshold: usize,
    /// Settle delay after sending Escape to a modal.
    pub modal_settle: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_tab_presses: 100,
            max_loop_detection: 5,
            no_escape_window: 5,
            max_navigation_failures: 5,
            reverse_failure_window: 3,
            component_tab_limit: 10,
            component_repeat_threshold: 3,
            unreachable_critical_threshold: 5,
            modal_settle: Duration::from_millis(300),
        }
    }
}

impl DetectorConfig {
    /// Small limits for fast tests.
    pub fn minimal() -> Self {
        Self {
            max_tab_presses: 20,
            modal_settle: Duration::from_millis(10),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(kind: TrapKind, severity: Severity) -> FocusTrapResult {
        FocusTrapResult::new(kind, severity, 0.9)
    }

    #[test]
    fn score_penalties_accumulate() {
        let report = FocusTrapReport::from_results(
            "https://example.test",
            vec![
                result(TrapKind::InfiniteLoop, Severity::Critical),
                result(TrapKind::SkipContent, Severity::Major),
                result(TrapKind::PartialTrap, Severity::Minor),
            ],
            10,
        );
        assert_eq!(report.overall_score, 100 - 30 - 15 - 5);
        assert_eq!(report.total_traps(), 3);
    }

    #[test]
    fn score_is_floored_at_zero() {
        let results = (0..4)
            .map(|_| result(TrapKind::InfiniteLoop, Severity::Critical))
            .collect();
        let report = FocusTrapReport::from_results("https://example.test", results, 5);
        assert_eq!(report.overall_score, 0);
    }

    #[test]
    fn score_monotonically_non_increasing() {
        let mut previous = u32::MAX;
        for n in 0..10 {
            let results = (0..n)
                .map(|_| result(TrapKind::ModalTrap, Severity::Major))
                .collect();
            let report = FocusTrapReport::from_results("https://example.test", results, 5);
            assert!(report.overall_score <= previous);
            previous = report.overall_score;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn recommendations_deduplicated_per_kind() {
        let report = FocusTrapReport::from_results(
            "https://example.test",
            vec![
                result(TrapKind::ModalTrap, Severity::Major),
                result(TrapKind::ModalTrap, Severity::Critical),
                result(TrapKind::SkipContent, Severity::Major),
            ],
            10,
        );
        assert_eq!(report.recommendations.len(), 2);
    }

    #[test]
    fn confidence_is_clamped() {
        let trap = FocusTrapResult::new(TrapKind::NoEscape, Severity::Critical, 1.7);
        assert!((trap.confidence - 1.0).abs() < 1e-9);
    }
}
