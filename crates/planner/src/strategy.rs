//! Strategy adaptation from failure history and page complexity.

use tracing::debug;

use focusguard_state_store::{FailureReason, StrategyApproach, TestStrategy};

/// Failure count above which the scope is narrowed and retries reduced.
const FAILURE_PRESSURE: usize = 5;

/// Complexity above which the planner switches to priority-based testing.
const HIGH_COMPLEXITY: f64 = 0.7;

/// Complexity below which verification depth can be raised.
const LOW_COMPLEXITY: f64 = 0.3;

/// Element budget applied when the scope is narrowed under failure pressure.
const NARROWED_BUDGET: usize = 50;

/// Page complexity score in [0, 1], linearly weighted and capped.
#[derive(Debug, Clone, Copy)]
pub struct PageComplexity(pub f64);

impl PageComplexity {
    pub fn from_counts(element_count: usize, dynamic_deltas: usize, open_issues: usize) -> Self {
        let elements = (element_count as f64 / 100.0).min(1.0) * 0.4;
        let dynamics = (dynamic_deltas as f64 / 20.0).min(1.0) * 0.3;
        let issues = (open_issues as f64 / 10.0).min(1.0) * 0.3;
        Self((elements + dynamics + issues).min(1.0))
    }
}

/// Evaluate the adaptation rules against recent failures and complexity and
/// return the adjusted strategy. The input strategy is left untouched.
pub fn adjust_strategy(
    current: &TestStrategy,
    recent_failures: &[FailureReason],
    complexity: PageComplexity,
) -> TestStrategy {
    let mut strategy = current.clone();
    let failure_count = recent_failures.len();
    let has_timeout = recent_failures
        .iter()
        .any(|failure| failure.kind == "timeout");

    // Rule list, evaluated in order.
    if failure_count > FAILURE_PRESSURE {
        strategy.element_budget = Some(
            strategy
                .element_budget
                .map_or(NARROWED_BUDGET, |budget| budget.min(NARROWED_BUDGET)),
        );
    }
    if complexity.0 > HIGH_COMPLEXITY {
        strategy.approach = StrategyApproach::PriorityBased;
        strategy.verification_depth = strategy.verification_depth.saturating_sub(1).max(1);
    }
    if has_timeout {
        strategy.max_retries += 1;
    }

    // Post-rule adjustments.
    if complexity.0 < LOW_COMPLEXITY {
        strategy.verification_depth = (strategy.verification_depth + 1).min(3);
    }
    if failure_count > FAILURE_PRESSURE {
        strategy.max_retries = strategy.max_retries.saturating_sub(1).max(1);
        strategy.exponential_backoff = true;
    }

    if strategy.approach != current.approach
        || strategy.verification_depth != current.verification_depth
    {
        debug!(
            approach = ?strategy.approach,
            depth = strategy.verification_depth,
            failures = failure_count,
            complexity = complexity.0,
            "strategy adjusted"
        );
    }
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: &str) -> FailureReason {
        FailureReason {
            kind: kind.into(),
            url: "https://example.test".into(),
            message: "scripted".into(),
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn complexity_is_capped() {
        let c = PageComplexity::from_counts(10_000, 10_000, 10_000);
        assert!(c.0 <= 1.0);
        let zero = PageComplexity::from_counts(0, 0, 0);
        assert_eq!(zero.0, 0.0);
    }

    #[test]
    fn high_complexity_switches_to_priority_based() {
        let strategy = TestStrategy::default();
        let adjusted = adjust_strategy(&strategy, &[], PageComplexity(0.9));
        assert_eq!(adjusted.approach, StrategyApproach::PriorityBased);
        assert_eq!(adjusted.verification_depth, 1);
    }

    #[test]
    fn low_complexity_raises_depth() {
        let strategy = TestStrategy::default();
        let adjusted = adjust_strategy(&strategy, &[], PageComplexity(0.1));
        assert_eq!(adjusted.verification_depth, 3);
        assert_eq!(adjusted.approach, StrategyApproach::Comprehensive);
    }

    #[test]
    fn failure_pressure_narrows_scope_and_backs_off() {
        let strategy = TestStrategy::default();
        let failures: Vec<FailureReason> = (0..6).map(|_| failure("target")).collect();
        let adjusted = adjust_strategy(&strategy, &failures, PageComplexity(0.5));
        assert_eq!(adjusted.element_budget, Some(NARROWED_BUDGET));
        assert_eq!(adjusted.max_retries, strategy.max_retries - 1);
        assert!(adjusted.exponential_backoff);
    }

    #[test]
    fn timeout_failures_raise_retry_budget() {
        let strategy = TestStrategy::default();
        let failures = vec![failure("timeout")];
        let adjusted = adjust_strategy(&strategy, &failures, PageComplexity(0.5));
        assert_eq!(adjusted.max_retries, strategy.max_retries + 1);
    }

    #[test]
    fn retries_never_drop_below_one() {
        let mut strategy = TestStrategy::default();
        strategy.max_retries = 1;
        let failures: Vec<FailureReason> = (0..10).map(|_| failure("target")).collect();
        let adjusted = adjust_strategy(&strategy, &failures, PageComplexity(0.5));
        assert_eq!(adjusted.max_retries, 1);
    }
}
