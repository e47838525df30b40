//! Outcome recording and periodic strategy re-optimization.

use tracing::info;

use focusguard_state_store::{ActionKind, KnowledgeBase, StrategyApproach, TestStrategy};

/// Per-outcome nudge applied to the (action kind, url) score.
const SCORE_NUDGE: f64 = 0.1;

/// Every this many recorded failures, re-optimization runs.
const REOPTIMIZE_EVERY: u64 = 10;

/// Rolling success rate under which re-optimization switches approaches.
const ADAPTIVE_THRESHOLD: f64 = 0.7;

/// Record one action outcome into the knowledge base and, every tenth
/// failure, re-optimize the strategy in place.
pub fn learn_from_experience(
    knowledge: &mut KnowledgeBase,
    strategy: &mut TestStrategy,
    kind: ActionKind,
    url: &str,
    success: bool,
) {
    let key = KnowledgeBase::score_key(kind, url);
    let score = knowledge.action_scores.entry(key).or_insert(0.5);
    if success {
        *score = (*score + SCORE_NUDGE).min(1.0);
    } else {
        *score = (*score - SCORE_NUDGE).max(0.0);
    }

    let totals = knowledge
        .action_totals
        .entry(format!("{kind:?}").to_lowercase())
        .or_default();
    if success {
        totals.successes += 1;
    } else {
        totals.failures += 1;
    }

    if !success {
        let total_failures: u64 = knowledge
            .action_totals
            .values()
            .map(|totals| totals.failures)
            .sum();
        if total_failures % REOPTIMIZE_EVERY == 0 {
            reoptimize(knowledge, strategy);
        }
    }
}

/// Switch to an adaptive approach when the rolling success rate is poor.
fn reoptimize(knowledge: &KnowledgeBase, strategy: &mut TestStrategy) {
    let (successes, failures) = knowledge.action_totals.values().fold(
        (0u64, 0u64),
        |(successes, failures), totals| (successes + totals.successes, failures + totals.failures),
    );
    let total = successes + failures;
    if total == 0 {
        return;
    }
    let rate = successes as f64 / total as f64;
    if rate < ADAPTIVE_THRESHOLD && strategy.approach != StrategyApproach::Adaptive {
        info!(success_rate = rate, "re-optimizing to adaptive approach");
        strategy.approach = StrategyApproach::Adaptive;
    }
}
