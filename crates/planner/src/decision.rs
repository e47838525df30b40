//! Candidate-action scoring and plan selection.

use tracing::debug;

use focusguard_page_channel::PerceptionSnapshot;
use focusguard_state_store::{
    ActionKind, ActionOption, ActionPlan, KnowledgeBase, PlanningContext, SuccessCriteria,
};

use crate::errors::PlanError;

/// A plan is only produced when the best option scores at least this much.
pub const MIN_VIABLE_SCORE: f64 = 0.3;

/// How many ranked fallbacks a plan carries.
const FALLBACK_COUNT: usize = 2;

/// Default per-plan timeout.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Inputs for one decision. Everything is a read-only borrow; scoring is
/// deterministic for a fixed input set.
pub struct DecisionInput<'a> {
    pub options: &'a [ActionOption],
    pub snapshot: &'a PerceptionSnapshot,
    pub knowledge: &'a KnowledgeBase,
    pub recent_actions: &'a [ActionKind],
    pub known_issue_count: usize,
    pub time_remaining_ms: Option<u64>,
}

/// Score a single option against the snapshot and history.
///
/// Base 0.5, plus the action-kind bonus, plus target presence (+0.2 when the
/// target is in the snapshot's focusable list, -0.3 when a target is named
/// but absent), plus the historical success score for this (kind, url)
/// weighted at 0.2, plus the declared success probability weighted at 0.3.
/// Clamped to [0, 1].
pub fn score_option(
    option: &ActionOption,
    snapshot: &PerceptionSnapshot,
    knowledge: &KnowledgeBase,
) -> f64 {
    let mut score = 0.5 + option.kind.base_bonus();

    if let Some(target) = option.target_selector.as_deref() {
        if snapshot.has_element(target) {
            score += 0.2;
        } else {
            score -= 0.3;
        }
    }

    score += knowledge.action_score(option.kind, &snapshot.url) * 0.2;
    score += option.success_probability * 0.3;
    score.clamp(0.0, 1.0)
}

/// Pick the primary action and ranked fallbacks from the candidate set.
pub fn make_decision(input: DecisionInput<'_>) -> Result<ActionPlan, PlanError> {
    if input.options.is_empty() {
        return Err(PlanError::NoOptions);
    }

    let mut scored: Vec<(f64, &ActionOption)> = input
        .options
        .iter()
        .map(|option| (score_option(option, input.snapshot, input.knowledge), option))
        .collect();
    // Stable sort: equal scores keep input order, so identical inputs
    // always yield the identical primary action.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let (best_score, primary) = scored[0];
    if best_score < MIN_VIABLE_SCORE {
        return Err(PlanError::NoViableAction { best_score });
    }

    let fallbacks: Vec<ActionOption> = scored
        .iter()
        .skip(1)
        .take(FALLBACK_COUNT)
        .map(|(_, option)| (*option).clone())
        .collect();

    debug!(
        kind = ?primary.kind,
        score = best_score,
        fallbacks = fallbacks.len(),
        "decision made"
    );

    Ok(ActionPlan {
        primary: primary.clone(),
        fallbacks,
        success_criteria: criteria_for(primary),
        timeout_ms: DEFAULT_TIMEOUT_MS,
        context: PlanningContext {
            url: input.snapshot.url.clone(),
            available_selectors: input
                .snapshot
                .focusable_elements
                .iter()
                .map(|el| el.selector.clone())
                .collect(),
            recent_actions: input.recent_actions.to_vec(),
            known_issue_count: input.known_issue_count,
            time_remaining_ms: input.time_remaining_ms,
        },
    })
}

fn criteria_for(option: &ActionOption) -> SuccessCriteria {
    match option.kind {
        ActionKind::Focus => SuccessCriteria {
            requires_focus_change: true,
            required_selector: option.target_selector.clone(),
            max_duration_ms: None,
        },
        ActionKind::Verify | ActionKind::Analyze => SuccessCriteria {
            requires_focus_change: false,
            required_selector: option.target_selector.clone(),
            max_duration_ms: None,
        },
        ActionKind::Navigate => SuccessCriteria {
            requires_focus_change: false,
            required_selector: None,
            max_duration_ms: Some(DEFAULT_TIMEOUT_MS),
        },
        // A scan always yields a report; its findings carry the verdict.
        ActionKind::Scan | ActionKind::Wait => SuccessCriteria::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusguard_page_channel::{BoundingRect, FocusableElement, StyleSnapshot};

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

    #[test]
    fn focus_on_present_target_scores_highest() {
        let snapshot = snapshot_with(&["#btn"]);
        let kb = KnowledgeBase::default();
        let focus = ActionOption::new(ActionKind::Focus, "focus button").target("#btn");
        let navigate = ActionOption::new(ActionKind::Navigate, "reload page");

        assert!(
            score_option(&focus, &snapshot, &kb) > score_option(&navigate, &snapshot, &kb)
        );
    }

    #[test]
    fn missing_target_is_penalized() {
        let snapshot = snapshot_with(&["#other"]);
        let kb = KnowledgeBase::default();
        let present = ActionOption::new(ActionKind::Analyze, "analyze")
            .target("#other")
            .probability(0.0);
        let absent = ActionOption::new(ActionKind::Analyze, "analyze")
            .target("#gone")
            .probability(0.0);
        let present_score = score_option(&present, &snapshot, &kb);
        let absent_score = score_option(&absent, &snapshot, &kb);
        assert!((present_score - absent_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped() {
        let snapshot = snapshot_with(&["#btn"]);
        let mut kb = KnowledgeBase::default();
        kb.action_scores.insert(
            KnowledgeBase::score_key(ActionKind::Focus, &snapshot.url),
            1.0,
        );
        let option = ActionOption::new(ActionKind::Focus, "focus")
            .target("#btn")
            .probability(1.0);
        let score = score_option(&option, &snapshot, &kb);
        assert!(score <= 1.0);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decision_is_deterministic() {
        let snapshot = snapshot_with(&["#a", "#b"]);
        let kb = KnowledgeBase::default();
        let options = vec![
            ActionOption::new(ActionKind::Analyze, "analyze a").probability(0.0),
            ActionOption::new(ActionKind::Focus, "focus b").probability(0.0),
            ActionOption::new(ActionKind::Verify, "verify a").probability(0.0),
            ActionOption::new(ActionKind::Navigate, "reload").probability(0.0),
        ];
        let input = || DecisionInput {
            options: &options,
            snapshot: &snapshot,
            knowledge: &kb,
            recent_actions: &[],
            known_issue_count: 0,
            time_remaining_ms: None,
        };

        let first = make_decision(input()).unwrap();
        let second = make_decision(input()).unwrap();
        assert_eq!(first.primary.description, second.primary.description);
        assert_eq!(first.primary.kind, ActionKind::Focus);
        assert_eq!(first.fallbacks.len(), 2);
        assert_eq!(first.fallbacks[0].kind, ActionKind::Verify);
    }

    #[test]
    fn low_scores_produce_no_plan() {
        let snapshot = snapshot_with(&[]);
        let kb = KnowledgeBase::default();
        // Wait with a missing target and zero probability stays under 0.3:
        // 0.5 + 0.0 - 0.3 + 0.5*0.2 + 0.0 = 0.3 is viable, so drop history too.
        let mut kb_zeroed = kb.clone();
        kb_zeroed.action_scores.insert(
            KnowledgeBase::score_key(ActionKind::Wait, &snapshot.url),
            0.0,
        );
        let options =
            vec![ActionOption::new(ActionKind::Wait, "wait").target("#gone").probability(0.0)];
        let input = DecisionInput {
            options: &options,
            snapshot: &snapshot,
            knowledge: &kb_zeroed,
            recent_actions: &[],
            known_issue_count: 0,
            time_remaining_ms: None,
        };
        match make_decision(input) {
            Err(PlanError::NoViableAction { best_score }) => assert!(best_score < 0.3),
            other => panic!("expected NoViableAction, got {other:?}"),
        }
    }

    #[test]
    fn empty_options_rejected() {
        let snapshot = snapshot_with(&[]);
        let kb = KnowledgeBase::default();
        let input = DecisionInput {
            options: &[],
            snapshot: &snapshot,
            knowledge: &kb,
            recent_actions: &[],
            known_issue_count: 0,
            time_remaining_ms: None,
        };
        assert!(matches!(make_decision(input), Err(PlanError::NoOptions)));
    }

    #[test]
    fn plan_context_captures_snapshot() {
        let snapshot = snapshot_with(&["#a", "#b"]);
        let kb = KnowledgeBase::default();
        let options = vec![ActionOption::new(ActionKind::Focus, "focus a").target("#a")];
        let plan = make_decision(DecisionInput {
            options: &options,
            snapshot: &snapshot,
            knowledge: &kb,
            recent_actions: &[ActionKind::Navigate],
            known_issue_count: 2,
            time_remaining_ms: Some(5_000),
        })
        .unwrap();
        assert_eq!(plan.context.available_selectors, vec!["#a", "#b"]);
        assert_eq!(plan.context.known_issue_count, 2);
        assert!(plan.success_criteria.requires_focus_change);
    }
}
