//! Reflection engine: collects evidence for an applied fix over the page
//! channel, classifies the outcome, and records the episode for learning.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use focusguard_core_types::{AxError, SessionId};
use focusguard_page_channel::{
    Clock, FixDescriptor, FixKind, PageChannel, PerceptionSnapshot, StylePatch, StyleSnapshot,
};
use focusguard_state_store::SuccessCriteria;

use crate::evidence::{next_action, FixEvidence};
use crate::model::{
    ExecutedAction, FixVerificationResult, LearningRecord, ReflectionConfig, VerificationContext,
    VerificationStatus,
};

#[derive(Default)]
struct RecordStore {
    history: HashMap<String, Vec<FixVerificationResult>>,
    learning: VecDeque<LearningRecord>,
}

/// Judges applied fixes and accumulates per-selector history plus a bounded
/// learning database.
pub struct ReflectionEngine {
    channel: Arc<dyn PageChannel>,
    clock: Arc<dyn Clock>,
    config: ReflectionConfig,
    records: Mutex<RecordStore>,
}

impl ReflectionEngine {
    pub fn new(
        channel: Arc<dyn PageChannel>,
        clock: Arc<dyn Clock>,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            channel,
            clock,
            config,
            records: Mutex::new(RecordStore::default()),
        }
    }

    /// Verify one applied fix: collect kind-specific evidence, classify it,
    /// decide the next action, and record the episode.
    pub async fn verify_fix(
        &self,
        session: &SessionId,
        fix: &FixDescriptor,
        context: &VerificationContext,
    ) -> Result<FixVerificationResult, AxError> {
        let started_ms = self.clock.now_ms();

        let before_screenshot = self.capture(session, &fix.target_selector).await;
        let evidence = self.collect_evidence(session, fix).await;
        let after_screenshot = self.capture(session, &fix.target_selector).await;

        let status = evidence.classify();
        let confidence = evidence.confidence(context.page_has_custom_css, &self.config);
        let action = next_action(
            status,
            confidence,
            fix.reversible,
            context.retryable,
            self.config.accept_threshold,
        );

        let recorded_at_ms = self.clock.now_ms();
        let duration_ms = recorded_at_ms.saturating_sub(started_ms);
        let result = FixVerificationResult {
            fix_id: fix.fix_id.clone(),
            selector: fix.target_selector.clone(),
            status,
            confidence,
            evidence,
            next_action: action,
            before_screenshot,
            after_screenshot,
            duration_ms,
            recorded_at_ms,
        };

        debug!(
            fix_id = %fix.fix_id,
            selector = %fix.target_selector,
            ?status,
            confidence,
            "fix verification finished"
        );
        self.record(fix, context, &result);
        Ok(result)
    }

    /// Verification history for one selector, oldest first.
    pub fn history(&self, selector: &str) -> Vec<FixVerificationResult> {
        self.records
            .lock()
            .history
            .get(selector)
            .cloned()
            .unwrap_or_default()
    }

    /// The bounded learning database, oldest first.
    pub fn learning_records(&self) -> Vec<LearningRecord> {
        self.records.lock().learning.iter().cloned().collect()
    }

    /// Share of verified outcomes among recorded episodes for one fix kind.
    pub fn success_rate(&self, kind: FixKind) -> Option<f64> {
        let records = self.records.lock();
        let of_kind: Vec<_> = records
            .learning
            .iter()
            .filter(|record| record.fix_kind == kind)
            .collect();
        if of_kind.is_empty() {
            return None;
        }
        let verified = of_kind
            .iter()
            .filter(|record| record.status == VerificationStatus::Verified)
            .count();
        Some(verified as f64 / of_kind.len() as f64)
    }

    async fn collect_evidence(&self, session: &SessionId, fix: &FixDescriptor) -> FixEvidence {
        match fix.kind {
            FixKind::FocusVisible => self.collect_focus_visible(session, fix).await,
            FixKind::ContrastEnhancement => self.collect_contrast(session, fix).await,
            FixKind::KeyboardNavigation => self.collect_keyboard(session, fix).await,
        }
    }

    async fn collect_focus_visible(
        &self,
        session: &SessionId,
        fix: &FixDescriptor,
    ) -> FixEvidence {
        let selector = fix.target_selector.as_str();
        let focus_reached = match self.channel.focus(session, selector).await {
            Ok(()) => true,
            Err(err) => {
                debug!(selector, %err, "focus simulation failed during verification");
                false
            }
        };
        let style = match self.channel.computed_style(session, selector).await {
            Ok(style) => style,
            Err(err) => {
                warn!(selector, %err, "style readback failed, evidence unavailable");
                return FixEvidence::Unavailable {
                    reason: err.to_string(),
                };
            }
        };
        FixEvidence::FocusVisible {
            style_applied: patch_applied(&fix.patch, &style),
            indicator_visible: focus_reached && style.has_focus_indicator(),
            focus_reached,
        }
    }

    async fn collect_contrast(&self, session: &SessionId, fix: &FixDescriptor) -> FixEvidence {
        let selector = fix.target_selector.as_str();
        let style = match self.channel.computed_style(session, selector).await {
            Ok(style) => style,
            Err(err) => {
                warn!(selector, %err, "style readback failed, evidence unavailable");
                return FixEvidence::Unavailable {
                    reason: err.to_string(),
                };
            }
        };
        // Keys landing at all is the technical signal; the declared color
        // values surviving the cascade is the visual one.
        let style_applied = fix
            .patch
            .declarations
            .keys()
            .all(|property| style.get(property).is_some());
        FixEvidence::ContrastEnhancement {
            style_applied,
            colors_match: patch_applied(&fix.patch, &style),
        }
    }

    async fn collect_keyboard(&self, session: &SessionId, fix: &FixDescriptor) -> FixEvidence {
        let selector = fix.target_selector.as_str();
        let focus_reached = match self.channel.focus(session, selector).await {
            Ok(()) => true,
            Err(err) => {
                debug!(selector, %err, "focus simulation failed during verification");
                false
            }
        };
        let readback_matches = match self.channel.focused_selector(session).await {
            Ok(Some(focused)) => focused == selector,
            Ok(None) => false,
            Err(err) => {
                debug!(selector, %err, "focus readback failed during verification");
                false
            }
        };
        FixEvidence::KeyboardNavigation {
            focus_reached,
            readback_matches,
        }
    }

    async fn capture(&self, session: &SessionId, selector: &str) -> Option<Vec<u8>> {
        if !self.config.capture_screenshots {
            return None;
        }
        match self.channel.screenshot(session, Some(selector)).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!(selector, %err, "screenshot capture failed, continuing without");
                None
            }
        }
    }

    fn record(
        &self,
        fix: &FixDescriptor,
        context: &VerificationContext,
        result: &FixVerificationResult,
    ) {
        let weights = self.config.factor_weights;
        let factor_score = weights.element_type * element_factor(&context.element_tag)
            + weights.fix_approach * fix.confidence.clamp(0.0, 1.0)
            + weights.custom_css * if context.page_has_custom_css { 0.0 } else { 1.0 }
            + weights.verification_speed * speed_factor(result.duration_ms);

        let mut records = self.records.lock();
        records
            .history
            .entry(result.selector.clone())
            .or_default()
            .push(result.clone());
        records.learning.push_back(LearningRecord {
            selector: result.selector.clone(),
            fix_kind: fix.kind,
            element_tag: context.element_tag.clone(),
            status: result.status,
            confidence: result.confidence,
            factor_score: factor_score.clamp(0.0, 1.0),
            duration_ms: result.duration_ms,
            recorded_at_ms: result.recorded_at_ms,
        });
        while records.learning.len() > self.config.max_learning_records {
            records.learning.pop_front();
        }
    }
}

/// Every declared property must be present with its declared value.
fn patch_applied(patch: &StylePatch, style: &StyleSnapshot) -> bool {
    patch
        .declarations
        .iter()
        .all(|(property, value)| style.get(property) == Some(value.as_str()))
}

fn element_factor(tag: &str) -> f64 {
    match tag {
        "button" | "a" | "input" | "select" | "textarea" => 1.0,
        _ => 0.6,
    }
}

fn speed_factor(duration_ms: u64) -> f64 {
    if duration_ms < 1_000 {
        1.0
    } else if duration_ms < 3_000 {
        0.5
    } else {
        0.2
    }
}

/// Whether an executed action met every declared success criterion.
pub fn goal_achieved(
    criteria: &SuccessCriteria,
    action: &ExecutedAction,
    snapshot: Option<&PerceptionSnapshot>,
) -> bool {
    if criteria.requires_focus_change && !action.focus_changed {
        return false;
    }
    if let Some(selector) = &criteria.required_selector {
        match snapshot {
            Some(snapshot) if snapshot.has_element(selector) => {}
            _ => return false,
        }
    }
    if let Some(max_ms) = criteria.max_duration_ms {
        if action.duration_ms > max_ms {
            return false;
        }
    }
    true
}
