//! Evidence model and the pure decision logic driven by it.
//!
//! Evidence is a closed tagged union per fix kind so consumers pattern-match
//! exhaustively instead of probing optional fields. Classification,
//! confidence, and the next-action decision are pure functions over it.

use serde::{Deserialize, Serialize};

use crate::model::{NextAction, ReflectionConfig, VerificationStatus};

/// Signals collected for one applied fix, shaped by the fix kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "fix", rename_all = "snake_case")]
pub enum FixEvidence {
    /// Focus-indicator fix: the patch must be in the computed style and the
    /// indicator must actually render while the element is focused.
    FocusVisible {
        style_applied: bool,
        indicator_visible: bool,
        focus_reached: bool,
    },
    /// Contrast fix: the patch keys must be present and the color values
    /// must have survived the cascade.
    ContrastEnhancement {
        style_applied: bool,
        colors_match: bool,
    },
    /// Keyboard-navigation fix: the element must take focus and the focus
    /// readback must agree.
    KeyboardNavigation {
        focus_reached: bool,
        readback_matches: bool,
    },
    /// Evidence collection itself failed.
    Unavailable { reason: String },
}

impl FixEvidence {
    /// Technical signal: the fix is present in the page's machinery.
    pub fn technical(&self) -> Option<bool> {
        match self {
            FixEvidence::FocusVisible { style_applied, .. } => Some(*style_applied),
            FixEvidence::ContrastEnhancement { style_applied, .. } => Some(*style_applied),
            FixEvidence::KeyboardNavigation {
                readback_matches, ..
            } => Some(*readback_matches),
            FixEvidence::Unavailable { .. } => None,
        }
    }

    /// Visual signal: the fix's effect is user-visible.
    pub fn visual(&self) -> Option<bool> {
        match self {
            FixEvidence::FocusVisible {
                indicator_visible, ..
            } => Some(*indicator_visible),
            FixEvidence::ContrastEnhancement { colors_match, .. } => Some(*colors_match),
            FixEvidence::KeyboardNavigation { .. } => None,
            FixEvidence::Unavailable { .. } => None,
        }
    }

    /// Behavioral signal: interaction with the element behaves as intended.
    pub fn behavioral(&self) -> Option<bool> {
        match self {
            FixEvidence::FocusVisible { focus_reached, .. } => Some(*focus_reached),
            FixEvidence::ContrastEnhancement { .. } => None,
            FixEvidence::KeyboardNavigation { focus_reached, .. } => Some(*focus_reached),
            FixEvidence::Unavailable { .. } => None,
        }
    }

    /// Fixed decision table per fix kind.
    pub fn classify(&self) -> VerificationStatus {
        match self {
            FixEvidence::FocusVisible {
                style_applied,
                indicator_visible,
                ..
            } => match (style_applied, indicator_visible) {
                (true, true) => VerificationStatus::Verified,
                (true, false) => VerificationStatus::Partial,
                _ => VerificationStatus::Failed,
            },
            FixEvidence::ContrastEnhancement {
                style_applied,
                colors_match,
            } => match (style_applied, colors_match) {
                (true, true) => VerificationStatus::Verified,
                (true, false) => VerificationStatus::Partial,
                _ => VerificationStatus::Failed,
            },
            FixEvidence::KeyboardNavigation {
                focus_reached,
                readback_matches,
            } => match (focus_reached, readback_matches) {
                (true, true) => VerificationStatus::Verified,
                (true, false) => VerificationStatus::Partial,
                _ => VerificationStatus::Failed,
            },
            FixEvidence::Unavailable { .. } => VerificationStatus::Inconclusive,
        }
    }

    /// Confidence in the classification: 0.5 base, plus a weight per
    /// positive signal class, minus the custom-CSS interference penalty.
    pub fn confidence(&self, page_has_custom_css: bool, config: &ReflectionConfig) -> f64 {
        let mut confidence = 0.5;
        if self.technical() == Some(true) {
            confidence += config.technical_weight;
        }
        if self.visual() == Some(true) {
            confidence += config.visual_weight;
        }
        if self.behavioral() == Some(true) {
            confidence += config.behavioral_weight;
        }
        if page_has_custom_css {
            confidence -= config.custom_css_penalty;
        }
        confidence.clamp(0.0, 1.0)
    }
}

/// Decide what to do with the fix after classification.
pub fn next_action(
    status: VerificationStatus,
    confidence: f64,
    reversible: bool,
    retryable: bool,
    accept_threshold: f64,
) -> NextAction {
    match status {
        VerificationStatus::Verified if confidence >= accept_threshold => NextAction::Accept,
        VerificationStatus::Failed if reversible => NextAction::Rollback,
        VerificationStatus::Failed => NextAction::Escalate,
        _ if confidence < accept_threshold && !retryable => NextAction::Escalate,
        _ => NextAction::Retry,
    }
}
