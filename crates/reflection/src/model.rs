//! Verification outcome model and engine configuration.

use serde::{Deserialize, Serialize};

use focusguard_core_types::Severity;
use focusguard_page_channel::FixKind;

/// Classification of one fix verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// All required signals for this fix kind are positive.
    Verified,
    /// The fix is technically in place but its user-visible effect is not.
    Partial,
    /// Required signals are negative.
    Failed,
    /// Evidence could not be collected at all.
    Inconclusive,
}

/// What the caller should do with the fix after verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Accept,
    Retry,
    Rollback,
    Escalate,
}

/// Environment descriptors captured before judging a fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationContext {
    pub selector: String,
    /// Tag name of the element the fix targets, lowercase.
    pub element_tag: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_severity: Option<Severity>,
    /// Author stylesheets beyond the user agent defaults were detected;
    /// they can override an injected patch.
    pub page_has_custom_css: bool,
    /// Whether another verification attempt is still within budget.
    pub retryable: bool,
}

impl VerificationContext {
    pub fn new(
        selector: impl Into<String>,
        element_tag: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            selector: selector.into(),
            element_tag: element_tag.into(),
            url: url.into(),
            issue_severity: None,
            page_has_custom_css: false,
            retryable: true,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.issue_severity = Some(severity);
        self
    }

    pub fn with_custom_css(mut self) -> Self {
        self.page_has_custom_css = true;
        self
    }

    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }
}

/// Full record of one `verify_fix` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixVerificationResult {
    pub fix_id: String,
    pub selector: String,
    pub status: VerificationStatus,
    /// Confidence in the classification, 0..=1.
    pub confidence: f64,
    pub evidence: crate::evidence::FixEvidence,
    pub next_action: NextAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_screenshot: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_screenshot: Option<Vec<u8>>,
    pub duration_ms: u64,
    pub recorded_at_ms: u64,
}

/// Weighted factors attached to every learning record for pattern mining.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorWeights {
    pub element_type: f64,
    pub fix_approach: f64,
    pub custom_css: f64,
    pub verification_speed: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            element_type: 0.3,
            fix_approach: 0.4,
            custom_css: 0.2,
            verification_speed: 0.1,
        }
    }
}

/// One mined-later episode in the bounded learning database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub selector: String,
    pub fix_kind: FixKind,
    pub element_tag: String,
    pub status: VerificationStatus,
    pub confidence: f64,
    /// Weighted factor score, 0..=1.
    pub factor_score: f64,
    pub duration_ms: u64,
    pub recorded_at_ms: u64,
}

/// Reflection engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Confidence at or above which a verified fix is accepted.
    pub accept_threshold: f64,
    pub capture_screenshots: bool,
    /// Confidence added per positive signal of each class.
    pub technical_weight: f64,
    pub visual_weight: f64,
    pub behavioral_weight: f64,
    /// Confidence removed when the page carries custom CSS.
    pub custom_css_penalty: f64,
    pub max_learning_records: usize,
    pub factor_weights: FactorWeights,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.7,
            capture_screenshots: true,
            technical_weight: 0.2,
            visual_weight: 0.2,
            behavioral_weight: 0.1,
            custom_css_penalty: 0.1,
            max_learning_records: 1000,
            factor_weights: FactorWeights::default(),
        }
    }
}

impl ReflectionConfig {
    /// Screenshot-free preset for tests.
    pub fn minimal() -> Self {
        Self {
            capture_screenshots: false,
            ..Self::default()
        }
    }

    pub fn with_learning_limit(mut self, limit: usize) -> Self {
        self.max_learning_records = limit;
        self
    }
}

/// Tagged output of one executed action, consumed by goal evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutput {
    Focused { selector: String },
    Scanned { traps_found: usize, overall_score: u32 },
    Verified { issues_found: usize, overall_score: u32 },
    Analyzed { selector: String, focusable: bool },
    Navigated { url: String },
    Waited { waited_ms: u64 },
}

/// Side effects of one executed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub output: ActionOutput,
    /// Focus landed on a different selector than before the action.
    pub focus_changed: bool,
    pub duration_ms: u64,
}
