use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error taxonomy for the focusguard agent core.
///
/// Every component-level failure is converted into one of these variants
/// before it crosses a crate boundary; raw panics never escape a component.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxError {
    /// Remote page channel unavailable or disconnected.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Selector or node could not be resolved on the live page.
    #[error("target not found: {selector}")]
    Target { selector: String },

    /// An operation exceeded its per-call deadline.
    #[error("operation timed out after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// An expression raised inside the page context.
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },

    /// Planning produced no viable action or hit an unresolvable ordering.
    #[error("planning error: {message}")]
    Planning { message: String },

    /// Evidence collection for a fix verification itself failed.
    #[error("verification error: {message}")]
    Verification { message: String },

    /// Anything that does not fit the taxonomy above.
    #[error("{message}")]
    Internal { message: String },
}

impl AxError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn target(selector: impl Into<String>) -> Self {
        Self::Target {
            selector: selector.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning {
            message: message.into(),
        }
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable lowercase tag for this variant, matching its serialized form.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Target { .. } => "target",
            Self::Timeout { .. } => "timeout",
            Self::Evaluation { .. } => "evaluation",
            Self::Planning { .. } => "planning",
            Self::Verification { .. } => "verification",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether the loop may keep running after recording this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Connection { .. })
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Target { .. } | Self::Evaluation { .. }
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn named(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issue severity used across trap reports and fix descriptors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    /// Penalty applied to a 100-point page score per issue of this severity.
    pub fn score_penalty(&self) -> u32 {
        match self {
            Severity::Critical => 30,
            Severity::Major => 15,
            Severity::Minor => 5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Major => write!(f, "major"),
            Severity::Minor => write!(f, "minor"),
        }
    }
}

/// A WCAG success criterion referenced by id, e.g. "2.4.7".
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WcagCriterion {
    pub id: String,
    pub name: String,
}

impl WcagCriterion {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// 2.1.1 Keyboard: all functionality operable through a keyboard.
    pub fn keyboard() -> Self {
        Self::new("2.1.1", "Keyboard")
    }

    /// 2.1.2 No Keyboard Trap.
    pub fn no_keyboard_trap() -> Self {
        Self::new("2.1.2", "No Keyboard Trap")
    }

    /// 2.4.3 Focus Order.
    pub fn focus_order() -> Self {
        Self::new("2.4.3", "Focus Order")
    }

    /// 2.4.7 Focus Visible.
    pub fn focus_visible() -> Self {
        Self::new("2.4.7", "Focus Visible")
    }
}

impl fmt::Display for WcagCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

/// WCAG conformance level requested for an audit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WcagLevel {
    A,
    Aa,
    Aaa,
}

impl Default for WcagLevel {
    fn default() -> Self {
        WcagLevel::Aa
    }
}
