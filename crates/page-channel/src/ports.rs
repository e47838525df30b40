//! Async port traits consumed by the agent core.

use std::time::Duration;

use async_trait::async_trait;

use focusguard_core_types::{AxError, SessionId};

use crate::model::{
    BoundingRect, FixDescriptor, InjectionOutcome, KeyPress, NodeInfo, PerceptionSnapshot,
    StyleSnapshot,
};

/// Remote page-control channel.
///
/// Implementations wrap a real debugging protocol; the core only assumes the
/// contract below. Every call may fail with a recoverable [`AxError`]
/// (session gone, target missing, evaluation raised in-page) and carries its
/// own deadline — there is no global timeout.
#[async_trait]
pub trait PageChannel: Send + Sync {
    /// Attach to a tab and return the session handle used by every other call.
    async fn connect(&self, tab_id: &str) -> Result<SessionId, AxError>;

    async fn disconnect(&self, session: &SessionId) -> Result<(), AxError>;

    /// Simulate a single key press against the currently focused element.
    async fn press_key(&self, session: &SessionId, key: &KeyPress) -> Result<(), AxError>;

    /// Press several keys in order, stopping at the first failure.
    async fn press_key_sequence(
        &self,
        session: &SessionId,
        keys: &[KeyPress],
    ) -> Result<(), AxError> {
        for key in keys {
            self.press_key(session, key).await?;
        }
        Ok(())
    }

    /// Simulate a click at the center of the element matching `selector`.
    async fn click(&self, session: &SessionId, selector: &str) -> Result<(), AxError>;

    /// Move focus to the element matching `selector`.
    async fn focus(&self, session: &SessionId, selector: &str) -> Result<(), AxError>;

    /// Describe the node matching `selector`.
    async fn query_node(&self, session: &SessionId, selector: &str) -> Result<NodeInfo, AxError>;

    /// Selector of the element currently holding focus, if any.
    async fn focused_selector(&self, session: &SessionId) -> Result<Option<String>, AxError>;

    async fn computed_style(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> Result<StyleSnapshot, AxError>;

    async fn bounding_rect(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> Result<BoundingRect, AxError>;

    /// Capture a screenshot; element-scoped when `selector` is given.
    async fn screenshot(
        &self,
        session: &SessionId,
        selector: Option<&str>,
    ) -> Result<Vec<u8>, AxError>;

    /// Evaluate an expression in page context and return its JSON value.
    async fn evaluate(
        &self,
        session: &SessionId,
        expression: &str,
    ) -> Result<serde_json::Value, AxError>;

    /// Inject a style sheet, returning a handle usable with `remove_style_sheet`.
    async fn inject_style_sheet(&self, session: &SessionId, css: &str) -> Result<String, AxError>;

    async fn remove_style_sheet(
        &self,
        session: &SessionId,
        sheet_id: &str,
    ) -> Result<(), AxError>;

    async fn set_attribute(
        &self,
        session: &SessionId,
        selector: &str,
        name: &str,
        value: &str,
    ) -> Result<(), AxError>;

    /// Enumerate frame ids currently attached to the page.
    async fn frames(&self, session: &SessionId) -> Result<Vec<String>, AxError>;
}

/// Raw perception sampler walking the live DOM.
#[async_trait]
pub trait PerceptionSampler: Send + Sync {
    /// Take an immutable snapshot of the page at this instant.
    async fn perceive(&self, session: &SessionId) -> Result<PerceptionSnapshot, AxError>;

    /// Block until no DOM mutation has been observed for a short settle
    /// window or `timeout` elapses. Returns whether stability was reached.
    async fn wait_for_stability(
        &self,
        session: &SessionId,
        timeout: Duration,
    ) -> Result<bool, AxError>;
}

/// Fix-injection subsystem: applies a generated fix through an ordered list
/// of strategies with automatic fallback.
#[async_trait]
pub trait FixInjector: Send + Sync {
    async fn apply(
        &self,
        session: &SessionId,
        fix: &FixDescriptor,
    ) -> Result<InjectionOutcome, AxError>;

    /// Undo a previously applied fix. Only meaningful for reversible fixes.
    async fn rollback(&self, session: &SessionId, fix_id: &str) -> Result<(), AxError>;
}
