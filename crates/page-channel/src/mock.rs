//! In-memory port implementations for unit and integration tests.
//!
//! `MockPage` replays a scripted tab order and style table so detector and
//! reflection logic can be exercised without a browser, the same way the
//! state store ships a no-op implementation for tests and benchmarks.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use focusguard_core_types::{AxError, SessionId};

use crate::clock::Clock;
use crate::model::{
    BoundingRect, FixDescriptor, InjectionOutcome, KeyPress, NodeInfo, PerceptionSnapshot,
    StyleSnapshot,
};
use crate::ports::{FixInjector, PageChannel, PerceptionSampler};

#[derive(Default)]
struct MockPageState {
    current_focus: Option<String>,
    /// Focus readback after each successive forward tab. `None` entries model
    /// focus leaving the page (browser chrome).
    tab_sequence: VecDeque<Option<String>>,
    /// Same for backward (shift) tabs.
    back_sequence: VecDeque<Option<String>>,
    styles: HashMap<String, StyleSnapshot>,
    /// Style override observed while the element holds focus.
    focused_styles: HashMap<String, StyleSnapshot>,
    nodes: HashMap<String, NodeInfo>,
    visibility: HashMap<String, bool>,
    evaluate_results: HashMap<String, Value>,
    /// Selectors whose modal closes (loses focus and hides) on Escape.
    escape_closes: Vec<String>,
    injected_sheets: Vec<(String, String)>,
    removed_sheets: Vec<String>,
    set_attributes: Vec<(String, String, String)>,
    pressed_keys: Vec<KeyPress>,
    fail_next_presses: u32,
    sheet_counter: u32,
}

/// Scripted page-channel double.
pub struct MockPage {
    state: Mutex<MockPageState>,
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockPageState::default()),
        }
    }

    /// Script the focus readback for successive forward tabs.
    pub fn script_tab_order<I, S>(&self, order: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        state.tab_sequence = order.into_iter().map(|s| Some(s.into())).collect();
        // Focus leaves the page once the scripted order is exhausted.
        state.tab_sequence.push_back(None);
    }

    /// Script an endless loop: tab keeps cycling through `order` without
    /// ever leaving the page.
    pub fn script_tab_loop<I, S>(&self, order: I, repeats: usize)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cycle: Vec<String> = order.into_iter().map(Into::into).collect();
        let mut state = self.state.lock();
        state.tab_sequence = std::iter::repeat(cycle)
            .take(repeats)
            .flatten()
            .map(Some)
            .collect();
    }

    pub fn script_back_order<I, S>(&self, order: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        state.back_sequence = order.into_iter().map(|s| Some(s.into())).collect();
        state.back_sequence.push_back(None);
    }

    pub fn set_style(&self, selector: impl Into<String>, style: StyleSnapshot) {
        self.state.lock().styles.insert(selector.into(), style);
    }

    pub fn set_focused_style(&self, selector: impl Into<String>, style: StyleSnapshot) {
        self.state
            .lock()
            .focused_styles
            .insert(selector.into(), style);
    }

    pub fn set_node(&self, node: NodeInfo) {
        let mut state = self.state.lock();
        state.visibility.insert(node.selector.clone(), node.visible);
        state.nodes.insert(node.selector.clone(), node);
    }

    pub fn set_visible(&self, selector: impl Into<String>, visible: bool) {
        self.state.lock().visibility.insert(selector.into(), visible);
    }

    /// Register the JSON value returned for an exact `evaluate` expression.
    pub fn on_evaluate(&self, expression: impl Into<String>, value: Value) {
        self.state
            .lock()
            .evaluate_results
            .insert(expression.into(), value);
    }

    /// Mark a modal selector as closing properly on Escape.
    pub fn escape_closes(&self, selector: impl Into<String>) {
        self.state.lock().escape_closes.push(selector.into());
    }

    /// Make the next `count` key presses fail with a connection error.
    pub fn fail_next_presses(&self, count: u32) {
        self.state.lock().fail_next_presses = count;
    }

    pub fn injected_sheets(&self) -> Vec<(String, String)> {
        self.state.lock().injected_sheets.clone()
    }

    pub fn pressed_keys(&self) -> Vec<KeyPress> {
        self.state.lock().pressed_keys.clone()
    }

    pub fn set_attributes(&self) -> Vec<(String, String, String)> {
        self.state.lock().set_attributes.clone()
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageChannel for MockPage {
    async fn connect(&self, _tab_id: &str) -> Result<SessionId, AxError> {
        Ok(SessionId::new())
    }

    async fn disconnect(&self, _session: &SessionId) -> Result<(), AxError> {
        Ok(())
    }

    async fn press_key(&self, _session: &SessionId, key: &KeyPress) -> Result<(), AxError> {
        let mut state = self.state.lock();
        if state.fail_next_presses > 0 {
            state.fail_next_presses -= 1;
            return Err(AxError::connection("scripted key failure"));
        }
        state.pressed_keys.push(key.clone());
        match key.key.as_str() {
            "Tab" => {
                let next = if key.shift {
                    state.back_sequence.pop_front()
                } else {
                    state.tab_sequence.pop_front()
                };
                state.current_focus = next.flatten();
            }
            "Escape" => {
                if let Some(focused) = state.current_focus.clone() {
                    if state.escape_closes.contains(&focused) {
                        state.visibility.insert(focused, false);
                        state.current_focus = None;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn click(&self, _session: &SessionId, selector: &str) -> Result<(), AxError> {
        let mut state = self.state.lock();
        state.current_focus = Some(selector.to_string());
        Ok(())
    }

    async fn focus(&self, _session: &SessionId, selector: &str) -> Result<(), AxError> {
        let mut state = self.state.lock();
        if state.visibility.get(selector) == Some(&false) {
            return Err(AxError::target(selector));
        }
        state.current_focus = Some(selector.to_string());
        Ok(())
    }

    async fn query_node(&self, _session: &SessionId, selector: &str) -> Result<NodeInfo, AxError> {
        let state = self.state.lock();
        match state.nodes.get(selector) {
            Some(node) => {
                let mut node = node.clone();
                if let Some(visible) = state.visibility.get(selector) {
                    node.visible = *visible;
                }
                Ok(node)
            }
            None => Err(AxError::target(selector)),
        }
    }

    async fn focused_selector(&self, _session: &SessionId) -> Result<Option<String>, AxError> {
        Ok(self.state.lock().current_focus.clone())
    }

    async fn computed_style(
        &self,
        _session: &SessionId,
        selector: &str,
    ) -> Result<StyleSnapshot, AxError> {
        let state = self.state.lock();
        if state.current_focus.as_deref() == Some(selector) {
            if let Some(style) = state.focused_styles.get(selector) {
                return Ok(style.clone());
            }
        }
        Ok(state.styles.get(selector).cloned().unwrap_or_default())
    }

    async fn bounding_rect(
        &self,
        _session: &SessionId,
        _selector: &str,
    ) -> Result<BoundingRect, AxError> {
        Ok(BoundingRect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 40.0,
        })
    }

    async fn screenshot(
        &self,
        _session: &SessionId,
        _selector: Option<&str>,
    ) -> Result<Vec<u8>, AxError> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn evaluate(
        &self,
        _session: &SessionId,
        expression: &str,
    ) -> Result<Value, AxError> {
        Ok(self
            .state
            .lock()
            .evaluate_results
            .get(expression)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn inject_style_sheet(&self, _session: &SessionId, css: &str) -> Result<String, AxError> {
        let mut state = self.state.lock();
        state.sheet_counter += 1;
        let sheet_id = format!("sheet-{}", state.sheet_counter);
        state.injected_sheets.push((sheet_id.clone(), css.to_string()));
        Ok(sheet_id)
    }

    async fn remove_style_sheet(
        &self,
        _session: &SessionId,
        sheet_id: &str,
    ) -> Result<(), AxError> {
        self.state.lock().removed_sheets.push(sheet_id.to_string());
        Ok(())
    }

    async fn set_attribute(
        &self,
        _session: &SessionId,
        selector: &str,
        name: &str,
        value: &str,
    ) -> Result<(), AxError> {
        self.state.lock().set_attributes.push((
            selector.to_string(),
            name.to_string(),
            value.to_string(),
        ));
        Ok(())
    }

    async fn frames(&self, _session: &SessionId) -> Result<Vec<String>, AxError> {
        Ok(vec!["main".to_string()])
    }
}

/// Sampler double returning a preset snapshot.
pub struct MockSampler {
    snapshot: Mutex<PerceptionSnapshot>,
    stable: Mutex<bool>,
}

impl MockSampler {
    pub fn new(snapshot: PerceptionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            stable: Mutex::new(true),
        }
    }

    pub fn set_snapshot(&self, snapshot: PerceptionSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    pub fn set_stable(&self, stable: bool) {
        *self.stable.lock() = stable;
    }
}

#[async_trait]
impl PerceptionSampler for MockSampler {
    async fn perceive(&self, _session: &SessionId) -> Result<PerceptionSnapshot, AxError> {
        Ok(self.snapshot.lock().clone())
    }

    async fn wait_for_stability(
        &self,
        _session: &SessionId,
        _timeout: Duration,
    ) -> Result<bool, AxError> {
        Ok(*self.stable.lock())
    }
}

/// Injector double recording applied fixes.
pub struct MockInjector {
    applied: Mutex<Vec<FixDescriptor>>,
    rolled_back: Mutex<Vec<String>>,
    succeed: Mutex<bool>,
}

impl MockInjector {
    pub fn new() -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            rolled_back: Mutex::new(Vec::new()),
            succeed: Mutex::new(true),
        }
    }

    pub fn set_succeed(&self, succeed: bool) {
        *self.succeed.lock() = succeed;
    }

    pub fn applied(&self) -> Vec<FixDescriptor> {
        self.applied.lock().clone()
    }

    pub fn rolled_back(&self) -> Vec<String> {
        self.rolled_back.lock().clone()
    }
}

impl Default for MockInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FixInjector for MockInjector {
    async fn apply(
        &self,
        _session: &SessionId,
        fix: &FixDescriptor,
    ) -> Result<InjectionOutcome, AxError> {
        self.applied.lock().push(fix.clone());
        Ok(InjectionOutcome {
            success: *self.succeed.lock(),
            method: "stylesheet".to_string(),
            fallback_used: false,
        })
    }

    async fn rollback(&self, _session: &SessionId, fix_id: &str) -> Result<(), AxError> {
        self.rolled_back.lock().push(fix_id.to_string());
        Ok(())
    }
}

/// Deterministic clock: `sleep` advances a counter instead of waiting.
pub struct ManualClock {
    now_ms: Mutex<u64>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now_ms: Mutex::new(0),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Delays the clock has been asked to sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    pub fn advance(&self, duration: Duration) {
        *self.now_ms.lock() += duration.as_millis() as u64;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        *self.now_ms.lock() += duration.as_millis() as u64;
        self.slept.lock().push(duration);
    }

    fn now_ms(&self) -> u64 {
        *self.now_ms.lock()
    }
}
