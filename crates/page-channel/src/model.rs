//! Page-side data model shared by the port traits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use focusguard_core_types::{Severity, WcagCriterion};

/// A single simulated key press.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyPress {
    /// DOM key value, e.g. "Tab", "Escape", "Enter".
    pub key: String,
    /// Whether Shift is held (backward tab navigation).
    #[serde(default)]
    pub shift: bool,
}

impl KeyPress {
    pub fn tab() -> Self {
        Self {
            key: "Tab".to_string(),
            shift: false,
        }
    }

    pub fn shift_tab() -> Self {
        Self {
            key: "Tab".to_string(),
            shift: true,
        }
    }

    pub fn escape() -> Self {
        Self {
            key: "Escape".to_string(),
            shift: false,
        }
    }

    pub fn enter() -> Self {
        Self {
            key: "Enter".to_string(),
            shift: false,
        }
    }
}

/// Bounding rectangle of an element in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingRect {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Resolved DOM node description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub selector: String,
    pub tag_name: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    pub visible: bool,
}

/// Flat computed-style readout keyed by property name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleSnapshot {
    pub properties: HashMap<String, String>,
}

impl StyleSnapshot {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties.get(property).map(String::as_str)
    }

    /// Whether the snapshot carries any visible focus indication
    /// (non-none outline, box-shadow, or a border stronger than 1px).
    pub fn has_focus_indicator(&self) -> bool {
        let outline_visible = match (self.get("outline-style"), self.get("outline-width")) {
            (Some("none"), _) => false,
            (Some(_), Some("0px")) => false,
            (Some(_), _) => true,
            (None, _) => false,
        };
        let shadow_visible = self
            .get("box-shadow")
            .map(|v| v != "none" && !v.is_empty())
            .unwrap_or(false);
        outline_visible || shadow_visible
    }
}

/// One focusable element in a perception snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusableElement {
    pub selector: String,
    pub tag_name: String,
    pub tab_index: i32,
    pub visible: bool,
    pub in_viewport: bool,
    pub rect: BoundingRect,
    /// Computed style at rest.
    pub unfocused_style: StyleSnapshot,
    /// Computed style while focused, when the sampler captured it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_style: Option<StyleSnapshot>,
    /// Description of an adjacent indicator element, if one acts as the
    /// visible focus cue for this element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sibling_indicator: Option<String>,
}

/// Viewport metrics at snapshot time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewportMetrics {
    pub width: u32,
    pub height: u32,
    pub scroll_x: i32,
    pub scroll_y: i32,
}

/// A DOM mutation observed since the previous snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicContentDelta {
    pub selector: String,
    pub change: String,
    pub observed_at_ms: u64,
}

/// Frame discovered on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_id: String,
    pub url: String,
    pub is_main: bool,
}

/// Immutable read of page state taken at one instant by the sampler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub focusable_elements: Vec<FocusableElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_focus: Option<String>,
    pub viewport: ViewportMetrics,
    #[serde(default)]
    pub dynamic_deltas: Vec<DynamicContentDelta>,
    #[serde(default)]
    pub frames: Vec<FrameInfo>,
}

impl PerceptionSnapshot {
    /// Look up a focusable element by selector.
    pub fn element(&self, selector: &str) -> Option<&FocusableElement> {
        self.focusable_elements
            .iter()
            .find(|el| el.selector == selector)
    }

    pub fn has_element(&self, selector: &str) -> bool {
        self.element(selector).is_some()
    }

    pub fn element_count(&self) -> usize {
        self.focusable_elements.len()
    }
}

/// Kind of remediation a fix descriptor applies.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    /// Add a visible focus indicator (outline / box-shadow).
    FocusVisible,
    /// Raise color contrast of the focus indicator.
    ContrastEnhancement,
    /// Restore tab reachability (tabindex / focus handling).
    KeyboardNavigation,
}

/// CSS patch targeted at one selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylePatch {
    pub selector: String,
    pub declarations: HashMap<String, String>,
}

/// Fix produced by the external fix-generation subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixDescriptor {
    pub fix_id: String,
    pub kind: FixKind,
    pub target_selector: String,
    pub patch: StylePatch,
    /// Generator's own confidence in the fix, 0..=1.
    pub confidence: f64,
    pub reversible: bool,
    pub wcag_criteria: Vec<WcagCriterion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Result of attempting to inject a fix into the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionOutcome {
    pub success: bool,
    /// Strategy that finally applied the patch, e.g. "stylesheet",
    /// "inline-style", "attribute".
    pub method: String,
    pub fallback_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(pairs: &[(&str, &str)]) -> StyleSnapshot {
        StyleSnapshot {
            properties: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn focus_indicator_detection() {
        assert!(style(&[("outline-style", "solid"), ("outline-width", "2px")])
            .has_focus_indicator());
        assert!(!style(&[("outline-style", "none")]).has_focus_indicator());
        assert!(!style(&[("outline-style", "solid"), ("outline-width", "0px")])
            .has_focus_indicator());
        assert!(style(&[("box-shadow", "0 0 0 3px blue")]).has_focus_indicator());
        assert!(!style(&[("box-shadow", "none")]).has_focus_indicator());
    }

    #[test]
    fn snapshot_lookup() {
        let snapshot = PerceptionSnapshot {
            url: "https://example.test".into(),
            focusable_elements: vec![FocusableElement {
                selector: "#go".into(),
                tag_name: "button".into(),
                tab_index: 0,
                visible: true,
                in_viewport: true,
                rect: BoundingRect::default(),
                unfocused_style: StyleSnapshot::default(),
                focused_style: None,
                sibling_indicator: None,
            }],
            ..Default::default()
        };
        assert!(snapshot.has_element("#go"));
        assert!(!snapshot.has_element("#stop"));
        assert_eq!(snapshot.element_count(), 1);
    }

    #[test]
    fn key_press_constructors() {
        assert!(!KeyPress::tab().shift);
        assert!(KeyPress::shift_tab().shift);
        assert_eq!(KeyPress::escape().key, "Escape");
    }
}
