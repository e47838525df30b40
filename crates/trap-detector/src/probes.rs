//! In-page probe expressions used by the modal and component passes.
//!
//! Kept as plain expression builders so tests can register canned results
//! for the exact strings the detector sends.

/// Selectors of open modal-like containers (dialogs, aria-modal regions).
pub const MODAL_CANDIDATES: &str = "Array.from(document.querySelectorAll(\
    '[role=dialog],[aria-modal=true],dialog[open],.modal'))\
    .filter(el => el.offsetParent !== null)\
    .map(el => el.dataset.fgSelector || el.id && ('#' + el.id) || el.tagName.toLowerCase())";

/// Selectors of expandable-component candidates (menus, accordions, trees).
pub const EXPANDABLE_CANDIDATES: &str = "Array.from(document.querySelectorAll(\
    '[aria-expanded],[role=menu],[role=tree],details'))\
    .map(el => el.dataset.fgSelector || el.id && ('#' + el.id) || el.tagName.toLowerCase())";

/// Whether the element has a keydown/keyup listener handling Escape.
pub fn has_escape_handler(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector('{selector}'); \
         return !!(el && (el.onkeydown || el.onkeyup || \
         el.dataset.escapeHandler === 'true')); }})()"
    )
}

/// Whether the modal contains a recognizable close button.
pub fn has_close_button(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector('{selector}'); \
         return !!(el && el.querySelector(\
         '[aria-label*=close i],.close,button[title*=close i]')); }})()"
    )
}
