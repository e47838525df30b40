//! Keyboard focus-trap detection.
//!
//! Drives a page through forward, backward, modal, and component navigation
//! walks over a [`PageChannel`](focusguard_page_channel::PageChannel) and
//! aggregates every detected trap into a severity-scored
//! [`FocusTrapReport`].

pub mod detector;
pub mod model;
pub mod probes;

pub use detector::FocusTrapDetector;
pub use model::{
    DetectorConfig, FocusTrapReport, FocusTrapResult, TraceEntry, TrapKind,
};
