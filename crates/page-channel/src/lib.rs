//! Port traits for the external collaborators of the agent core.
//!
//! The core never touches a real browser: everything goes through the
//! `PageChannel`, `PerceptionSampler` and `FixInjector` traits defined here,
//! addressed by an opaque session handle. Pacing and settle-waits go through
//! the `Clock` trait so tests can run without wall-clock delay.

pub mod clock;
pub mod mock;
pub mod model;
pub mod ports;

pub use clock::{Clock, TokioClock};
pub use model::{
    BoundingRect, DynamicContentDelta, FixDescriptor, FixKind, FocusableElement, FrameInfo,
    InjectionOutcome, KeyPress, NodeInfo, PerceptionSnapshot, StylePatch, StyleSnapshot,
    ViewportMetrics,
};
pub use ports::{FixInjector, PageChannel, PerceptionSampler};
