//! The PRAR coordinator: the agent's top-level control loop.
//!
//! `PrarCoordinator` decomposes an operator goal into sub-tasks, then drives
//! perceive-reason-act-reflect cycles over injected collaborators (state
//! store, perception sampler, action executor, clock) until the queue drains
//! or a cycle/error/time limit trips. Cancellation is cooperative and checked
//! between cycles; a failed cycle is recorded, never propagated.

pub mod config;
pub mod coordinator;
pub mod executor;

pub use config::LoopConfig;
pub use coordinator::{CycleRecord, LoopHandle, LoopResult, PrarCoordinator};
pub use executor::{ActionExecutor, ChannelExecutor};
