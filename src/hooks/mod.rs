//! In-process typed event bus (spec.md §4.F). Every SessionJournal,
//! AutopilotLoop and DualAgentCoordinator state transition publishes
//! exactly one HookEvent here before returning to its caller.

mod bus;
mod logger;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, HookBus, HookEmitter};
pub use logger::{HookEventLogger, spawn_event_logger};
