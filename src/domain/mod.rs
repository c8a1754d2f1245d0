//! Core data model shared by every component: Task, Session, Iteration,
//! Response, CompletionVerdict, HandoffRecord, HookEvent, ObserverSession
//! (spec.md §3). Deliberately IDs-and-lookup-tables, not bidirectional
//! pointers (spec.md §9 "cyclic references" design note).

mod event;
mod handoff;
mod observer;
mod session;
mod task;
mod verdict;

pub use event::{HookEvent, HookEventType};
pub use handoff::HandoffRecord;
pub use observer::{ObserverSession, ObserverState, SubscriptionFilter};
pub use session::{Iteration, ParsedArtifacts, Response, Role, Session, SessionStatus};
pub use task::{RunMode, Task};
pub use verdict::CompletionVerdict;
