//! Session lifecycle orchestration.
//!
//! The orchestrator is the only component that touches both the registry and
//! session teardown, which lets it keep the ordering guarantees:
//!
//! - `start` inserts only fully warmed-up sessions.
//! - `end`, `change_model`, idle reaping and the shutdown sweep all remove
//!   an entry *before* shutting the session down, then take the session lock
//!   so any call that already holds a reference finishes first.
//! - Transitions that load or remove run on their own task and finish even
//!   when the caller's future is dropped.
//! - Internal failures leave here as one of the [`ErrorCode`](crate::ErrorCode)
//!   kinds; a closed session reads as an unknown conversation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    SessionOrchestrator                       │
//! │  start ─┐   continue ─┐   end ─┐   change_model ─┐           │
//! │         ▼             ▼        ▼                 ▼           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ SessionRegistry  id → Arc<Mutex<ModelSession>>         │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │                             │                                │
//! │               ModelSession ─► EngineAdapter ─► Backend       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Known limitation
//!
//! `change_model` ends the old conversation before building the new one. If
//! the replacement fails to load or warm up, the old identifier is already
//! gone and no new one exists; callers treat that as "conversation ended"
//! and `start` again.

mod lifecycle;

pub use lifecycle::*;
