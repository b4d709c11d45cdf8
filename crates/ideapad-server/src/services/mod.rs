//! Service layer for ideapad-server
//!
//! Background work that runs alongside the HTTP routes.

pub mod reaper;

pub use reaper::IdleReaper;
