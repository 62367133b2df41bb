//! Storyloom — lobby/round coordination bounded context.
//!
//! Drives the round lifecycle (start, collect submissions, timeout or
//! complete, advance), back-fills missing submissions, owns the per-lobby
//! round timers, and recovers in-flight rounds after a restart.

pub mod application;
pub mod coordinator;
pub mod domain;
pub mod recovery;
pub mod timers;
