//! Deterministic, pure logic shared by the router and tracker.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod guard;
pub mod roster;
pub mod task;
pub mod tracker;
pub mod types;
