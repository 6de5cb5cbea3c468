//! Deterministic, pure logic shared by the learning-stack session.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod directive;
pub mod document;
pub mod fence;
pub mod gate;
pub mod invariants;
pub mod reconcile;
pub mod stack;
pub mod transcript;
pub mod types;
