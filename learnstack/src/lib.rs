//! Recursive learning-stack tutor.
//!
//! A learner states a goal; a hosted model tutors them and maintains a stack
//! of prerequisite topics. The model's reply carries the whole stack in a
//! fenced block, which this crate extracts and adopts as the new state. A
//! knowledge gate lets the learner pop back to a parent topic once the model
//! accepts their synthesis.
//!
//! - **[`core`]**: Pure, deterministic logic (fence extraction, reconciliation,
//!   stack invariants, gate transitions). No I/O.
//! - **[`io`]**: Side-effecting operations (config files, prompt templates,
//!   the remote reasoning service). Isolated behind traits for tests.
//!
//! [`session`] coordinates core logic with I/O; [`chat`] drives it from a
//! terminal.

pub mod chat;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod render;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
