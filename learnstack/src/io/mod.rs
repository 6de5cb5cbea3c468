//! Side-effecting helpers: configuration on disk, prompt rendering and the
//! remote reasoning service.

pub mod config;
pub mod prompt;
pub mod service;
