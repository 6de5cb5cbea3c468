//! Test-only helpers: stack node builders, a scripted reasoning service and
//! a temp workspace.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::types::{NodeStatus, StackNode};
use crate::io::config::{DEFAULT_CONFIG_FILE, LearnstackConfig, write_config};
use crate::io::service::{GenerateRequest, ReasoningService, ServiceError};

/// Create a stack node with an explicit status.
pub fn node(id: &str, topic: &str, level: u32, status: NodeStatus) -> StackNode {
    StackNode {
        id: id.to_string(),
        topic: topic.to_string(),
        level,
        status,
    }
}

pub fn active(id: &str, topic: &str, level: u32) -> StackNode {
    node(id, topic, level, NodeStatus::Active)
}

pub fn waiting(id: &str, topic: &str, level: u32) -> StackNode {
    node(id, topic, level, NodeStatus::Waiting)
}

pub fn done(id: &str, topic: &str, level: u32) -> StackNode {
    node(id, topic, level, NodeStatus::Done)
}

/// Service that replays a fixed sequence of results and records requests.
///
/// Running out of scripted results yields a transport error.
#[derive(Debug, Default)]
pub struct ScriptedService {
    results: Mutex<VecDeque<Result<String, ServiceError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    delay: Option<Duration>,
}

impl ScriptedService {
    pub fn new(results: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Block every call for `delay` before answering, like a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| Ok(text.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl ReasoningService for ScriptedService {
    fn generate(&self, request: &GenerateRequest) -> Result<String, ServiceError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.results
            .lock()
            .expect("results lock")
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Transport("script exhausted".to_string())))
    }
}

/// Temporary working directory for CLI-level tests.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp workspace")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join(DEFAULT_CONFIG_FILE)
    }

    pub fn write_config(&self, cfg: &LearnstackConfig) -> Result<PathBuf> {
        let path = self.config_path();
        write_config(&path, cfg)?;
        Ok(path)
    }

    /// Write `contents` to `name` inside the workspace and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
