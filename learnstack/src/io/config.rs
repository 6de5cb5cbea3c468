//! Session configuration stored in `learnstack.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Protocol;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "learnstack.toml";

/// Learnstack configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// work against the hosted service out of the box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LearnstackConfig {
    /// State format negotiated with the model.
    pub protocol: Protocol,

    /// Source context beyond this many characters is truncated before it is
    /// embedded in a prompt.
    pub source_context_limit_chars: usize,

    /// Pause between an approved gate verdict and the pop, so the verdict can
    /// be read.
    pub gate_close_delay_ms: u64,

    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the generative language API.
    pub base_url: String,
    /// Model identifier used for both chat turns and gate verification.
    pub model: String,
    /// Environment variable consulted when no key is given on the command line.
    pub api_key_env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

impl Default for LearnstackConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Markdown,
            source_context_limit_chars: 12_000,
            gate_close_delay_ms: 1_500,
            service: ServiceConfig::default(),
        }
    }
}

impl LearnstackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source_context_limit_chars == 0 {
            return Err(anyhow!("source_context_limit_chars must be > 0"));
        }
        let base_url = self.service.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("service.base_url must be an http(s) URL"));
        }
        if self.service.model.trim().is_empty() {
            return Err(anyhow!("service.model must be non-empty"));
        }
        if self.service.api_key_env.trim().is_empty() {
            return Err(anyhow!("service.api_key_env must be non-empty"));
        }
        Ok(())
    }

    pub fn gate_close_delay(&self) -> Duration {
        Duration::from_millis(self.gate_close_delay_ms)
    }

    /// Resolve the API credential: an explicit value wins, then the configured
    /// environment variable. Blank values count as missing.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Option<String> {
        self.resolve_api_key_with(explicit, |name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(
        &self,
        explicit: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| lookup(self.service.api_key_env.trim()))
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LearnstackConfig::default()`.
pub fn load_config(path: &Path) -> Result<LearnstackConfig> {
    if !path.exists() {
        let cfg = LearnstackConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LearnstackConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LearnstackConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LearnstackConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = LearnstackConfig {
            protocol: Protocol::Json,
            ..LearnstackConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("learnstack.toml");
        fs::write(&path, "protocol = \"json\"\n[service]\nmodel = \"gemini-pro\"\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.protocol, Protocol::Json);
        assert_eq!(cfg.service.model, "gemini-pro");
        assert_eq!(cfg.service.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.gate_close_delay(), Duration::from_millis(1_500));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("learnstack.toml");
        fs::write(&path, "source_context_limit_chars = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("source_context_limit_chars"));
    }

    #[test]
    fn explicit_key_wins_and_blank_keys_are_missing() {
        let cfg = LearnstackConfig::default();
        let env = |name: &str| (name == "GEMINI_API_KEY").then(|| "from-env".to_string());

        assert_eq!(
            cfg.resolve_api_key_with(Some("flag"), env).as_deref(),
            Some("flag")
        );
        assert_eq!(
            cfg.resolve_api_key_with(None, env).as_deref(),
            Some("from-env")
        );
        assert_eq!(cfg.resolve_api_key_with(Some("   "), env), None);
        assert_eq!(cfg.resolve_api_key_with(None, |_| None), None);
    }
}
