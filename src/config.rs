//! Runtime settings for the data manager.
//!
//! Loaded from an optional JSON file, then overridden from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Background reloads run inline on the caller's thread.
    #[default]
    Sync,
    /// One named OS thread per reload.
    Thread,
    /// `spawn_blocking` on the current tokio runtime.
    Tokio,
}

impl ExecutorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" | "same_thread" => Some(ExecutorKind::Sync),
            "thread" => Some(ExecutorKind::Thread),
            "tokio" => Some(ExecutorKind::Tokio),
            _ => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TempDataConfig {
    /// Model whose `refreshMatView` / `refreshMatViewRow` procedures are intercepted.
    #[serde(default = "TempDataConfig::default_system_model")]
    pub system_model: String,
    #[serde(default)]
    pub executor: ExecutorKind,
    /// `prefer_memory` for tables created without a cache hint.
    #[serde(default = "TempDataConfig::default_prefer_memory")]
    pub default_prefer_memory: bool,
    /// Random bytes per session id before base64 encoding.
    #[serde(default = "TempDataConfig::default_session_id_bytes")]
    pub session_id_bytes: usize,
}

impl TempDataConfig {
    fn default_system_model() -> String { "SYS".to_string() }
    fn default_prefer_memory() -> bool { true }
    fn default_session_id_bytes() -> usize { 32 }

    /// Read settings from `path`; a missing or unreadable file yields defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<TempDataConfig>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(target: "clarium::tempdata", "ignoring invalid config '{}': {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Apply `CLARIUM_TEMPDATA_*` overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("CLARIUM_TEMPDATA_SYSTEM_MODEL") {
            if !v.trim().is_empty() { self.system_model = v.trim().to_string(); }
        }
        if let Ok(v) = std::env::var("CLARIUM_TEMPDATA_EXECUTOR") {
            match ExecutorKind::parse(&v) {
                Some(k) => self.executor = k,
                None => warn!(target: "clarium::tempdata", "unknown executor '{}', keeping {:?}", v, self.executor),
            }
        }
        if let Ok(v) = std::env::var("CLARIUM_TEMPDATA_PREFER_MEMORY") {
            self.default_prefer_memory = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self
    }
}

impl Default for TempDataConfig {
    fn default() -> Self {
        Self {
            system_model: Self::default_system_model(),
            executor: ExecutorKind::default(),
            default_prefer_memory: Self::default_prefer_memory(),
            session_id_bytes: Self::default_session_id_bytes(),
        }
    }
}
