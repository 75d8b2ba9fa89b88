//! Engine configuration
//!
//! [`EngineConfig`] carries the run-level tunables; [`WebSearchSwitch`] is
//! the operational kill switch for the web-search fallback branch. The
//! engine reads the switch exactly once per run, so flipping it mid-run
//! never changes a routing decision already made.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable consulted by the default [`EnvSwitch`]
pub const WEB_SEARCH_ENV_VAR: &str = "WEB_SEARCH_FALLBACK";

/// Run-level tunables for the chat engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default deadline for one whole run, lock wait included.
    /// `None` disables the deadline.
    #[serde(default, with = "humantime_serde")]
    pub run_timeout: Option<Duration>,

    /// Result count requested from the web-search collaborator
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
}

fn default_search_top_k() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout: Some(Duration::from_secs(120)),
            search_top_k: default_search_top_k(),
        }
    }
}

impl EngineConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default run deadline
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Remove the default run deadline
    pub fn without_run_timeout(mut self) -> Self {
        self.run_timeout = None;
        self
    }

    /// Set how many results a web search requests
    pub fn with_search_top_k(mut self, top_k: usize) -> Self {
        self.search_top_k = top_k.max(1);
        self
    }
}

/// Kill switch for the web-search fallback branch
///
/// When disabled, a run that graded its documents weak still goes straight
/// to the chat stage. Operators can flip the switch between runs without
/// restarting anything.
pub trait WebSearchSwitch: Send + Sync {
    /// Whether the fallback branch may be taken this run
    fn web_search_enabled(&self) -> bool;
}

/// Switch backed by an environment variable
///
/// The fallback is enabled unless the variable explicitly disables it:
/// `false`, `0`, `no`, or `off` (case-insensitive). Unset means enabled.
#[derive(Debug, Clone)]
pub struct EnvSwitch {
    var: String,
}

impl EnvSwitch {
    /// Read the switch from a custom environment variable
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvSwitch {
    fn default() -> Self {
        Self::new(WEB_SEARCH_ENV_VAR)
    }
}

impl WebSearchSwitch for EnvSwitch {
    fn web_search_enabled(&self) -> bool {
        match std::env::var(&self.var) {
            Ok(value) => !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "false" | "0" | "no" | "off"
            ),
            Err(_) => true,
        }
    }
}

/// Switch pinned at construction, for tests and fixed deployments
#[derive(Debug, Clone, Copy)]
pub struct FixedSwitch(pub bool);

impl WebSearchSwitch for FixedSwitch {
    fn web_search_enabled(&self) -> bool {
        self.0
    }
}
