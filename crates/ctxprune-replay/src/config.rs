//! Replay configuration: a [`ContextConfig`] plus replay-only settings.
//!
//! Loaded from an optional JSON file, then adjusted by command-line
//! overrides. Every field has a default, so `{}` is a valid file.

use anyhow::{Context, Result};
use ctxprune::config::ContextConfig;
use ctxprune::context::MetricKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one replay run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Context manager settings.
    pub context: ContextConfig,
    /// Simulated latency of every tool call, in milliseconds. Default: `0`.
    pub tool_latency_ms: u64,
}

/// Command-line overrides applied on top of the loaded file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bytes: bool,
    pub chars_per_token: Option<f64>,
    pub min_entry_size: Option<u64>,
    pub critical_budget: Option<u64>,
    pub grace_turns: Option<u32>,
    pub no_nudges: bool,
    pub tool_latency_ms: Option<u64>,
}

impl ReplayConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if overrides.bytes {
            self.context.metric = MetricKind::Bytes;
        } else if let Some(chars_per_token) = overrides.chars_per_token {
            self.context.metric = MetricKind::Tokens { chars_per_token };
        }
        if let Some(size) = overrides.min_entry_size {
            self.context.prunability.min_entry_size = size;
        }
        if let Some(budget) = overrides.critical_budget {
            self.context.nudges.config.critical_budget = budget;
        }
        if let Some(turns) = overrides.grace_turns {
            self.context.nudges.config.grace_turns = turns;
        }
        if overrides.no_nudges {
            self.context.nudges.enabled = false;
        }
        if let Some(latency) = overrides.tool_latency_ms {
            self.tool_latency_ms = latency;
        }
        self
    }
}
