//! Scripted agent sessions.
//!
//! A script stands in for both the language model and the tool-execution
//! layer: each turn lists the agent's text, its ordinary tool calls with
//! canned results, and its prune calls.
//!
//! ```json
//! {
//!   "turns": [
//!     {
//!       "text": "Reading the config.",
//!       "calls": [
//!         {"id": "c1", "tool": "read_file", "input": {"path": "a.toml"},
//!          "content_bytes": 12000, "resource": "a.toml"}
//!       ]
//!     },
//!     {
//!       "phase": "between_phases",
//!       "prune": [{"id": "p1", "tool": "discard", "arguments": {"id": 1}}]
//!     }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use ctxprune::context::PhaseSignal;
use ctxprune::history::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A whole scripted session.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionScript {
    #[serde(default)]
    pub turns: Vec<ScriptedTurn>,
}

impl SessionScript {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid script {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One turn of the script.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ScriptedTurn {
    pub role: Role,
    pub text: String,
    /// Phase signal passed to the nudge engine on commit.
    pub phase: PhaseSignal,
    pub calls: Vec<ScriptedCall>,
    pub prune: Vec<ScriptedPrune>,
    /// Results for deferred calls of earlier turns, delivered after this
    /// turn's own calls.
    pub late_results: Vec<LateResult>,
    /// Roll the turn back instead of committing it.
    pub abort: bool,
}

impl Default for ScriptedTurn {
    fn default() -> Self {
        Self {
            role: Role::Agent,
            text: String::new(),
            phase: PhaseSignal::Continuing,
            calls: Vec::new(),
            prune: Vec::new(),
            late_results: Vec::new(),
            abort: false,
        }
    }
}

/// An ordinary tool call and its canned result.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ScriptedCall {
    pub id: String,
    pub tool: String,
    pub input: serde_json::Value,
    /// Literal result text.
    pub content: Option<String>,
    /// Synthesize a result of this many bytes when `content` is absent.
    pub content_bytes: Option<usize>,
    pub resource: Option<String>,
    /// The tool reports a failure instead of a result.
    pub fail: bool,
    /// The result arrives in a later turn's `late_results`.
    pub deferred: bool,
}

impl ScriptedCall {
    /// The result text the simulated tool returns.
    pub fn result_text(&self) -> String {
        match (&self.content, self.content_bytes) {
            (Some(content), _) => content.clone(),
            (None, Some(bytes)) => synthetic_content(&self.tool, bytes),
            (None, None) => format!("{} ok", self.tool),
        }
    }
}

/// A prune call issued by the scripted agent.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScriptedPrune {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Result for a call deferred in an earlier turn.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LateResult {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_bytes: Option<usize>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub fail: bool,
}

impl LateResult {
    pub fn result_text(&self) -> String {
        match (&self.content, self.content_bytes) {
            (Some(content), _) => content.clone(),
            (None, Some(bytes)) => synthetic_content(&self.id, bytes),
            (None, None) => String::new(),
        }
    }
}

/// Deterministic filler text of exactly `bytes` ASCII bytes.
fn synthetic_content(seed: &str, bytes: usize) -> String {
    let line = format!("{seed}: lorem ipsum dolor sit amet\n");
    line.chars().cycle().take(bytes).collect()
}
