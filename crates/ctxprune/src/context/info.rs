//! The live prunable snapshot and the synthesized context-info message.

use super::nudge::Nudge;
use super::prunable::PrunableEntry;
use crate::history::{EntryId, HistoryStore, TurnIndex};
use serde::Serialize;

/// The most recently computed prunable list.
///
/// Exactly one is live per session. Any successful prune operation marks it
/// stale; discard/extract/squash are then refused until it is recomputed.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// Turn the snapshot was computed after.
    pub turn: TurnIndex,
    pub prunable: Vec<EntryId>,
    pub nudge: Nudge,
    stale: bool,
}

impl ContextSnapshot {
    pub fn new(turn: TurnIndex, prunable: Vec<EntryId>, nudge: Nudge) -> Self {
        Self {
            turn,
            prunable,
            nudge,
            stale: false,
        }
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.prunable.contains(&id)
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The history changed underneath this snapshot.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }
}

/// Output of the per-turn context-info synthesis.
#[derive(Serialize, Debug, Clone)]
pub struct ContextInfo {
    pub turn: TurnIndex,
    pub prunable: Vec<PrunableEntry>,
    pub nudge: Nudge,
    /// Rendered nudge instruction, present iff `nudge` is not `None`.
    pub nudge_text: Option<String>,
}

impl ContextInfo {
    /// Full text injected for the model: the `<prunable-tools>` block
    /// followed by the nudge, if any.
    pub fn render(&self, store: &HistoryStore) -> String {
        let mut text = render_prunable_tools(&self.prunable, store);
        if let Some(nudge) = &self.nudge_text {
            text.push('\n');
            text.push_str(nudge);
        }
        text
    }
}

/// Render the `<prunable-tools>` block. Ids are the bare store ids the agent
/// passes back to `discard` and `extract`.
pub fn render_prunable_tools(entries: &[PrunableEntry], store: &HistoryStore) -> String {
    let unit = store.metric().unit();
    let mut out = String::from("<prunable-tools>\n");
    for entry in entries {
        let input = store
            .get_call(entry.id)
            .map(|c| summarize_input(&c.input, 80))
            .unwrap_or_default();
        out.push_str(&format!(
            "{}: {}({}) ~{} {unit}{}\n",
            entry.id,
            entry.tool_name,
            input,
            entry.size,
            if entry.superseded { " [superseded]" } else { "" },
        ));
    }
    out.push_str("</prunable-tools>");
    out
}

/// Short `key=value` summary of a tool input, for list lines.
pub fn summarize_input(input: &serde_json::Value, max_len: usize) -> String {
    let summary = match input.as_object() {
        Some(obj) => obj
            .iter()
            .take(3)
            .map(|(k, v)| {
                let val = match v {
                    serde_json::Value::String(s) => format!("\"{}\"", clip(s, 40)),
                    other => clip(&other.to_string(), 40),
                };
                format!("{k}={val}")
            })
            .collect::<Vec<_>>()
            .join(", "),
        None if input.is_null() => String::new(),
        None => input.to_string(),
    };
    clip(&summary, max_len)
}

/// Truncate to `max` chars, marking the cut with `...`.
fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
