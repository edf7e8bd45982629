//! Read-only, ordered projection of the history for rendering.

use super::{InternalNote, SquashGroup, SquashGroupId, ToolCall, ToolOutput, Turn};
use serde::Serialize;

/// One renderable item of a [`HistoryView`].
#[derive(Serialize, Clone, Copy, Debug)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ViewItem<'a> {
    /// The summary of a squash group, placed before the group's first turn.
    Summary(&'a SquashGroup),
    Turn {
        turn: &'a Turn,
        squashed_by: Option<SquashGroupId>,
    },
    Call {
        call: &'a ToolCall,
        output: Option<&'a ToolOutput>,
    },
    Note(&'a InternalNote),
}

impl ViewItem<'_> {
    /// Whether the item is bookkeeping that must never reach a user.
    pub fn is_internal(&self) -> bool {
        match self {
            ViewItem::Summary(_) | ViewItem::Note(_) => true,
            ViewItem::Call { call, .. } => call.internal,
            ViewItem::Turn { .. } => false,
        }
    }

    /// One-line plain-text rendering.
    pub fn render(&self) -> String {
        match self {
            ViewItem::Summary(group) => format!(
                "[summary of turns {}-{}] {}",
                group.lo, group.hi, group.summary
            ),
            ViewItem::Turn { turn, .. } => format!("[{} #{}] {}", turn.role, turn.index, turn.text),
            ViewItem::Call { call, output } => {
                let result = match output {
                    Some(out) => match out.retained_text() {
                        Some(text) if out.is_active() => text.to_string(),
                        Some(summary) => format!("(extracted) {summary}"),
                        None => format!("[cleared: {} {}]", out.status.kind(), out.size),
                    },
                    None if call.is_pending() => "(pending)".to_string(),
                    None => "(failed)".to_string(),
                };
                format!("  {}({}) -> {result}", call.tool_name, call.input)
            }
            ViewItem::Note(note) => note.text.clone(),
        }
    }
}

/// Ordered list of [`ViewItem`]s borrowed from a
/// [`HistoryStore`](super::HistoryStore).
#[derive(Serialize, Clone, Debug, Default)]
pub struct HistoryView<'a> {
    items: Vec<ViewItem<'a>>,
}

impl<'a> HistoryView<'a> {
    pub fn new(items: Vec<ViewItem<'a>>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ViewItem<'a>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ViewItem<'a>> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Render every item, one per line.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(ViewItem::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
