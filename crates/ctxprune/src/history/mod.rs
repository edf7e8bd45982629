//! Conversation history: turns, tool calls, tool outputs and squash groups.
//!
//! The [`HistoryStore`] is the append-only ledger every other module reads.
//! Entries are never removed; pruning changes an output's
//! [`OutputStatus`] and drops its content, leaving the id and original size
//! behind for audit.

pub mod store;
pub mod view;

pub use store::HistoryStore;
pub use view::{HistoryView, ViewItem};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number of a turn. The first committed turn is `1`.
pub type TurnIndex = u32;

/// Store-assigned id shared by a [`ToolCall`] and its [`ToolOutput`].
///
/// Rendered to the agent as a bare number inside `<prunable-tools>`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a [`SquashGroup`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SquashGroupId(pub u32);

impl fmt::Display for SquashGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// ── Turns ──────────────────────────────────────────────────────────

/// Who produced a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    User,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Agent => write!(f, "agent"),
            Role::User => write!(f, "user"),
            Role::System => write!(f, "system"),
        }
    }
}

/// One committed unit of conversation. Immutable once appended.
#[derive(Serialize, Clone, Debug)]
pub struct Turn {
    pub index: TurnIndex,
    pub role: Role,
    /// Free text of the turn (agent reasoning, user message). May be empty.
    pub text: String,
    /// Tool calls produced in this turn, in issue order.
    pub calls: Vec<EntryId>,
}

// ── Tool calls ─────────────────────────────────────────────────────

/// Lifecycle of a tool call's result.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Still waiting on the tool-execution layer.
    Pending,
    /// A [`ToolOutput`] with the same id exists.
    Completed,
    /// The tool-execution layer reported a failure; there is no output.
    Failed,
}

/// One tool invocation. Never deleted.
#[derive(Serialize, Clone, Debug)]
pub struct ToolCall {
    pub id: EntryId,
    /// Id the model used for this call (e.g. `call_abc123`).
    pub call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub turn: TurnIndex,
    pub state: CallState,
    /// Bookkeeping calls (the prune tools) are tagged at creation and never
    /// shown to the user.
    pub internal: bool,
}

impl ToolCall {
    /// Id of the output, once one exists.
    pub fn result(&self) -> Option<EntryId> {
        (self.state == CallState::Completed).then_some(self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.state == CallState::Pending
    }
}

// ── Tool outputs ───────────────────────────────────────────────────

/// Status of a tool output, carrying the data that only exists in that
/// status.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutputStatus {
    Active,
    Extracted { summary: String },
    Discarded,
    SquashedAway { group: SquashGroupId },
}

impl OutputStatus {
    pub fn kind(&self) -> OutputStatusKind {
        match self {
            OutputStatus::Active => OutputStatusKind::Active,
            OutputStatus::Extracted { .. } => OutputStatusKind::Extracted,
            OutputStatus::Discarded => OutputStatusKind::Discarded,
            OutputStatus::SquashedAway { .. } => OutputStatusKind::SquashedAway,
        }
    }
}

/// Payload-free discriminant of [`OutputStatus`].
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatusKind {
    Active,
    Extracted,
    Discarded,
    SquashedAway,
}

impl fmt::Display for OutputStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStatusKind::Active => write!(f, "active"),
            OutputStatusKind::Extracted => write!(f, "extracted"),
            OutputStatusKind::Discarded => write!(f, "discarded"),
            OutputStatusKind::SquashedAway => write!(f, "squashed_away"),
        }
    }
}

/// A requested status change, as accepted by
/// [`HistoryStore::mark_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Extract { summary: String },
    Discard,
    SquashAway { group: SquashGroupId },
}

impl StatusChange {
    pub fn target(&self) -> OutputStatusKind {
        match self {
            StatusChange::Extract { .. } => OutputStatusKind::Extracted,
            StatusChange::Discard => OutputStatusKind::Discarded,
            StatusChange::SquashAway { .. } => OutputStatusKind::SquashedAway,
        }
    }

    /// Whether an output currently in `from` may take this change.
    pub fn allowed_from(&self, from: OutputStatusKind) -> bool {
        match self {
            StatusChange::Extract { .. } | StatusChange::Discard => {
                from == OutputStatusKind::Active
            }
            StatusChange::SquashAway { .. } => from != OutputStatusKind::SquashedAway,
        }
    }
}

/// Result of one tool call.
#[derive(Serialize, Clone, Debug)]
pub struct ToolOutput {
    /// Same id as the owning [`ToolCall`].
    pub id: EntryId,
    /// Raw content. `None` once the output leaves [`OutputStatus::Active`].
    pub content: Option<String>,
    /// Cost of the original content, fixed at append time.
    pub size: u64,
    #[serde(flatten)]
    pub status: OutputStatus,
    pub created_at: TurnIndex,
    pub last_referenced: TurnIndex,
    /// Logical resource the output describes (a file path, a URL). A newer
    /// output with the same tag supersedes this one.
    pub resource: Option<String>,
    pub internal: bool,
}

impl ToolOutput {
    /// Content that still occupies the context window: raw content while
    /// active, the summary once extracted, nothing otherwise.
    pub fn retained_text(&self) -> Option<&str> {
        match &self.status {
            OutputStatus::Active => self.content.as_deref(),
            OutputStatus::Extracted { summary } => Some(summary),
            OutputStatus::Discarded | OutputStatus::SquashedAway { .. } => None,
        }
    }

    pub fn extraction_summary(&self) -> Option<&str> {
        match &self.status {
            OutputStatus::Extracted { summary } => Some(summary),
            _ => None,
        }
    }

    pub fn squash_group(&self) -> Option<SquashGroupId> {
        match self.status {
            OutputStatus::SquashedAway { group } => Some(group),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OutputStatus::Active
    }
}

// ── Squash groups ──────────────────────────────────────────────────

/// A contiguous turn range replaced by one summary.
#[derive(Serialize, Clone, Debug)]
pub struct SquashGroup {
    pub id: SquashGroupId,
    pub lo: TurnIndex,
    pub hi: TurnIndex,
    pub summary: String,
    pub created_at: TurnIndex,
}

impl SquashGroup {
    pub fn covers(&self, turn: TurnIndex) -> bool {
        self.lo <= turn && turn <= self.hi
    }

    pub fn overlaps(&self, lo: TurnIndex, hi: TurnIndex) -> bool {
        lo <= self.hi && self.lo <= hi
    }
}

// ── Internal notes ─────────────────────────────────────────────────

/// Kind of an internal bookkeeping note.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// The `<prunable-tools>` list synthesized after a turn.
    ContextInfo,
    /// A prune reminder.
    Nudge,
}

/// Synthetic message appended after a turn. Always internal.
#[derive(Serialize, Clone, Debug)]
pub struct InternalNote {
    pub after_turn: TurnIndex,
    pub kind: NoteKind,
    pub text: String,
}
