//! Error taxonomy for history mutations and prune operations.
//!
//! Every failure is a synchronous validation error. The
//! [`ContextManager`](crate::session::ContextManager) relays them to the agent
//! as a failed tool call; none of them end the session, and none leave the
//! history partially mutated.

use crate::history::{EntryId, OutputStatusKind, TurnIndex};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PruneError>;

/// Errors raised by the history store, prune operations and the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PruneError {
    #[error("unknown entry {0}")]
    UnknownEntry(EntryId),

    #[error("entry {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: EntryId,
        from: OutputStatusKind,
        to: OutputStatusKind,
    },

    #[error("entry {0} is not in the current prunable list")]
    NotPrunable(EntryId),

    #[error("the prunable list is stale; wait for the next context update before pruning again")]
    StaleSnapshot,

    #[error("summary for entry {id} costs {summary_cost}, original costs {original_cost}; an extraction must be non-empty and strictly smaller")]
    ExtractionNotSmaller {
        id: EntryId,
        summary_cost: u64,
        original_cost: u64,
    },

    #[error("turn range {lo}..={hi} overlaps squash group covering {existing_lo}..={existing_hi}")]
    RangeOverlap {
        lo: TurnIndex,
        hi: TurnIndex,
        existing_lo: TurnIndex,
        existing_hi: TurnIndex,
    },

    #[error("empty turn range: {lo} > {hi}")]
    EmptyRange { lo: TurnIndex, hi: TurnIndex },

    #[error("turn {0} still has pending tool results")]
    IncompleteRange(TurnIndex),

    #[error("turn {0} does not exist")]
    UnknownTurn(TurnIndex),

    #[error("summary must not be empty")]
    EmptySummary,

    #[error("squash summary costs {summary_cost}, more than the {replaced_cost} it replaces")]
    SquashNotSmaller {
        summary_cost: u64,
        replaced_cost: u64,
    },

    #[error("turn {0} is still in progress")]
    TurnInProgress(TurnIndex),

    #[error("no turn in progress")]
    NoTurnInProgress,

    #[error("unknown tool call '{0}'")]
    UnknownCall(String),

    #[error("tool call '{0}' already recorded")]
    DuplicateCall(String),

    #[error("unknown context tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl PruneError {
    /// Short machine-readable name, used in logs and audit counters.
    pub fn code(&self) -> &'static str {
        match self {
            PruneError::UnknownEntry(_) => "unknown_entry",
            PruneError::InvalidTransition { .. } => "invalid_transition",
            PruneError::NotPrunable(_) => "not_prunable",
            PruneError::StaleSnapshot => "stale_snapshot",
            PruneError::ExtractionNotSmaller { .. } => "extraction_not_smaller",
            PruneError::RangeOverlap { .. } => "range_overlap",
            PruneError::EmptyRange { .. } => "empty_range",
            PruneError::IncompleteRange(_) => "incomplete_range",
            PruneError::UnknownTurn(_) => "unknown_turn",
            PruneError::EmptySummary => "empty_summary",
            PruneError::SquashNotSmaller { .. } => "squash_not_smaller",
            PruneError::TurnInProgress(_) => "turn_in_progress",
            PruneError::NoTurnInProgress => "no_turn_in_progress",
            PruneError::UnknownCall(_) => "unknown_call",
            PruneError::DuplicateCall(_) => "duplicate_call",
            PruneError::UnknownTool(_) => "unknown_tool",
            PruneError::InvalidArguments { .. } => "invalid_arguments",
        }
    }

    /// Render the error as a tool result string for the agent.
    pub fn to_tool_result(&self) -> String {
        format!("Error: {self}")
    }
}
