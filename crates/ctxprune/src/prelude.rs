//! Convenience re-exports for common `ctxprune` types.
//!
//! ```ignore
//! use ctxprune::prelude::*;
//! ```
//!
//! Ranking internals and the raw tool argument structs are left out; import
//! those from their modules directly.

// ── Session ─────────────────────────────────────────────────────────
pub use crate::config::{ContextConfig, Toggle};
pub use crate::error::{PruneError, Result};
pub use crate::session::{ContextManager, PruneRecord, PruneStats};

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{
    CompositeEventHandler, ContextEvent, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
};

// ── History ─────────────────────────────────────────────────────────
pub use crate::history::{
    EntryId, HistoryStore, HistoryView, OutputStatus, OutputStatusKind, Role, TurnIndex, ViewItem,
};

// ── Policy ──────────────────────────────────────────────────────────
pub use crate::context::{
    ContextInfo, ContextSnapshot, InjectionGuard, MetricKind, Nudge, NudgeConfig, PhaseSignal,
    PrunabilityConfig, SizeMetric,
};

// ── Prune operations ────────────────────────────────────────────────
pub use crate::prune::{PruneCall, PruneOp, PruneOperations, PruneOutcome, ToolDef};
