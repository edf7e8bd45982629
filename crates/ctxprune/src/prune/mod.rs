//! The three agent-invoked prune operations.
//!
//! [`PruneOperations`] borrows the store and the live snapshot for the
//! duration of one call:
//!
//! - **discard**: drop a prunable output's content entirely;
//! - **extract**: replace a prunable output with a strictly smaller summary;
//! - **squash**: replace a completed, non-overlapping turn range with one
//!   summary, moving every output in range to `SquashedAway`.
//!
//! Every operation validates fully before touching the store, so an error
//! leaves history exactly as it was. A successful operation marks the
//! snapshot stale; further discard/extract/squash calls are refused until
//! the next turn recomputes it.

pub mod tools;

use crate::context::info::ContextSnapshot;
use crate::error::{PruneError, Result};
use crate::history::{EntryId, HistoryStore, SquashGroupId, StatusChange, TurnIndex};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

pub use tools::{PruneCall, ToolDef, definitions, is_prune_tool, parse_call};

/// Which operation produced a [`PruneOutcome`].
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PruneOp {
    Discard,
    Extract,
    Squash,
}

impl fmt::Display for PruneOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneOp::Discard => write!(f, "discard"),
            PruneOp::Extract => write!(f, "extract"),
            PruneOp::Squash => write!(f, "squash"),
        }
    }
}

/// Result of a successful prune operation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PruneOutcome {
    pub op: PruneOp,
    /// Outputs whose status changed.
    pub targets: Vec<EntryId>,
    /// Group created by a squash.
    pub group: Option<SquashGroupId>,
    /// Squashed turn range.
    pub range: Option<(TurnIndex, TurnIndex)>,
    /// Committed history cost before and after the operation.
    pub cost_before: u64,
    pub cost_after: u64,
}

impl PruneOutcome {
    pub fn freed(&self) -> u64 {
        self.cost_before.saturating_sub(self.cost_after)
    }

    /// Tool result text returned to the agent.
    pub fn message(&self, unit: &str) -> String {
        let freed = self.freed();
        match (self.op, self.range) {
            (PruneOp::Squash, Some((lo, hi))) => format!(
                "Squashed turns {lo}-{hi} ({} output(s) cleared, ~{freed} {unit} freed)",
                self.targets.len()
            ),
            (op, _) => {
                let ids: Vec<String> = self.targets.iter().map(ToString::to_string).collect();
                let verb = if op == PruneOp::Extract {
                    "Extracted"
                } else {
                    "Discarded"
                };
                format!("{verb} output {} (~{freed} {unit} freed)", ids.join(", "))
            }
        }
    }
}

/// One prune call's view of the session.
pub struct PruneOperations<'a> {
    store: &'a mut HistoryStore,
    snapshot: Option<&'a mut ContextSnapshot>,
    in_flight: Option<TurnIndex>,
}

impl<'a> PruneOperations<'a> {
    /// `in_flight` is the turn currently being produced, if any. It is the
    /// last turn in `store` and is never squashable.
    pub fn new(
        store: &'a mut HistoryStore,
        snapshot: Option<&'a mut ContextSnapshot>,
        in_flight: Option<TurnIndex>,
    ) -> Self {
        Self {
            store,
            snapshot,
            in_flight,
        }
    }

    /// Dispatch a parsed tool call.
    pub fn apply(&mut self, call: PruneCall) -> Result<PruneOutcome> {
        match call {
            PruneCall::Discard { id } => self.discard(id),
            PruneCall::Extract { id, summary } => self.extract(id, summary),
            PruneCall::Squash { lo, hi, summary } => self.squash(lo, hi, summary),
        }
    }

    pub fn discard(&mut self, id: EntryId) -> Result<PruneOutcome> {
        self.check_listed(id)?;
        let before = self.store.committed_cost();
        self.store.mark_status(id, StatusChange::Discard)?;
        Ok(self.finish(PruneOp::Discard, vec![id], None, None, before))
    }

    /// Replace output `id` with `summary`, which must cost strictly less
    /// than the original content.
    pub fn extract(&mut self, id: EntryId, summary: impl Into<String>) -> Result<PruneOutcome> {
        let summary = summary.into();
        self.check_listed(id)?;

        let output = self.store.get_output(id)?;
        let original_cost = output
            .retained_text()
            .map_or(0, |text| self.store.metric().cost(text));
        let summary_cost = self.store.metric().cost(&summary);
        if summary.trim().is_empty() || summary_cost >= original_cost {
            return Err(PruneError::ExtractionNotSmaller {
                id,
                summary_cost,
                original_cost,
            });
        }

        let before = self.store.committed_cost();
        self.store.mark_status(id, StatusChange::Extract { summary })?;
        Ok(self.finish(PruneOp::Extract, vec![id], None, None, before))
    }

    /// Replace turns `lo..=hi` with `summary`.
    pub fn squash(
        &mut self,
        lo: TurnIndex,
        hi: TurnIndex,
        summary: impl Into<String>,
    ) -> Result<PruneOutcome> {
        let summary = summary.into();
        self.check_fresh()?;
        self.check_range(lo, hi)?;

        if summary.trim().is_empty() {
            return Err(PruneError::EmptySummary);
        }
        let summary_cost = self.store.metric().cost(&summary);
        let replaced_cost = self.store.range_cost(lo, hi);
        if summary_cost > replaced_cost {
            return Err(PruneError::SquashNotSmaller {
                summary_cost,
                replaced_cost,
            });
        }

        let targets = self.store.outputs_in_range(lo, hi);
        // Every output outside a group may move to SquashedAway; confirm
        // before creating the group so a failure leaves nothing behind.
        for id in &targets {
            let from = self.store.get_output(*id)?.status.kind();
            let change = StatusChange::SquashAway {
                group: SquashGroupId(0),
            };
            if !change.allowed_from(from) {
                return Err(PruneError::InvalidTransition {
                    id: *id,
                    from,
                    to: change.target(),
                });
            }
        }

        let before = self.store.committed_cost();
        let created_at = self.in_flight.or(self.store.last_turn()).unwrap_or(0);
        let group = self.store.create_squash_group(lo, hi, summary, created_at)?;
        for id in &targets {
            self.store
                .mark_status(*id, StatusChange::SquashAway { group })?;
        }
        Ok(self.finish(PruneOp::Squash, targets, Some(group), Some((lo, hi)), before))
    }

    // ── Validation ──

    /// The snapshot must exist, be fresh, and list `id`.
    fn check_listed(&self, id: EntryId) -> Result<()> {
        let Some(snapshot) = self.snapshot.as_deref() else {
            return Err(PruneError::NotPrunable(id));
        };
        if snapshot.is_stale() {
            return Err(PruneError::StaleSnapshot);
        }
        if !snapshot.contains(id) {
            return Err(PruneError::NotPrunable(id));
        }
        Ok(())
    }

    fn check_fresh(&self) -> Result<()> {
        match self.snapshot.as_deref() {
            Some(s) if s.is_stale() => Err(PruneError::StaleSnapshot),
            _ => Ok(()),
        }
    }

    fn check_range(&self, lo: TurnIndex, hi: TurnIndex) -> Result<()> {
        if lo > hi {
            return Err(PruneError::EmptyRange { lo, hi });
        }
        if lo == 0 {
            return Err(PruneError::UnknownTurn(lo));
        }
        if let Some(current) = self.in_flight
            && hi >= current
        {
            return Err(if hi == current {
                PruneError::IncompleteRange(current)
            } else {
                PruneError::UnknownTurn(hi)
            });
        }
        if self.store.turn(hi).is_none() {
            return Err(PruneError::UnknownTurn(hi));
        }
        self.store.check_squash_range(lo, hi)?;
        if let Some(turn) = (lo..=hi).find(|t| self.store.has_pending_calls(*t)) {
            return Err(PruneError::IncompleteRange(turn));
        }
        Ok(())
    }

    fn finish(
        &mut self,
        op: PruneOp,
        targets: Vec<EntryId>,
        group: Option<SquashGroupId>,
        range: Option<(TurnIndex, TurnIndex)>,
        cost_before: u64,
    ) -> PruneOutcome {
        if let Some(snapshot) = self.snapshot.as_deref_mut() {
            snapshot.invalidate();
        }
        let outcome = PruneOutcome {
            op,
            targets,
            group,
            range,
            cost_before,
            cost_after: self.store.committed_cost(),
        };
        info!(
            "{op}: {} target(s), ~{} {} freed",
            outcome.targets.len(),
            outcome.freed(),
            self.store.metric().unit()
        );
        debug!("prune outcome: {outcome:?}");
        outcome
    }
}
