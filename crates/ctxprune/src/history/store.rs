//! The append-only history ledger.
//!
//! Turns, calls and notes are only ever appended. Tool outputs change status
//! through [`HistoryStore::mark_status`], which enforces the one-way
//! lifecycle (`Active` to `Extracted`/`Discarded`/`SquashedAway`, and
//! `Extracted`/`Discarded` to `SquashedAway`). Every method validates fully
//! before mutating, so a returned error means nothing changed.

use super::view::{HistoryView, ViewItem};
use super::{
    CallState, EntryId, InternalNote, NoteKind, OutputStatus, Role, SquashGroup, SquashGroupId,
    StatusChange, ToolCall, ToolOutput, Turn, TurnIndex,
};
use crate::context::metric::SizeMetric;
use crate::error::{PruneError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Per-session ledger of turns, tool calls, tool outputs and squash groups.
///
/// Cloning is cheap enough to checkpoint once per turn; the metric is
/// shared.
#[derive(Clone)]
pub struct HistoryStore {
    metric: Arc<dyn SizeMetric>,
    turns: Vec<Turn>,
    /// Indexed by `EntryId.0 - 1`.
    calls: Vec<ToolCall>,
    outputs: BTreeMap<EntryId, ToolOutput>,
    call_ids: HashMap<String, EntryId>,
    groups: Vec<SquashGroup>,
    notes: Vec<InternalNote>,
}

impl fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryStore")
            .field("metric", &self.metric)
            .field("turns", &self.turns.len())
            .field("calls", &self.calls.len())
            .field("outputs", &self.outputs.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl HistoryStore {
    /// Create an empty store measuring content with `metric`.
    pub fn new(metric: Arc<dyn SizeMetric>) -> Self {
        Self {
            metric,
            turns: Vec::new(),
            calls: Vec::new(),
            outputs: BTreeMap::new(),
            call_ids: HashMap::new(),
            groups: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn metric(&self) -> &dyn SizeMetric {
        self.metric.as_ref()
    }

    // ── Appends ──

    /// Append a turn and return its index.
    pub fn append_turn(&mut self, role: Role, text: impl Into<String>) -> TurnIndex {
        let index = self.turns.len() as TurnIndex + 1;
        self.turns.push(Turn {
            index,
            role,
            text: text.into(),
            calls: Vec::new(),
        });
        trace!("appended turn {index} ({role})");
        index
    }

    /// Append a pending tool call to an existing turn.
    pub fn append_tool_call(
        &mut self,
        turn: TurnIndex,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        internal: bool,
    ) -> Result<EntryId> {
        let call_id = call_id.into();
        if self.turn(turn).is_none() {
            return Err(PruneError::UnknownTurn(turn));
        }
        if self.call_ids.contains_key(&call_id) {
            return Err(PruneError::DuplicateCall(call_id));
        }

        let id = EntryId(self.calls.len() as u64 + 1);
        self.calls.push(ToolCall {
            id,
            call_id: call_id.clone(),
            tool_name: tool_name.into(),
            input,
            turn,
            state: CallState::Pending,
            internal,
        });
        self.call_ids.insert(call_id, id);
        self.turns[turn as usize - 1].calls.push(id);
        Ok(id)
    }

    /// Attach the result of a pending call.
    ///
    /// A result delivered after its call's turn counts as referenced by the
    /// most recent turn, so it stays hot until the agent has seen it.
    pub fn append_tool_output(
        &mut self,
        id: EntryId,
        content: impl Into<String>,
        resource: Option<String>,
    ) -> Result<()> {
        let content = content.into();
        let size = self.metric.cost(&content);
        let delivered = self.last_turn().unwrap_or(0);
        let call = self.call_mut(id)?;
        if call.state != CallState::Pending {
            return Err(PruneError::DuplicateCall(call.call_id.clone()));
        }
        call.state = CallState::Completed;
        let output = ToolOutput {
            id,
            content: Some(content),
            size,
            status: OutputStatus::Active,
            created_at: call.turn,
            last_referenced: call.turn.max(delivered),
            resource,
            internal: call.internal,
        };
        trace!("appended output {id} ({size} {})", self.metric.unit());
        self.outputs.insert(id, output);
        Ok(())
    }

    /// Mark a pending call as failed. It will never get an output.
    pub fn fail_tool_call(&mut self, id: EntryId) -> Result<()> {
        let call = self.call_mut(id)?;
        if call.state != CallState::Pending {
            return Err(PruneError::DuplicateCall(call.call_id.clone()));
        }
        call.state = CallState::Failed;
        Ok(())
    }

    /// Append an internal note after `after_turn`.
    pub fn append_note(&mut self, after_turn: TurnIndex, kind: NoteKind, text: impl Into<String>) {
        self.notes.push(InternalNote {
            after_turn,
            kind,
            text: text.into(),
        });
    }

    // ── Lookups ──

    pub fn get_call(&self, id: EntryId) -> Result<&ToolCall> {
        id.0.checked_sub(1)
            .and_then(|i| self.calls.get(i as usize))
            .ok_or(PruneError::UnknownEntry(id))
    }

    fn call_mut(&mut self, id: EntryId) -> Result<&mut ToolCall> {
        id.0.checked_sub(1)
            .and_then(|i| self.calls.get_mut(i as usize))
            .ok_or(PruneError::UnknownEntry(id))
    }

    pub fn get_output(&self, id: EntryId) -> Result<&ToolOutput> {
        self.outputs.get(&id).ok_or(PruneError::UnknownEntry(id))
    }

    /// Look up a store id by the model's call id.
    pub fn find_by_call_id(&self, call_id: &str) -> Option<EntryId> {
        self.call_ids.get(call_id).copied()
    }

    pub fn turn(&self, index: TurnIndex) -> Option<&Turn> {
        index
            .checked_sub(1)
            .and_then(|i| self.turns.get(i as usize))
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Index of the most recent turn, if any.
    pub fn last_turn(&self) -> Option<TurnIndex> {
        self.turns.last().map(|t| t.index)
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    /// Outputs in ascending id order.
    pub fn outputs(&self) -> impl Iterator<Item = &ToolOutput> {
        self.outputs.values()
    }

    pub fn groups(&self) -> &[SquashGroup] {
        &self.groups
    }

    pub fn notes(&self) -> &[InternalNote] {
        &self.notes
    }

    pub fn group_covering(&self, turn: TurnIndex) -> Option<&SquashGroup> {
        self.groups.iter().find(|g| g.covers(turn))
    }

    /// Whether any call of `turn` still waits for its result.
    pub fn has_pending_calls(&self, turn: TurnIndex) -> bool {
        self.turn(turn).is_some_and(|t| {
            t.calls
                .iter()
                .filter_map(|id| self.get_call(*id).ok())
                .any(ToolCall::is_pending)
        })
    }

    /// Ids of every output produced by turns in `lo..=hi`.
    pub fn outputs_in_range(&self, lo: TurnIndex, hi: TurnIndex) -> Vec<EntryId> {
        (lo..=hi)
            .filter_map(|i| self.turn(i))
            .flat_map(|t| t.calls.iter().copied())
            .filter(|id| self.outputs.contains_key(id))
            .collect()
    }

    // ── Mutations ──

    /// Record that the agent cited output `id` during `turn`.
    pub fn touch(&mut self, id: EntryId, turn: TurnIndex) -> Result<()> {
        let output = self
            .outputs
            .get_mut(&id)
            .ok_or(PruneError::UnknownEntry(id))?;
        output.last_referenced = output.last_referenced.max(turn);
        Ok(())
    }

    /// Apply a status transition. Content is cleared for every target state;
    /// an extraction keeps its summary in the status itself.
    pub fn mark_status(&mut self, id: EntryId, change: StatusChange) -> Result<()> {
        let output = self
            .outputs
            .get_mut(&id)
            .ok_or(PruneError::UnknownEntry(id))?;
        let from = output.status.kind();
        if !change.allowed_from(from) {
            return Err(PruneError::InvalidTransition {
                id,
                from,
                to: change.target(),
            });
        }

        output.content = None;
        output.status = match change {
            StatusChange::Extract { summary } => OutputStatus::Extracted { summary },
            StatusChange::Discard => OutputStatus::Discarded,
            StatusChange::SquashAway { group } => OutputStatus::SquashedAway { group },
        };
        trace!("output {id}: {from} -> {}", output.status.kind());
        Ok(())
    }

    /// Register a squash group over `lo..=hi`.
    ///
    /// Only the range itself is validated here; moving outputs to
    /// `SquashedAway` is the caller's job.
    pub fn create_squash_group(
        &mut self,
        lo: TurnIndex,
        hi: TurnIndex,
        summary: impl Into<String>,
        created_at: TurnIndex,
    ) -> Result<SquashGroupId> {
        self.check_squash_range(lo, hi)?;
        let id = SquashGroupId(self.groups.len() as u32 + 1);
        self.groups.push(SquashGroup {
            id,
            lo,
            hi,
            summary: summary.into(),
            created_at,
        });
        Ok(id)
    }

    /// Validate that `lo..=hi` is a non-empty range clear of other groups.
    pub fn check_squash_range(&self, lo: TurnIndex, hi: TurnIndex) -> Result<()> {
        if lo > hi {
            return Err(PruneError::EmptyRange { lo, hi });
        }
        if let Some(existing) = self.groups.iter().find(|g| g.overlaps(lo, hi)) {
            return Err(PruneError::RangeOverlap {
                lo,
                hi,
                existing_lo: existing.lo,
                existing_hi: existing.hi,
            });
        }
        Ok(())
    }

    // ── Accounting ──

    /// Cost of the content `output` still holds.
    pub fn retained_cost(&self, output: &ToolOutput) -> u64 {
        output
            .retained_text()
            .map_or(0, |text| self.metric.cost(text))
    }

    /// Total size of all `Active` outputs, internal results excluded.
    pub fn active_cost(&self) -> u64 {
        self.outputs
            .values()
            .filter(|o| o.is_active() && !o.internal)
            .map(|o| o.size)
            .sum()
    }

    /// Total cost the committed history occupies: text of turns outside any
    /// squash group, retained output content, and squash summaries.
    pub fn committed_cost(&self) -> u64 {
        let turn_text: u64 = self
            .turns
            .iter()
            .filter(|t| self.group_covering(t.index).is_none())
            .map(|t| self.metric.cost(&t.text))
            .sum();
        let outputs: u64 = self.outputs.values().map(|o| self.retained_cost(o)).sum();
        let summaries: u64 = self
            .groups
            .iter()
            .map(|g| self.metric.cost(&g.summary))
            .sum();
        turn_text + outputs + summaries
    }

    /// Cost a squash over `lo..=hi` would remove: turn text plus retained
    /// output content in range.
    pub fn range_cost(&self, lo: TurnIndex, hi: TurnIndex) -> u64 {
        let turn_text: u64 = (lo..=hi)
            .filter_map(|i| self.turn(i))
            .map(|t| self.metric.cost(&t.text))
            .sum();
        let outputs: u64 = self
            .outputs_in_range(lo, hi)
            .into_iter()
            .filter_map(|id| self.outputs.get(&id))
            .map(|o| self.retained_cost(o))
            .sum();
        turn_text + outputs
    }

    // ── Views ──

    /// Read-only, ordered view of everything in the store, internal items
    /// included. Use [`InjectionGuard`](crate::context::guard::InjectionGuard)
    /// before showing it to a user.
    pub fn snapshot(&self) -> HistoryView<'_> {
        let mut items = Vec::new();
        for turn in &self.turns {
            let group = self.group_covering(turn.index);
            if let Some(g) = group
                && g.lo == turn.index
            {
                items.push(ViewItem::Summary(g));
            }
            items.push(ViewItem::Turn {
                turn,
                squashed_by: group.map(|g| g.id),
            });
            for id in &turn.calls {
                if let Ok(call) = self.get_call(*id) {
                    items.push(ViewItem::Call {
                        call,
                        output: self.outputs.get(id),
                    });
                }
            }
            items.extend(
                self.notes
                    .iter()
                    .filter(|n| n.after_turn == turn.index)
                    .map(ViewItem::Note),
            );
        }
        HistoryView::new(items)
    }
}
